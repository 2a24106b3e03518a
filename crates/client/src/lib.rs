//! # EPR Client
//!
//! HTTP implementation of [`EpisodeTransport`].
//!
//! Talks JSON to an EPR server:
//! - `GET  {base}/api/v0.1/episode/{id}/`
//! - `PUT  {base}/api/v0.1/episode/{id}/`
//! - `GET  {base}/search/patient/?hospital_number={n}`
//!
//! Any non-success status is returned as [`TransportError::Status`]; callers single out `409`.

use async_trait::async_trait;
use epr_core::constants::{EPISODE_API_PATH, PATIENT_SEARCH_PATH};
use epr_core::{EpisodeTransport, RawAttributes, TransportError};
use epr_types::HospitalNumber;
use serde_json::Value;
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Transport over HTTP using `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Request`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn episode_url(&self, episode_id: i64) -> String {
        format!("{}{}/{}/", self.base_url, EPISODE_API_PATH, episode_id)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), url = %response.url(), "request rejected");
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl EpisodeTransport for HttpTransport {
    async fn fetch(&self, episode_id: i64) -> Result<RawAttributes, TransportError> {
        let response = self.send(self.client.get(self.episode_url(episode_id))).await?;
        response
            .json::<RawAttributes>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn update(
        &self,
        episode_id: i64,
        attributes: &RawAttributes,
    ) -> Result<RawAttributes, TransportError> {
        let request = self.client.put(self.episode_url(episode_id)).json(attributes);
        let response = self.send(request).await?;
        response
            .json::<RawAttributes>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn search(&self, hospital_number: &HospitalNumber) -> Result<Vec<Value>, TransportError> {
        let url = format!("{}{}", self.base_url, PATIENT_SEARCH_PATH);
        let request = self
            .client
            .get(url)
            .query(&[("hospital_number", hospital_number.as_str())]);
        let response = self.send(request).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}
