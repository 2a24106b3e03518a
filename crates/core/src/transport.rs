//! Transport contract between episodes and the server.
//!
//! The core never speaks HTTP itself. Loading, saving and patient search go through an
//! [`EpisodeTransport`]; `epr-client` provides the HTTP implementation.

use crate::error::TransportError;
use crate::RawAttributes;
use async_trait::async_trait;
use epr_types::HospitalNumber;
use serde_json::Value;

/// Server operations the episode lifecycle depends on.
#[async_trait]
pub trait EpisodeTransport: Send + Sync {
    /// Fetches the raw payload of an episode.
    async fn fetch(&self, episode_id: i64) -> Result<RawAttributes, TransportError>;

    /// Sends an episode's attributes for update and returns the server's raw payload.
    ///
    /// A stale consistency token is reported as [`TransportError::Status`] with
    /// [`CONFLICT_STATUS`](crate::constants::CONFLICT_STATUS).
    async fn update(
        &self,
        episode_id: i64,
        attributes: &RawAttributes,
    ) -> Result<RawAttributes, TransportError>;

    /// Returns the raw records of every patient with the given hospital number.
    async fn search(&self, hospital_number: &HospitalNumber) -> Result<Vec<Value>, TransportError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for unit tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Request {
        Fetch(i64),
        Update(i64, RawAttributes),
        Search(String),
    }

    /// Answers requests from queued responses and records every request it sees.
    #[derive(Default)]
    pub struct MockTransport {
        episodes: Mutex<VecDeque<Result<RawAttributes, TransportError>>>,
        searches: Mutex<VecDeque<Result<Vec<Value>, TransportError>>>,
        requests: Mutex<Vec<Request>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues the answer to the next fetch or update.
        pub fn respond_episode(self, response: Result<RawAttributes, TransportError>) -> Self {
            self.episodes
                .lock()
                .expect("mock lock poisoned")
                .push_back(response);
            self
        }

        /// Queues the answer to the next search.
        pub fn respond_search(self, response: Result<Vec<Value>, TransportError>) -> Self {
            self.searches
                .lock()
                .expect("mock lock poisoned")
                .push_back(response);
            self
        }

        pub fn requests(&self) -> Vec<Request> {
            self.requests.lock().expect("mock lock poisoned").clone()
        }

        fn record(&self, request: Request) {
            self.requests
                .lock()
                .expect("mock lock poisoned")
                .push(request);
        }

        fn next_episode(&self) -> Result<RawAttributes, TransportError> {
            self.episodes
                .lock()
                .expect("mock lock poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Request("no scripted response".into())))
        }
    }

    #[async_trait]
    impl EpisodeTransport for MockTransport {
        async fn fetch(&self, episode_id: i64) -> Result<RawAttributes, TransportError> {
            self.record(Request::Fetch(episode_id));
            self.next_episode()
        }

        async fn update(
            &self,
            episode_id: i64,
            attributes: &RawAttributes,
        ) -> Result<RawAttributes, TransportError> {
            self.record(Request::Update(episode_id, attributes.clone()));
            self.next_episode()
        }

        async fn search(
            &self,
            hospital_number: &HospitalNumber,
        ) -> Result<Vec<Value>, TransportError> {
            self.record(Request::Search(hospital_number.as_str().to_string()));
            self.searches
                .lock()
                .expect("mock lock poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Request("no scripted response".into())))
        }
    }
}
