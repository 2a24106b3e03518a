//! Loading and saving episodes through a transport.
//!
//! A save sends an [`EpisodeUpdate`] addressed by episode id. The update carries the
//! consistency token the edit was based on; a server that has seen a newer version answers with
//! a conflict. The episode is only replaced once the server's payload has been rebuilt into a
//! valid episode, so a failed save of any kind leaves it untouched.

use crate::constants::{CATEGORY_NAME_ATTRIBUTE, CONSISTENCY_TOKEN_ATTRIBUTE, ID_ATTRIBUTE};
use crate::episode::{DateField, Episode, EpisodeSnapshot};
use crate::error::{EpisodeError, LoadError, SaveError};
use crate::registry::FieldRegistry;
use crate::transport::EpisodeTransport;
use crate::RawAttributes;
use chrono::NaiveDate;
use epr_types::dates::format_date;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A date attribute as supplied for saving.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DateValue {
    /// A native date, sent as `DD/MM/YYYY`.
    Date(NaiveDate),
    /// An already formatted value, sent unchanged.
    Text(String),
}

impl DateValue {
    fn to_wire(&self) -> Value {
        match self {
            DateValue::Date(date) => Value::String(format_date(*date)),
            DateValue::Text(text) => Value::String(text.clone()),
        }
    }
}

impl From<NaiveDate> for DateValue {
    fn from(date: NaiveDate) -> Self {
        DateValue::Date(date)
    }
}

/// Attributes of one episode to send to the server.
#[derive(Clone, Debug, PartialEq)]
pub struct EpisodeUpdate {
    pub id: i64,
    /// Sent back exactly as the server issued it.
    pub consistency_token: Option<Value>,
    pub category_name: Option<Value>,
    /// Date attributes to send; `None` clears the date on the server.
    pub dates: BTreeMap<DateField, Option<DateValue>>,
    /// Any other attributes, sent as-is.
    pub attributes: RawAttributes,
}

impl EpisodeUpdate {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            consistency_token: None,
            category_name: None,
            dates: BTreeMap::new(),
            attributes: RawAttributes::new(),
        }
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        self.category_name = Some(Value::String(category.into()));
    }

    pub fn set_date(&mut self, field: DateField, value: Option<DateValue>) {
        self.dates.insert(field, value);
    }

    /// Wire form of the update, with dates in `DD/MM/YYYY`.
    pub fn to_wire(&self) -> RawAttributes {
        let mut wire = self.attributes.clone();
        wire.insert(ID_ATTRIBUTE.into(), Value::from(self.id));
        wire.insert(
            CONSISTENCY_TOKEN_ATTRIBUTE.into(),
            self.consistency_token.clone().unwrap_or(Value::Null),
        );
        if let Some(category) = &self.category_name {
            wire.insert(CATEGORY_NAME_ATTRIBUTE.into(), category.clone());
        }
        for (field, value) in &self.dates {
            let value = value.as_ref().map_or(Value::Null, DateValue::to_wire);
            wire.insert(field.as_str().into(), value);
        }
        wire
    }
}

impl EpisodeSnapshot {
    /// Turns an edited snapshot into an update.
    ///
    /// # Errors
    ///
    /// Returns [`EpisodeError::MissingId`] for a snapshot of an episode the server has never
    /// assigned an id.
    pub fn into_update(self) -> Result<EpisodeUpdate, EpisodeError> {
        let id = self.id.ok_or(EpisodeError::MissingId)?;
        let mut update = EpisodeUpdate::new(id);
        update.consistency_token = self.consistency_token;
        update.category_name = self.category_name;
        update.set_date(
            DateField::DateOfAdmission,
            self.date_of_admission.map(DateValue::Date),
        );
        update.set_date(
            DateField::DateOfEpisode,
            self.date_of_episode.map(DateValue::Date),
        );
        update.set_date(
            DateField::DischargeDate,
            self.discharge_date.map(DateValue::Date),
        );
        Ok(update)
    }
}

impl Episode {
    /// Fetches an episode and builds it.
    pub async fn load<T>(
        episode_id: i64,
        transport: &T,
        registry: Arc<FieldRegistry>,
    ) -> Result<Episode, LoadError>
    where
        T: EpisodeTransport + ?Sized,
    {
        let raw = transport.fetch(episode_id).await?;
        let episode = Episode::new(raw, registry)?;
        tracing::info!(episode_id, "loaded episode");
        Ok(episode)
    }

    /// Sends `update` and, on success, replaces this episode with the server's version.
    ///
    /// Holding `&mut self` for the whole request keeps saves of one episode from overlapping.
    ///
    /// # Errors
    ///
    /// - [`SaveError::Conflict`] if the server rejected the consistency token,
    /// - [`SaveError::Failed`] for any other transport failure,
    /// - [`SaveError::InvalidResponse`] if the returned payload is not a valid episode.
    ///
    /// In every error case the episode is unchanged.
    pub async fn save<T>(&mut self, update: EpisodeUpdate, transport: &T) -> Result<(), SaveError>
    where
        T: EpisodeTransport + ?Sized,
    {
        let episode_id = update.id;
        let wire = update.to_wire();

        let raw = match transport.update(episode_id, &wire).await {
            Ok(raw) => raw,
            Err(source) if source.is_conflict() => {
                tracing::warn!(episode_id, "save rejected: episode changed on the server");
                return Err(SaveError::Conflict { episode_id });
            }
            Err(source) => {
                tracing::warn!(episode_id, error = %source, "save failed");
                return Err(SaveError::Failed { episode_id, source });
            }
        };

        let saved = Episode::new(raw, self.registry().clone())
            .map_err(|source| SaveError::InvalidResponse { episode_id, source })?;
        *self = saved;

        tracing::info!(episode_id, "saved episode");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::mock::{MockTransport, Request};
    use serde_json::json;

    fn raw(value: Value) -> RawAttributes {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn payload(token: &str, category: &str) -> RawAttributes {
        raw(json!({
            "id": 12,
            "consistency_token": token,
            "category_name": category,
            "date_of_admission": "03/11/2014",
            "demographics": [{"patient_id": 7, "first_name": "Sarah", "surname": "Williams"}],
            "diagnosis": [{"id": 3, "condition": "Malaria", "date_of_diagnosis": "01/11/2014"}]
        }))
    }

    fn episode() -> Episode {
        Episode::new(payload("a1b2c3d4", "inpatient"), Arc::new(FieldRegistry::builtin()))
            .expect("valid episode")
    }

    #[test]
    fn wire_form_formats_native_dates_and_keeps_strings() {
        let mut update = EpisodeUpdate::new(12);
        update.consistency_token = Some("tok".into());
        update.set_date(
            DateField::DateOfAdmission,
            NaiveDate::from_ymd_opt(2014, 11, 3).map(DateValue::Date),
        );
        update.set_date(
            DateField::DischargeDate,
            Some(DateValue::Text("10/11/2014".into())),
        );
        update.set_date(DateField::DateOfEpisode, None);

        let wire = update.to_wire();

        assert_eq!(wire.get("id"), Some(&json!(12)));
        assert_eq!(wire.get("consistency_token"), Some(&json!("tok")));
        assert_eq!(wire.get("date_of_admission"), Some(&json!("03/11/2014")));
        assert_eq!(wire.get("discharge_date"), Some(&json!("10/11/2014")));
        assert_eq!(wire.get("date_of_episode"), Some(&Value::Null));
        assert!(wire.get("start").is_none());
    }

    #[test]
    fn snapshot_without_id_cannot_be_saved() {
        let episode = Episode::new(
            raw(json!({"demographics": [{"patient_id": "X1"}]})),
            Arc::new(FieldRegistry::builtin()),
        )
        .expect("valid episode");

        let err = episode.make_copy().into_update().expect_err("no id");
        assert!(matches!(err, EpisodeError::MissingId));
    }

    #[tokio::test]
    async fn successful_save_replaces_state() {
        let transport =
            MockTransport::new().respond_episode(Ok(payload("e5f6a7b8", "outpatient")));
        let mut episode = episode();

        let mut update = episode.make_copy().into_update().expect("saved episode");
        update.set_category("outpatient");
        episode.save(update, &transport).await.expect("save succeeds");

        assert_eq!(episode.consistency_token(), Some("e5f6a7b8"));
        assert_eq!(episode.category_name(), Some("outpatient"));
        assert_eq!(episode.number_of_items("diagnosis"), 1);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let Request::Update(id, sent) = &requests[0] else {
            panic!("expected an update request, got {:?}", requests[0]);
        };
        assert_eq!(*id, 12);
        assert_eq!(sent.get("consistency_token"), Some(&json!("a1b2c3d4")));
        assert_eq!(sent.get("category_name"), Some(&json!("outpatient")));
        assert_eq!(sent.get("date_of_admission"), Some(&json!("03/11/2014")));
    }

    #[tokio::test]
    async fn numeric_token_is_sent_back_unchanged() {
        let mut first = payload("unused", "inpatient");
        first.insert("consistency_token".into(), json!(3));
        let mut episode =
            Episode::new(first, Arc::new(FieldRegistry::builtin())).expect("valid episode");
        assert_eq!(episode.consistency_token(), None);
        assert_eq!(episode.consistency_token_value(), Some(&json!(3)));

        let transport = MockTransport::new().respond_episode(Ok(payload("e5f6a7b8", "inpatient")));
        let update = episode.make_copy().into_update().expect("saved episode");
        episode.save(update, &transport).await.expect("save succeeds");

        let requests = transport.requests();
        let Request::Update(_, sent) = &requests[0] else {
            panic!("expected an update request, got {:?}", requests[0]);
        };
        assert_eq!(sent.get("consistency_token"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn conflict_leaves_episode_unchanged() {
        let transport = MockTransport::new().respond_episode(Err(TransportError::Status(409)));
        let mut episode = episode();

        let mut update = episode.make_copy().into_update().expect("saved episode");
        update.set_category("outpatient");
        let err = episode
            .save(update, &transport)
            .await
            .expect_err("stale token should conflict");

        assert!(err.is_conflict());
        assert!(matches!(err, SaveError::Conflict { episode_id: 12 }));
        assert_eq!(episode.consistency_token(), Some("a1b2c3d4"));
        assert_eq!(episode.category_name(), Some("inpatient"));
    }

    #[tokio::test]
    async fn other_failures_are_generic() {
        let transport = MockTransport::new().respond_episode(Err(TransportError::Status(500)));
        let mut episode = episode();

        let update = episode.make_copy().into_update().expect("saved episode");
        let err = episode
            .save(update, &transport)
            .await
            .expect_err("server error should fail");

        assert!(!err.is_conflict());
        assert!(matches!(
            err,
            SaveError::Failed {
                episode_id: 12,
                source: TransportError::Status(500)
            }
        ));
        assert_eq!(episode.consistency_token(), Some("a1b2c3d4"));
    }

    #[tokio::test]
    async fn unusable_response_leaves_episode_unchanged() {
        let transport =
            MockTransport::new().respond_episode(Ok(raw(json!({"id": 12, "demographics": []}))));
        let mut episode = episode();

        let update = episode.make_copy().into_update().expect("saved episode");
        let err = episode
            .save(update, &transport)
            .await
            .expect_err("payload without demographics should fail");

        assert!(matches!(err, SaveError::InvalidResponse { episode_id: 12, .. }));
        assert_eq!(episode.consistency_token(), Some("a1b2c3d4"));
        assert_eq!(episode.full_name(), "Sarah Williams");
    }

    #[tokio::test]
    async fn load_fetches_and_builds() {
        let transport = MockTransport::new().respond_episode(Ok(payload("a1b2c3d4", "inpatient")));
        let episode = Episode::load(12, &transport, Arc::new(FieldRegistry::builtin()))
            .await
            .expect("load succeeds");

        assert_eq!(episode.link(), "/patient/7/12");
        assert_eq!(transport.requests(), vec![Request::Fetch(12)]);

        let transport = MockTransport::new().respond_episode(Err(TransportError::Status(404)));
        let err = Episode::load(99, &transport, Arc::new(FieldRegistry::builtin()))
            .await
            .expect_err("unknown episode");
        assert!(matches!(err, LoadError::Transport(TransportError::Status(404))));
    }
}
