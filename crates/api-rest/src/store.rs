//! In-memory episode store backing the development server.
//!
//! Patients hold their patient-level subrecords (demographics, allergies, ...). Episodes hold
//! their own attributes plus the id of the patient they belong to. An episode is served as the
//! patient's subrecords overlaid with the episode's attributes, which is the shape episode
//! construction expects.
//!
//! Every stored episode carries a consistency token. An update must present the current token;
//! a successful update issues a new one.

use epr_core::constants::{CONSISTENCY_TOKEN_ATTRIBUTE, DEMOGRAPHICS_FIELD, ID_ATTRIBUTE};
use epr_core::{Episode, FieldRegistry, RawAttributes};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("episode {0} not found")]
    NotFound(i64),
    #[error("episode {0} was modified by another update")]
    Conflict(i64),
    #[error("invalid seed data: {0}")]
    InvalidSeed(String),
    #[error("failed to read seed file: {0}")]
    SeedRead(std::io::Error),
    #[error("failed to parse seed YAML: {0}")]
    SeedYaml(serde_yaml::Error),
    #[error("failed to parse seed JSON: {0}")]
    SeedJson(serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Seed document, one entry per patient.
///
/// ```yaml
/// patients:
///   - id: 1
///     demographics:
///       - first_name: Sarah
///         surname: Williams
///         hospital_number: "123"
///     episodes:
///       - id: 12
///         category_name: inpatient
///         date_of_admission: 03/11/2014
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedData {
    #[serde(default)]
    pub patients: Vec<SeedPatient>,
}

#[derive(Debug, Deserialize)]
pub struct SeedPatient {
    pub id: i64,
    #[serde(default)]
    pub episodes: Vec<RawAttributes>,
    #[serde(flatten)]
    pub subrecords: RawAttributes,
}

#[derive(Clone, Debug)]
struct StoredEpisode {
    patient_id: i64,
    attributes: RawAttributes,
}

#[derive(Default)]
struct Inner {
    patients: BTreeMap<i64, RawAttributes>,
    episodes: BTreeMap<i64, StoredEpisode>,
}

/// Thread-safe store of patients and episodes.
#[derive(Default)]
pub struct EpisodeStore {
    inner: RwLock<Inner>,
}

impl EpisodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from seed data.
    ///
    /// Demographics entries without a `patient_id` get the patient's id, and episodes without a
    /// consistency token get a fresh one.
    pub fn from_seed(seed: SeedData) -> StoreResult<Self> {
        let mut inner = Inner::default();

        for patient in seed.patients {
            let mut subrecords = patient.subrecords;
            subrecords.remove(ID_ATTRIBUTE);
            stamp_patient_id(&mut subrecords, patient.id);

            for mut episode in patient.episodes {
                let episode_id = episode
                    .get(ID_ATTRIBUTE)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| {
                        StoreError::InvalidSeed(format!(
                            "an episode of patient {} has no integer id",
                            patient.id
                        ))
                    })?;
                if !matches!(episode.get(CONSISTENCY_TOKEN_ATTRIBUTE), Some(Value::String(_))) {
                    episode.insert(CONSISTENCY_TOKEN_ATTRIBUTE.into(), Value::String(new_token()));
                }
                let stored = StoredEpisode {
                    patient_id: patient.id,
                    attributes: episode,
                };
                if inner.episodes.insert(episode_id, stored).is_some() {
                    return Err(StoreError::InvalidSeed(format!(
                        "episode {episode_id} is seeded twice"
                    )));
                }
            }

            if inner.patients.insert(patient.id, subrecords).is_some() {
                return Err(StoreError::InvalidSeed(format!(
                    "patient {} is seeded twice",
                    patient.id
                )));
            }
        }

        tracing::info!(
            "seeded {} patients and {} episodes",
            inner.patients.len(),
            inner.episodes.len()
        );
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    /// Loads seed data from disk; `.json` files are read as JSON, anything else as YAML.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(StoreError::SeedRead)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let seed: SeedData = if is_json {
            serde_json::from_str(&text).map_err(StoreError::SeedJson)?
        } else {
            serde_yaml::from_str(&text).map_err(StoreError::SeedYaml)?
        };
        Self::from_seed(seed)
    }

    /// The episode as served to clients.
    pub fn episode(&self, episode_id: i64) -> StoreResult<RawAttributes> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let stored = inner
            .episodes
            .get(&episode_id)
            .ok_or(StoreError::NotFound(episode_id))?;
        Ok(inner.compose(episode_id, stored))
    }

    /// Applies an update if its consistency token is current.
    ///
    /// Scalar attributes of the update replace the episode's; record collections are not
    /// updated through this endpoint.
    pub fn update(&self, episode_id: i64, update: &RawAttributes) -> StoreResult<RawAttributes> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let stored = inner
            .episodes
            .get_mut(&episode_id)
            .ok_or(StoreError::NotFound(episode_id))?;

        let current = stored.attributes.get(CONSISTENCY_TOKEN_ATTRIBUTE);
        let supplied = update.get(CONSISTENCY_TOKEN_ATTRIBUTE);
        if current != supplied {
            tracing::warn!(episode_id, "rejecting update with stale consistency token");
            return Err(StoreError::Conflict(episode_id));
        }

        for (name, value) in update {
            if name == ID_ATTRIBUTE || name == CONSISTENCY_TOKEN_ATTRIBUTE {
                continue;
            }
            if matches!(value, Value::Array(_) | Value::Object(_)) {
                continue;
            }
            stored.attributes.insert(name.clone(), value.clone());
        }
        stored
            .attributes
            .insert(CONSISTENCY_TOKEN_ATTRIBUTE.into(), Value::String(new_token()));

        let stored = stored.clone();
        tracing::info!(episode_id, "episode updated");
        Ok(inner.compose(episode_id, &stored))
    }

    /// Checks that every stored episode builds into a valid [`Episode`] under `registry`.
    ///
    /// Returns the number of episodes checked.
    pub fn validate(&self, registry: &Arc<FieldRegistry>) -> StoreResult<usize> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        for (episode_id, stored) in &inner.episodes {
            Episode::new(inner.compose(*episode_id, stored), registry.clone()).map_err(|e| {
                StoreError::InvalidSeed(format!("episode {episode_id} is not valid: {e}"))
            })?;
        }
        Ok(inner.episodes.len())
    }

    /// Patients whose first demographics entry has the given hospital number.
    pub fn search(&self, hospital_number: &str) -> StoreResult<Vec<Value>> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let matches = inner
            .patients
            .iter()
            .filter(|(_, subrecords)| {
                subrecords
                    .get(DEMOGRAPHICS_FIELD)
                    .and_then(|d| d.get(0))
                    .and_then(|d| d.get("hospital_number"))
                    .and_then(Value::as_str)
                    .is_some_and(|n| n.trim() == hospital_number.trim())
            })
            .map(|(patient_id, subrecords)| inner.patient_record(*patient_id, subrecords))
            .collect();
        Ok(matches)
    }
}

impl Inner {
    fn compose(&self, episode_id: i64, stored: &StoredEpisode) -> RawAttributes {
        let mut payload = self
            .patients
            .get(&stored.patient_id)
            .cloned()
            .unwrap_or_default();
        payload.extend(stored.attributes.clone());
        payload.insert(ID_ATTRIBUTE.into(), Value::from(episode_id));
        payload
    }

    fn patient_record(&self, patient_id: i64, subrecords: &RawAttributes) -> Value {
        let episodes: RawAttributes = self
            .episodes
            .iter()
            .filter(|(_, stored)| stored.patient_id == patient_id)
            .map(|(id, stored)| (id.to_string(), Value::Object(self.compose(*id, stored))))
            .collect();

        let mut record = subrecords.clone();
        record.insert(ID_ATTRIBUTE.into(), Value::from(patient_id));
        record.insert("episodes".into(), Value::Object(episodes));
        Value::Object(record)
    }
}

fn stamp_patient_id(subrecords: &mut RawAttributes, patient_id: i64) {
    let Some(Value::Array(entries)) = subrecords.get_mut(DEMOGRAPHICS_FIELD) else {
        return;
    };
    for entry in entries.iter_mut().filter_map(Value::as_object_mut) {
        entry
            .entry("patient_id")
            .or_insert_with(|| Value::from(patient_id));
    }
}

/// Short random version marker.
fn new_token() -> String {
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}
