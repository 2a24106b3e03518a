use epr_types::dates::DateError;
use epr_types::TextError;

/// Errors raised while building or mutating an episode, or loading its field registry.
///
/// Construction errors are fatal: no partially constructed episode is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum EpisodeError {
    #[error("episode initialisation data must contain demographics with a patient id")]
    MissingDemographics,
    #[error("first demographics entry has no patient id")]
    MissingPatientId,
    #[error("invalid patient id: {0}")]
    InvalidPatientId(TextError),
    #[error("field '{0}' is not registered")]
    UnknownField(String),
    #[error("field '{field}' must be a list of records")]
    InvalidCollection { field: String },
    #[error("attribute '{field}' has an unexpected value: {found}")]
    InvalidAttribute { field: String, found: String },
    #[error("invalid {field}: {source}")]
    InvalidDate {
        field: String,
        #[source]
        source: DateError,
    },
    #[error("episode has no id")]
    MissingId,

    #[error("invalid field registry: {0}")]
    InvalidRegistry(String),
    #[error("failed to read schema file: {0}")]
    SchemaRead(std::io::Error),
    #[error("failed to parse schema YAML: {0}")]
    SchemaYaml(serde_yaml::Error),
    #[error("failed to parse schema JSON: {0}")]
    SchemaJson(serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EpisodeError {
    /// True for the precondition failures that make a payload unusable as an episode.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            EpisodeError::MissingDemographics
                | EpisodeError::MissingPatientId
                | EpisodeError::InvalidPatientId(_)
                | EpisodeError::InvalidCollection { .. }
                | EpisodeError::InvalidAttribute { .. }
                | EpisodeError::InvalidDate { .. }
        )
    }
}

pub type EpisodeResult<T> = std::result::Result<T, EpisodeError>;

/// Failures reported by an [`EpisodeTransport`](crate::transport::EpisodeTransport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl TransportError {
    /// True when the server rejected a stale consistency token.
    pub fn is_conflict(&self) -> bool {
        matches!(self, TransportError::Status(crate::constants::CONFLICT_STATUS))
    }
}

/// Failures of loading an episode from the server.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("episode could not be fetched: {0}")]
    Transport(#[from] TransportError),
    #[error("episode could not be built: {0}")]
    Episode(#[from] EpisodeError),
}

/// Outcome of a save that did not apply.
///
/// The episode is left exactly as it was before the save in every case.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("episode {episode_id} was changed by somebody else; reload it and try again")]
    Conflict { episode_id: i64 },
    #[error("episode {episode_id} could not be saved: {source}")]
    Failed {
        episode_id: i64,
        #[source]
        source: TransportError,
    },
    #[error("server returned an unusable episode after saving {episode_id}: {source}")]
    InvalidResponse {
        episode_id: i64,
        #[source]
        source: EpisodeError,
    },
}

impl SaveError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SaveError::Conflict { .. })
    }
}

/// Failures of the patient lookup workflow.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("invalid hospital number: {0}")]
    InvalidHospitalNumber(TextError),
    #[error("{count} patients share hospital number {hospital_number}")]
    Ambiguous { hospital_number: String, count: usize },
    #[error("patient search failed: {0}")]
    Transport(#[from] TransportError),
    #[error("patient record could not be translated: {0}")]
    Translation(#[from] epr_translate::TranslateError),
}
