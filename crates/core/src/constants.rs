//! Constants used throughout the EPR core crate.
//!
//! Field names and category values that the episode logic treats specially live here so the
//! wire vocabulary is defined in one place.

/// Mandatory collection carrying patient identity.
pub const DEMOGRAPHICS_FIELD: &str = "demographics";

/// Collection whose first entry holds the episode's tags.
pub const TAGGING_FIELD: &str = "tagging";

/// Collection whose first entry holds the episode's current location.
pub const LOCATION_FIELD: &str = "location";

/// Location category of a discharged episode.
pub const DISCHARGED_CATEGORY: &str = "Discharged";

/// Attribute names with fixed meaning on an episode payload.
pub const ID_ATTRIBUTE: &str = "id";
pub const CONSISTENCY_TOKEN_ATTRIBUTE: &str = "consistency_token";
pub const CATEGORY_NAME_ATTRIBUTE: &str = "category_name";
pub const PATIENT_ID_ATTRIBUTE: &str = "patient_id";

/// Location category ordering used when no ordering is configured.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Inepisode",
    "Review",
    "Followup",
    "Transferred",
    "Discharged",
    "Deceased",
];

/// Hospital whose `T<n>` wards are ordered numerically by default.
pub const DEFAULT_REFERENCE_HOSPITAL: &str = "UCH";

/// Status code a server uses to reject a stale consistency token.
pub const CONFLICT_STATUS: u16 = 409;

/// Path prefix of the episode resource.
pub const EPISODE_API_PATH: &str = "/api/v0.1/episode";

/// Path of the patient search resource.
pub const PATIENT_SEARCH_PATH: &str = "/search/patient/";
