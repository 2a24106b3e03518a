//! # EPR Core
//!
//! Core business logic for clinical episodes.
//!
//! This crate contains the episode entity and the operations around it:
//! - Construction and normalisation of episodes from raw server payloads
//! - Record collections (add, remove, sort) driven by an injected [`FieldRegistry`]
//! - Derived queries (name, tags, discharge status) and list ordering
//! - Saving with consistency-token conflict detection
//! - Patient lookup by hospital number
//!
//! **No transport concerns**: HTTP clients and servers live in `epr-client` and `api-rest`. The
//! core only sees the [`EpisodeTransport`] trait.

pub mod config;
pub mod constants;
pub mod episode;
pub mod error;
pub mod item;
pub mod lookup;
pub mod ordering;
pub mod registry;
pub mod save;
pub mod transport;

/// Raw attribute mapping as exchanged with the server.
pub type RawAttributes = serde_json::Map<String, serde_json::Value>;

pub use config::CoreConfig;
pub use epr_translate::PatientRecord;
pub use episode::{DateField, Episode, EpisodeSnapshot, NewItemOptions};
pub use error::{
    EpisodeError, EpisodeResult, LoadError, LookupError, SaveError, TransportError,
};
pub use item::{EpisodeHandle, Item, MakeCopy};
pub use lookup::{
    classify, find_by_hospital_number, search_patients, LookupCallbacks, LookupHandlers,
    PatientMatch, SearchResult,
};
pub use ordering::{sort_episodes, ComparisonKey, EpisodeOrdering};
pub use registry::{FieldDescriptor, FieldRegistry};
pub use save::{DateValue, EpisodeUpdate};
pub use transport::EpisodeTransport;
