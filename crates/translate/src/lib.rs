//! Field translation for patient search results.
//!
//! This crate provides **wire models** and **translation helpers** for the raw patient records
//! returned by the patient search endpoint:
//! - strict deserialisation with field paths in error messages
//! - translation of identifiers and `DD/MM/YYYY` dates into domain types
//!
//! It is deliberately independent of the episode core: it knows nothing about field registries
//! and hands raw episode payloads back to the caller untouched.

pub mod patient;

// Re-export facades
pub use patient::{patient_to_record, Patient};

// Re-export public domain-level types
pub use patient::{Demographics, PatientRecord};

/// Errors returned by the `epr-translate` crate.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid date in {field}: {source}")]
    InvalidDate {
        field: String,
        source: epr_types::dates::DateError,
    },
}

/// Type alias for Results that can fail with a [`TranslateError`].
pub type TranslateResult<T> = Result<T, TranslateError>;
