//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Environment variables are read by the binaries; the helpers here
//! only interpret the values they were given, so tests never depend on process-wide state.

use crate::constants::{DEFAULT_CATEGORIES, DEFAULT_REFERENCE_HOSPITAL};
use crate::error::{EpisodeError, EpisodeResult};
use crate::ordering::EpisodeOrdering;
use crate::registry::FieldRegistry;
use std::path::PathBuf;
use std::sync::Arc;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    registry: Arc<FieldRegistry>,
    ordering: EpisodeOrdering,
}

impl CoreConfig {
    pub fn new(registry: Arc<FieldRegistry>, ordering: EpisodeOrdering) -> Self {
        Self { registry, ordering }
    }

    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.registry
    }

    pub fn ordering(&self) -> &EpisodeOrdering {
        &self.ordering
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new(Arc::new(FieldRegistry::builtin()), EpisodeOrdering::default())
    }
}

/// Resolve the field registry without reading environment variables.
///
/// If `schema_path` is provided, the schema document at that path is loaded. Otherwise the
/// built-in schema is used.
pub fn resolve_field_registry(schema_path: Option<PathBuf>) -> EpisodeResult<Arc<FieldRegistry>> {
    match schema_path {
        Some(path) => {
            if !path.is_file() {
                return Err(EpisodeError::InvalidInput(format!(
                    "EPR_SCHEMA_PATH override {} is not a file",
                    path.display()
                )));
            }
            FieldRegistry::load(&path).map(Arc::new)
        }
        None => Ok(Arc::new(FieldRegistry::builtin())),
    }
}

/// Parse the location category ordering from an optional comma-separated value.
///
/// If `value` is `None` or blank, returns the default ordering.
pub fn categories_from_env_value(value: Option<String>) -> EpisodeResult<Vec<String>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let Some(value) = value else {
        return Ok(DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect());
    };

    let categories: Vec<String> = value.split(',').map(|c| c.trim().to_string()).collect();
    if categories.iter().any(String::is_empty) {
        return Err(EpisodeError::InvalidInput(
            "EPR_CATEGORIES cannot contain empty entries".into(),
        ));
    }
    Ok(categories)
}

/// Parse the reference hospital from an optional value, defaulting when blank.
pub fn reference_hospital_from_env_value(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_REFERENCE_HOSPITAL.to_string())
}
