//! Field registry: the record collections an episode knows about.
//!
//! Each registered field becomes a named collection of [`Item`](crate::item::Item)s on every
//! episode. A descriptor may name a sort key (an attribute of the field's records); collections
//! with a sort key are kept in descending order of that attribute.
//!
//! The registry is passed to episode construction explicitly and shared behind an `Arc`. There
//! is no process-wide registry.
//!
//! ## Schema document
//!
//! A registry can be loaded from YAML or JSON:
//!
//! ```yaml
//! fields:
//!   - name: demographics
//!     display_name: Demographics
//!   - name: diagnosis
//!     display_name: Diagnosis
//!     sort: date_of_diagnosis
//!     date_fields: [date_of_diagnosis]
//! ```

use crate::constants::{DEMOGRAPHICS_FIELD, LOCATION_FIELD, TAGGING_FIELD};
use crate::error::{EpisodeError, EpisodeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Description of one record-collection field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDescriptor {
    /// Field name, also the key of the collection on the episode payload.
    pub name: String,

    /// Human-readable column heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Attribute that orders the collection, newest (largest) first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,

    /// Attributes of this field's records that hold `DD/MM/YYYY` dates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_fields: Vec<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            sort: None,
            date_fields: Vec::new(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn with_date_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.date_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Column heading, falling back to the field name.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }

    pub fn is_date_field(&self, attribute: &str) -> bool {
        self.date_fields.iter().any(|f| f == attribute)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocument {
    fields: Vec<FieldDescriptor>,
}

/// Read-only mapping from field name to descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRegistry {
    fields: BTreeMap<String, Arc<FieldDescriptor>>,
}

impl FieldRegistry {
    /// Builds a registry from descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`EpisodeError::InvalidRegistry`] if:
    /// - a descriptor has an empty name,
    /// - two descriptors share a name,
    /// - the mandatory `demographics` field is missing or declares a sort key (its first entry
    ///   identifies the patient, so the payload's order must be kept).
    pub fn new(descriptors: impl IntoIterator<Item = FieldDescriptor>) -> EpisodeResult<Self> {
        let mut fields = BTreeMap::new();
        for descriptor in descriptors {
            if descriptor.name.trim().is_empty() {
                return Err(EpisodeError::InvalidRegistry(
                    "field names cannot be empty".into(),
                ));
            }
            if descriptor.sort.as_deref().is_some_and(|s| s.trim().is_empty()) {
                return Err(EpisodeError::InvalidRegistry(format!(
                    "field '{}' has an empty sort key",
                    descriptor.name
                )));
            }
            let name = descriptor.name.clone();
            if fields.insert(name.clone(), Arc::new(descriptor)).is_some() {
                return Err(EpisodeError::InvalidRegistry(format!(
                    "field '{name}' is registered twice"
                )));
            }
        }

        match fields.get(DEMOGRAPHICS_FIELD) {
            None => {
                return Err(EpisodeError::InvalidRegistry(format!(
                    "the '{DEMOGRAPHICS_FIELD}' field must be registered"
                )))
            }
            Some(demographics) if demographics.sort.is_some() => {
                return Err(EpisodeError::InvalidRegistry(format!(
                    "the '{DEMOGRAPHICS_FIELD}' field cannot declare a sort key"
                )))
            }
            Some(_) => {}
        }

        Ok(Self { fields })
    }

    /// Parses a YAML schema document.
    pub fn from_yaml(text: &str) -> EpisodeResult<Self> {
        let doc: SchemaDocument = serde_yaml::from_str(text).map_err(EpisodeError::SchemaYaml)?;
        Self::new(doc.fields)
    }

    /// Parses a JSON schema document.
    pub fn from_json(text: &str) -> EpisodeResult<Self> {
        let doc: SchemaDocument = serde_json::from_str(text).map_err(EpisodeError::SchemaJson)?;
        Self::new(doc.fields)
    }

    /// Loads a schema document from disk; `.json` files are read as JSON, anything else as YAML.
    pub fn load(path: &Path) -> EpisodeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(EpisodeError::SchemaRead)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let registry = if is_json {
            Self::from_json(&text)?
        } else {
            Self::from_yaml(&text)?
        };
        tracing::debug!(
            "loaded {} fields from {}",
            registry.fields.len(),
            path.display()
        );
        Ok(registry)
    }

    /// The schema shipped with the application.
    pub fn builtin() -> Self {
        let descriptors = [
            FieldDescriptor::new(DEMOGRAPHICS_FIELD)
                .with_display_name("Demographics")
                .with_date_fields(["date_of_birth"]),
            FieldDescriptor::new(LOCATION_FIELD).with_display_name("Location"),
            FieldDescriptor::new(TAGGING_FIELD).with_display_name("Teams"),
            FieldDescriptor::new("allergies").with_display_name("Allergies"),
            FieldDescriptor::new("diagnosis")
                .with_display_name("Diagnosis")
                .with_sort("date_of_diagnosis")
                .with_date_fields(["date_of_diagnosis"]),
            FieldDescriptor::new("past_medical_history")
                .with_display_name("PMH")
                .with_date_fields(["year"]),
            FieldDescriptor::new("antimicrobial")
                .with_display_name("Antimicrobials")
                .with_sort("start_date")
                .with_date_fields(["start_date", "end_date"]),
            FieldDescriptor::new("microbiology_test")
                .with_display_name("Microbiology")
                .with_sort("date_ordered")
                .with_date_fields(["date_ordered"]),
            FieldDescriptor::new("general_note")
                .with_display_name("General Notes")
                .with_sort("date")
                .with_date_fields(["date"]),
            FieldDescriptor::new("travel").with_display_name("Travel"),
        ];

        Self {
            fields: descriptors
                .into_iter()
                .map(|d| (d.name.clone(), Arc::new(d)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<FieldDescriptor>> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
