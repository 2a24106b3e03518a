//! Patient search-result wire model and translation helpers.
//!
//! The patient search endpoint returns one JSON object per matching patient. This module
//! provides both the domain-level [`PatientRecord`] handed to the lookup workflow and a strict
//! wire model used to validate the payload.
//!
//! Responsibilities:
//! - Define public domain-level types for the existing-patient branch of a lookup
//! - Define a wire model for deserialisation
//! - Translate wire values into domain values (identifiers, `DD/MM/YYYY` dates)
//!
//! Notes:
//! - Unknown demographics attributes are preserved in [`Demographics::extra`]
//! - Any other top-level array is kept as a raw subrecord collection

use crate::{TranslateError, TranslateResult};
use chrono::NaiveDate;
use epr_types::dates::parse_date;
use epr_types::{HospitalNumber, PatientId};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

// ============================================================================
// Public domain-level types
// ============================================================================

/// Identity attributes of a patient, from the first demographics entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Demographics {
    /// Subrecord identifier of the demographics entry.
    pub id: Option<i64>,

    /// Patient identifier carried on the entry.
    pub patient_id: Option<PatientId>,

    /// Hospital number; absent for patients registered without one.
    pub hospital_number: Option<HospitalNumber>,

    pub first_name: Option<String>,

    pub surname: Option<String>,

    /// Date of birth, parsed from the `DD/MM/YYYY` wire form.
    pub date_of_birth: Option<NaiveDate>,

    /// Attributes not modelled above, preserved verbatim.
    pub extra: Map<String, Value>,
}

impl Demographics {
    /// Display name, `first_name` followed by `surname`.
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.surname.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

/// An existing patient, translated into entity field shape.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientRecord {
    /// Server identifier of the patient.
    pub id: i64,

    /// Demographics entries, in server order.
    pub demographics: Vec<Demographics>,

    /// Raw episode payloads keyed by episode id.
    ///
    /// These are left raw: turning them into episodes needs a field registry, which belongs to
    /// the caller.
    pub episodes: BTreeMap<i64, Map<String, Value>>,

    /// Patient-level subrecord collections, keyed by field name.
    pub subrecords: BTreeMap<String, Vec<Map<String, Value>>>,
}

impl PatientRecord {
    /// First demographics entry, if any.
    pub fn primary_demographics(&self) -> Option<&Demographics> {
        self.demographics.first()
    }

    /// Hospital number of the first demographics entry.
    pub fn hospital_number(&self) -> Option<&HospitalNumber> {
        self.primary_demographics()
            .and_then(|d| d.hospital_number.as_ref())
    }
}

// ============================================================================
// Public Patient operations
// ============================================================================

/// Patient translation operations.
///
/// This is a zero-sized type used for namespacing patient-related operations.
/// All methods are associated functions.
pub struct Patient;

impl Patient {
    /// Parse a patient record from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError`] if the text is not JSON or does not match the wire model.
    pub fn parse(json_text: &str) -> TranslateResult<PatientRecord> {
        let mut deserializer = serde_json::Deserializer::from_str(json_text);
        let wire = match serde_path_to_error::deserialize::<_, PatientWire>(&mut deserializer) {
            Ok(parsed) => parsed,
            Err(err) => return Err(schema_mismatch(err)),
        };
        wire_to_domain(wire)
    }

    /// Translate an already-decoded raw patient into a [`PatientRecord`].
    ///
    /// This uses `serde_path_to_error` to surface a best-effort path (e.g. `demographics.0.surname`)
    /// to the failing field when the payload does not match the wire model.
    ///
    /// # Errors
    ///
    /// Returns [`TranslateError`] if:
    /// - the payload does not match the wire model,
    /// - an identifier is empty,
    /// - a date is not in `DD/MM/YYYY` form,
    /// - an episode key is not an integer.
    pub fn translate(raw: Value) -> TranslateResult<PatientRecord> {
        let wire = match serde_path_to_error::deserialize::<_, PatientWire>(raw) {
            Ok(parsed) => parsed,
            Err(err) => return Err(schema_mismatch(err)),
        };
        wire_to_domain(wire)
    }
}

/// Translate a raw patient record into entity field shape.
pub fn patient_to_record(raw: Value) -> TranslateResult<PatientRecord> {
    Patient::translate(raw)
}

// ============================================================================
// Wire types (internal)
// ============================================================================

/// Wire representation of a patient search result.
#[derive(Clone, Debug, Deserialize)]
struct PatientWire {
    id: i64,

    #[serde(default)]
    demographics: Vec<DemographicsWire>,

    #[serde(default)]
    episodes: BTreeMap<String, Map<String, Value>>,

    #[serde(flatten)]
    subrecords: BTreeMap<String, Value>,
}

/// Wire representation of one demographics entry.
#[derive(Clone, Debug, Deserialize)]
struct DemographicsWire {
    #[serde(default)]
    id: Option<i64>,

    #[serde(default)]
    patient_id: Option<IdWire>,

    #[serde(default)]
    hospital_number: Option<String>,

    #[serde(default)]
    first_name: Option<String>,

    #[serde(default)]
    surname: Option<String>,

    #[serde(default)]
    date_of_birth: Option<String>,

    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Identifiers arrive as numbers from some servers and strings from others.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum IdWire {
    Number(i64),
    Text(String),
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn schema_mismatch<E: std::fmt::Display>(err: serde_path_to_error::Error<E>) -> TranslateError {
    let path = err.path().to_string();
    let source = err.into_inner();
    let path = if path.is_empty() || path == "." {
        "<root>"
    } else {
        path.as_str()
    };
    TranslateError::Translation(format!("Patient schema mismatch at {path}: {source}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn demographics_to_domain(
    index: usize,
    wire: DemographicsWire,
) -> TranslateResult<Demographics> {
    let patient_id = match wire.patient_id {
        None => None,
        Some(IdWire::Number(n)) => Some(PatientId::from(n)),
        Some(IdWire::Text(s)) => Some(PatientId::new(&s).map_err(|e| {
            TranslateError::InvalidInput(format!("demographics.{index}.patient_id: {e}"))
        })?),
    };

    let hospital_number = non_blank(wire.hospital_number)
        .map(|s| HospitalNumber::new(&s))
        .transpose()
        .map_err(|e| {
            TranslateError::InvalidInput(format!("demographics.{index}.hospital_number: {e}"))
        })?;

    let date_of_birth = non_blank(wire.date_of_birth)
        .map(|s| parse_date(&s))
        .transpose()
        .map_err(|e| TranslateError::InvalidDate {
            field: format!("demographics.{index}.date_of_birth"),
            source: e,
        })?;

    Ok(Demographics {
        id: wire.id,
        patient_id,
        hospital_number,
        first_name: wire.first_name,
        surname: wire.surname,
        date_of_birth,
        extra: wire.extra,
    })
}

/// Convert wire format patient to domain type.
fn wire_to_domain(wire: PatientWire) -> TranslateResult<PatientRecord> {
    let demographics = wire
        .demographics
        .into_iter()
        .enumerate()
        .map(|(index, d)| demographics_to_domain(index, d))
        .collect::<TranslateResult<Vec<_>>>()?;

    let episodes = wire
        .episodes
        .into_iter()
        .map(|(key, episode)| {
            key.parse::<i64>()
                .map(|id| (id, episode))
                .map_err(|_| TranslateError::InvalidInput(format!("episode key '{key}' is not an id")))
        })
        .collect::<TranslateResult<BTreeMap<_, _>>>()?;

    // Only arrays of objects are subrecord collections; scalar extras are dropped.
    let subrecords = wire
        .subrecords
        .into_iter()
        .filter_map(|(name, value)| match value {
            Value::Array(entries) => Some((name, entries)),
            _ => None,
        })
        .map(|(name, entries)| {
            let rows = entries
                .into_iter()
                .map(|entry| match entry {
                    Value::Object(map) => Ok(map),
                    other => Err(TranslateError::InvalidInput(format!(
                        "{name} entries must be objects, got {other}"
                    ))),
                })
                .collect::<TranslateResult<Vec<_>>>()?;
            Ok((name, rows))
        })
        .collect::<TranslateResult<BTreeMap<_, _>>>()?;

    Ok(PatientRecord {
        id: wire.id,
        demographics,
        episodes,
        subrecords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "id": 7,
            "demographics": [{
                "id": 3,
                "patient_id": 7,
                "hospital_number": "123",
                "first_name": "Sarah",
                "surname": "Williams",
                "date_of_birth": "20/03/1992",
                "ethnicity": "Other"
            }],
            "episodes": {
                "11": { "id": 11, "category_name": "inpatient" }
            },
            "allergies": [{ "id": 1, "drug": "penicillin" }]
        })
    }

    #[test]
    fn translates_sample_patient() {
        let record = Patient::translate(sample()).expect("should translate patient");

        assert_eq!(record.id, 7);
        let demographics = record.primary_demographics().expect("demographics present");
        assert_eq!(demographics.patient_id, Some(PatientId::from(7)));
        assert_eq!(
            demographics.hospital_number.as_ref().map(|h| h.as_str()),
            Some("123")
        );
        assert_eq!(
            demographics.date_of_birth,
            NaiveDate::from_ymd_opt(1992, 3, 20)
        );
        assert_eq!(demographics.full_name(), "Sarah Williams");
        assert_eq!(demographics.extra.get("ethnicity"), Some(&json!("Other")));
        assert!(record.episodes.contains_key(&11));
        assert_eq!(record.subrecords["allergies"].len(), 1);
    }

    #[test]
    fn parse_accepts_json_text() {
        let text = sample().to_string();
        let record = Patient::parse(&text).expect("should parse JSON text");
        assert_eq!(record.hospital_number().map(|h| h.as_str()), Some("123"));
    }

    #[test]
    fn wrong_type_reports_path() {
        let raw = json!({
            "id": 7,
            "demographics": [{ "surname": ["not", "a", "string"] }]
        });

        let err = Patient::translate(raw).expect_err("should reject wrong type");
        match err {
            TranslateError::Translation(msg) => {
                assert!(msg.starts_with("Patient schema mismatch"), "{msg}")
            }
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_wire_date_of_birth() {
        let raw = json!({
            "id": 7,
            "demographics": [{ "date_of_birth": "1992-03-20" }]
        });

        let err = Patient::translate(raw).expect_err("should reject ISO date");
        assert!(matches!(err, TranslateError::InvalidDate { .. }));
    }

    #[test]
    fn blank_optional_fields_become_none() {
        let raw = json!({
            "id": 1,
            "demographics": [{ "hospital_number": "", "date_of_birth": "" }]
        });

        let record = Patient::translate(raw).expect("blank fields are allowed");
        let demographics = &record.demographics[0];
        assert!(demographics.hospital_number.is_none());
        assert!(demographics.date_of_birth.is_none());
    }

    #[test]
    fn rejects_non_numeric_episode_key() {
        let raw = json!({ "id": 1, "episodes": { "abc": {} } });
        let err = Patient::translate(raw).expect_err("episode keys must be ids");
        assert!(matches!(err, TranslateError::InvalidInput(_)));
    }

    #[test]
    fn accepts_string_patient_id() {
        let raw = json!({ "id": 1, "demographics": [{ "patient_id": "X1" }] });
        let record = Patient::translate(raw).expect("string ids are allowed");
        assert_eq!(
            record.demographics[0].patient_id.as_ref().map(|p| p.as_str()),
            Some("X1")
        );
    }
}
