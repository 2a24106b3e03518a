//! Patient lookup by hospital number.
//!
//! Looking up a hospital number ends in one of three outcomes:
//!
//! - no patient has that number (or no number was given): a new patient,
//! - exactly one patient has it: an existing patient, translated into a [`PatientRecord`],
//! - several patients share it: an ambiguous result the user has to resolve.
//!
//! The outcome is available as a [`PatientMatch`] value via [`classify`], or dispatched to
//! [`LookupCallbacks`] via [`find_by_hospital_number`]. Nothing here holds state between
//! lookups.

use crate::error::LookupError;
use crate::transport::EpisodeTransport;
use epr_translate::{patient_to_record, PatientRecord};
use epr_types::HospitalNumber;
use serde_json::Value;

/// Raw outcome of a patient search.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
    hospital_number: Option<HospitalNumber>,
    patients: Vec<Value>,
}

impl SearchResult {
    /// Result of a lookup without a search key.
    pub fn empty() -> Self {
        Self {
            hospital_number: None,
            patients: Vec::new(),
        }
    }

    pub fn new(hospital_number: HospitalNumber, patients: Vec<Value>) -> Self {
        Self {
            hospital_number: Some(hospital_number),
            patients,
        }
    }

    /// The search key, `None` when the lookup was made with a blank number.
    pub fn hospital_number(&self) -> Option<&HospitalNumber> {
        self.hospital_number.as_ref()
    }

    /// Raw records of the matching patients.
    pub fn patients(&self) -> &[Value] {
        &self.patients
    }
}

/// Classified outcome of a lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum PatientMatch {
    NewPatient(SearchResult),
    ExistingPatient(Box<PatientRecord>),
    Ambiguous(SearchResult),
}

impl PatientMatch {
    /// The existing patient, if any; an ambiguous match becomes an error.
    pub fn existing(self) -> Result<Option<PatientRecord>, LookupError> {
        match self {
            PatientMatch::NewPatient(_) => Ok(None),
            PatientMatch::ExistingPatient(record) => Ok(Some(*record)),
            PatientMatch::Ambiguous(result) => Err(LookupError::Ambiguous {
                hospital_number: result
                    .hospital_number()
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_default(),
                count: result.patients.len(),
            }),
        }
    }
}

/// Receivers of a lookup's outcome.
pub trait LookupCallbacks {
    fn on_new_patient(&mut self, result: SearchResult);
    fn on_existing_patient(&mut self, record: PatientRecord);
    fn on_ambiguous(&mut self);
}

/// [`LookupCallbacks`] built from three closures.
pub struct LookupHandlers<N, E, A> {
    pub new_patient: N,
    pub existing_patient: E,
    pub ambiguous: A,
}

impl<N, E, A> LookupCallbacks for LookupHandlers<N, E, A>
where
    N: FnMut(SearchResult),
    E: FnMut(PatientRecord),
    A: FnMut(),
{
    fn on_new_patient(&mut self, result: SearchResult) {
        (self.new_patient)(result)
    }

    fn on_existing_patient(&mut self, record: PatientRecord) {
        (self.existing_patient)(record)
    }

    fn on_ambiguous(&mut self) {
        (self.ambiguous)()
    }
}

/// Searches for patients with the given hospital number.
///
/// A blank number yields an empty result without contacting the server.
pub async fn search_patients<T>(
    hospital_number: &str,
    transport: &T,
) -> Result<SearchResult, LookupError>
where
    T: EpisodeTransport + ?Sized,
{
    let Some(number) =
        HospitalNumber::parse_optional(hospital_number).map_err(LookupError::InvalidHospitalNumber)?
    else {
        return Ok(SearchResult::empty());
    };

    let patients = transport.search(&number).await?;
    tracing::info!(
        hospital_number = %number,
        matches = patients.len(),
        "patient search complete"
    );
    Ok(SearchResult::new(number, patients))
}

/// Classifies a search result, translating the patient on a single match.
pub fn classify(result: SearchResult) -> Result<PatientMatch, LookupError> {
    match result.patients.len() {
        0 => Ok(PatientMatch::NewPatient(result)),
        1 => {
            let raw = result.patients.into_iter().next().unwrap_or(Value::Null);
            let record = patient_to_record(raw)?;
            Ok(PatientMatch::ExistingPatient(Box::new(record)))
        }
        count => {
            tracing::warn!(
                hospital_number = ?result.hospital_number().map(HospitalNumber::as_str),
                count,
                "hospital number matches several patients"
            );
            Ok(PatientMatch::Ambiguous(result))
        }
    }
}

/// Looks up a hospital number and hands the outcome to `callbacks`.
///
/// Exactly one callback runs when this returns `Ok`. Invalid input, search failures and
/// untranslatable records are returned as errors and run no callback.
pub async fn find_by_hospital_number<T, C>(
    hospital_number: &str,
    transport: &T,
    callbacks: &mut C,
) -> Result<(), LookupError>
where
    T: EpisodeTransport + ?Sized,
    C: LookupCallbacks + ?Sized,
{
    let result = search_patients(hospital_number, transport).await?;
    match classify(result)? {
        PatientMatch::NewPatient(result) => callbacks.on_new_patient(result),
        PatientMatch::ExistingPatient(record) => callbacks.on_existing_patient(*record),
        PatientMatch::Ambiguous(_) => callbacks.on_ambiguous(),
    }
    Ok(())
}
