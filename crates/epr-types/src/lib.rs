//! Validated identifier types shared across the EPR crates.
//!
//! Raw episode and patient payloads carry identifiers as loosely typed JSON values. The types in
//! this crate are the point where those values become trusted: once constructed, a
//! [`PatientId`] or [`HospitalNumber`] is known to be non-empty and trimmed.
//!
//! The [`dates`] module holds the `DD/MM/YYYY` wire format used for episode and demographics
//! dates.

pub mod dates;

/// Errors that can occur when creating validated text types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input contained characters that are not allowed in an identifier
    #[error("Text contains control characters")]
    ControlCharacters,
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Arguments
    ///
    /// * `input` - Any type that can be converted to a string reference
    ///
    /// # Returns
    ///
    /// Returns `Ok(NonEmptyText)` if the trimmed input is non-empty,
    /// or `Err(TextError::Empty)` if it's empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Identifier of a patient as carried by the first demographics entry of an episode.
///
/// Servers send this either as a JSON number or as a string; both are normalised to their
/// textual form so the episode link can be derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatientId(NonEmptyText);

impl PatientId {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        NonEmptyText::new(input).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<i64> for PatientId {
    fn from(value: i64) -> Self {
        Self(NonEmptyText(value.to_string()))
    }
}

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Hospital number used as the patient search key.
///
/// Hospital numbers are free text assigned by the hospital's patient administration system.
/// They must be non-empty after trimming and may not contain control characters, since they are
/// sent verbatim as a query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HospitalNumber(NonEmptyText);

impl HospitalNumber {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let text = NonEmptyText::new(input)?;
        if text.as_str().chars().any(char::is_control) {
            return Err(TextError::ControlCharacters);
        }
        Ok(Self(text))
    }

    /// Parses an optional search key, mapping blank input to `None`.
    ///
    /// A blank key is not an error for the lookup workflow: it means "no existing patient".
    pub fn parse_optional(input: &str) -> Result<Option<Self>, TextError> {
        match Self::new(input) {
            Ok(number) => Ok(Some(number)),
            Err(TextError::Empty) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for HospitalNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for HospitalNumber {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
