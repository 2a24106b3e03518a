//! `DD/MM/YYYY` date wire format.
//!
//! Episode and demographics dates travel as day-first strings. Inside the application they are
//! `chrono::NaiveDate` values; these helpers are the only place the two representations meet.

use chrono::NaiveDate;

/// `strftime` pattern of the wire format.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// A string that could not be read as a `DD/MM/YYYY` date.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid date '{value}', expected DD/MM/YYYY")]
pub struct DateError {
    pub value: String,
}

/// Parses a wire date.
pub fn parse_date(value: &str) -> Result<NaiveDate, DateError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| DateError {
        value: value.to_string(),
    })
}

/// Formats a date for the wire.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
