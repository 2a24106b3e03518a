//! Ordering of episodes for list display.
//!
//! Episodes are compared key by key: location category (by its position in the configured
//! category ordering), hospital, ward, then bed. Each key function maps an episode to a
//! [`ComparisonKey`]; the first key that differs decides.

use crate::constants::{DEFAULT_CATEGORIES, DEFAULT_REFERENCE_HOSPITAL, LOCATION_FIELD};
use crate::episode::Episode;
use std::cmp::Ordering;

/// Value produced by a comparator for one episode.
///
/// Keys of different kinds order as `Missing < Number < Text`, so any mix of values sorts
/// consistently.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComparisonKey {
    Missing,
    Number(i64),
    Text(String),
}

impl ComparisonKey {
    fn text(value: Option<&str>) -> Self {
        value.map_or(ComparisonKey::Missing, |s| ComparisonKey::Text(s.to_string()))
    }
}

/// A key function used by [`Episode::compare_with`].
pub type Comparator<'a> = &'a dyn Fn(&Episode) -> ComparisonKey;

/// Settings for the default episode ordering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpisodeOrdering {
    categories: Vec<String>,
    reference_hospital: String,
}

impl Default for EpisodeOrdering {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            reference_hospital: DEFAULT_REFERENCE_HOSPITAL.to_string(),
        }
    }
}

impl EpisodeOrdering {
    pub fn new(categories: Vec<String>, reference_hospital: impl Into<String>) -> Self {
        Self {
            categories,
            reference_hospital: reference_hospital.into(),
        }
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Hospital whose `T<n>` wards are compared by their number.
    pub fn reference_hospital(&self) -> &str {
        &self.reference_hospital
    }

    /// Position of the episode's location category, `-1` when it is absent or unknown.
    pub fn category_key(&self, episode: &Episode) -> ComparisonKey {
        let category = location_text(episode, "category");
        let index = category
            .and_then(|c| self.categories.iter().position(|known| known == c))
            .and_then(|i| i64::try_from(i).ok())
            .unwrap_or(-1);
        ComparisonKey::Number(index)
    }

    pub fn hospital_key(&self, episode: &Episode) -> ComparisonKey {
        ComparisonKey::text(location_text(episode, "hospital"))
    }

    /// Ward number for `T<n>` wards of the reference hospital, otherwise the ward name.
    pub fn ward_key(&self, episode: &Episode) -> ComparisonKey {
        let Some(ward) = location_text(episode, "ward") else {
            return ComparisonKey::Missing;
        };

        let at_reference = location_text(episode, "hospital") == Some(self.reference_hospital());
        if at_reference {
            if let Some(number) = ward
                .strip_prefix('T')
                .filter(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
                .and_then(leading_integer)
            {
                return ComparisonKey::Number(number);
            }
        }
        ComparisonKey::Text(ward.to_string())
    }

    /// Leading integer of the bed, or missing when the bed is not numeric.
    pub fn bed_key(&self, episode: &Episode) -> ComparisonKey {
        let Some(bed) = episode
            .items(LOCATION_FIELD)
            .first()
            .and_then(|location| location.get("bed"))
        else {
            return ComparisonKey::Missing;
        };

        let number = match bed {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => leading_integer(s),
            _ => None,
        };
        number.map_or(ComparisonKey::Missing, ComparisonKey::Number)
    }

    /// Compares two episodes with the default keys.
    pub fn compare(&self, a: &Episode, b: &Episode) -> Ordering {
        let category = |e: &Episode| self.category_key(e);
        let hospital = |e: &Episode| self.hospital_key(e);
        let ward = |e: &Episode| self.ward_key(e);
        let bed = |e: &Episode| self.bed_key(e);
        a.compare_with(b, &[&category, &hospital, &ward, &bed])
    }
}

impl Episode {
    /// Compares with `other` using the default keys.
    pub fn compare(&self, other: &Episode, ordering: &EpisodeOrdering) -> Ordering {
        ordering.compare(self, other)
    }

    /// Compares with `other` key by key; the first unequal key decides.
    pub fn compare_with(&self, other: &Episode, comparators: &[Comparator<'_>]) -> Ordering {
        comparators
            .iter()
            .map(|key| key(self).cmp(&key(other)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Sorts episodes for list display using the default keys.
pub fn sort_episodes(episodes: &mut [Episode], ordering: &EpisodeOrdering) {
    episodes.sort_by(|a, b| ordering.compare(a, b));
}

fn location_text<'a>(episode: &'a Episode, attribute: &str) -> Option<&'a str> {
    episode
        .items(LOCATION_FIELD)
        .first()
        .and_then(|location| location.text(attribute))
}

/// Integer formed by the leading digits of `value`, after optional whitespace and sign.
fn leading_integer(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let number: i64 = rest[..digits_end].parse().ok()?;
    Some(if negative { -number } else { number })
}
