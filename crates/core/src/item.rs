//! Record items: the entries of an episode's named collections.
//!
//! An [`Item`] owns its raw attributes and shares its field's descriptor. It refers back to
//! its episode through an [`EpisodeHandle`], which is a plain identifier: items never keep
//! their episode alive and cannot form reference cycles with it.

use crate::constants::ID_ATTRIBUTE;
use crate::registry::FieldDescriptor;
use crate::RawAttributes;
use chrono::NaiveDate;
use epr_types::dates::parse_date;
use serde_json::Value;
use std::cmp::{Ordering, Reverse};
use std::sync::Arc;

/// Non-owning reference from an item to the episode that holds it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct EpisodeHandle(Option<i64>);

impl EpisodeHandle {
    pub fn new(episode_id: Option<i64>) -> Self {
        Self(episode_id)
    }

    /// Server id of the owning episode; `None` while the episode itself is unsaved.
    pub fn episode_id(&self) -> Option<i64> {
        self.0
    }
}

/// Capability of producing a detached copy of a record's attributes.
///
/// Callers that need to edit a record's attributes without touching the original (for example
/// when deriving tags) go through this trait.
pub trait MakeCopy {
    fn make_copy(&self) -> RawAttributes;
}

/// One record in an episode collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    id: Option<i64>,
    field: Arc<FieldDescriptor>,
    owner: EpisodeHandle,
    attributes: RawAttributes,
}

impl Item {
    /// Builds an item from raw attributes.
    ///
    /// The item id is read from the `id` attribute when it is an integer or a string holding
    /// one; anything else leaves the item unsaved.
    pub fn new(attributes: RawAttributes, owner: EpisodeHandle, field: Arc<FieldDescriptor>) -> Self {
        let id = attributes.get(ID_ATTRIBUTE).and_then(integer_id);
        Self {
            id,
            field,
            owner,
            attributes,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Name of the collection this item belongs in.
    pub fn column_name(&self) -> &str {
        &self.field.name
    }

    /// Sort key declared by the item's field.
    pub fn sort(&self) -> Option<&str> {
        self.field.sort.as_deref()
    }

    pub fn field(&self) -> &Arc<FieldDescriptor> {
        &self.field
    }

    pub fn owner(&self) -> EpisodeHandle {
        self.owner
    }

    pub fn attributes(&self) -> &RawAttributes {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// String attribute, `None` when absent or not a string.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Date attribute, parsed from its `DD/MM/YYYY` form.
    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        self.text(name).and_then(|s| parse_date(s).ok())
    }

    /// Sets an attribute, keeping the cached id in step with the `id` attribute.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if name == ID_ATTRIBUTE {
            self.id = integer_id(&value);
        }
        self.attributes.insert(name, value);
    }

    /// Value this item is ordered by under `key`.
    pub fn sort_value(&self, key: &str) -> SortValue {
        let value = self.attributes.get(key);
        match value {
            Some(Value::String(s)) if self.field.is_date_field(key) => match parse_date(s) {
                Ok(date) => SortValue::Date(date),
                Err(_) => SortValue::Text(s.clone()),
            },
            other => SortValue::from_json(other),
        }
    }
}

impl MakeCopy for Item {
    fn make_copy(&self) -> RawAttributes {
        self.attributes.clone()
    }
}

/// Totally ordered view of an attribute used to sort collections.
///
/// Values of different kinds order as: missing/null, booleans, numbers, dates, text.
#[derive(Clone, Debug)]
pub enum SortValue {
    Missing,
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl SortValue {
    fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => SortValue::Missing,
            Some(Value::Bool(b)) => SortValue::Bool(*b),
            Some(Value::Number(n)) => n.as_f64().map_or(SortValue::Missing, SortValue::Number),
            Some(Value::String(s)) => SortValue::Text(s.clone()),
            Some(other) => SortValue::Text(other.to_string()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortValue::Missing => 0,
            SortValue::Bool(_) => 1,
            SortValue::Number(_) => 2,
            SortValue::Date(_) => 3,
            SortValue::Text(_) => 4,
        }
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Bool(a), SortValue::Bool(b)) => a.cmp(b),
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Date(a), SortValue::Date(b)) => a.cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortValue {}

/// Orders items descending by `key`. Items with equal keys keep their relative order.
pub(crate) fn sort_descending(items: &mut [Item], key: &str) {
    items.sort_by_cached_key(|item| Reverse(item.sort_value(key)));
}

/// Record id held by an `id` attribute: an integer, or a string holding one.
pub(crate) fn integer_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// JavaScript-style truthiness of an attribute value.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
