//! The episode entity.
//!
//! An [`Episode`] is built from a raw payload (a JSON object) and a [`FieldRegistry`]. Building
//! it:
//!
//! - checks that the first `demographics` entry carries a patient id,
//! - turns every registered field into a collection of [`Item`]s (sorted when the field declares
//!   a sort key; empty when the payload has nothing for it),
//! - parses the five episode dates from `DD/MM/YYYY`,
//! - keeps every other attribute as-is,
//! - derives the episode's link.
//!
//! Construction either yields a fully normalised episode or an [`EpisodeError`]; there is no
//! partially built state.

use crate::constants::{
    CATEGORY_NAME_ATTRIBUTE, CONSISTENCY_TOKEN_ATTRIBUTE, DEMOGRAPHICS_FIELD, DISCHARGED_CATEGORY,
    ID_ATTRIBUTE, LOCATION_FIELD, PATIENT_ID_ATTRIBUTE, TAGGING_FIELD,
};
use crate::error::{EpisodeError, EpisodeResult};
use crate::item::{integer_id, is_truthy, sort_descending, EpisodeHandle, Item, MakeCopy};
use crate::registry::{FieldDescriptor, FieldRegistry};
use crate::RawAttributes;
use chrono::{Local, NaiveDate, NaiveDateTime};
use epr_types::dates::parse_date;
use epr_types::PatientId;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// DATE ATTRIBUTES
// ============================================================================

/// The date attributes stored on the episode itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DateField {
    DateOfAdmission,
    DischargeDate,
    DateOfEpisode,
    Start,
    End,
}

impl DateField {
    pub const ALL: [DateField; 5] = [
        DateField::DateOfAdmission,
        DateField::DischargeDate,
        DateField::DateOfEpisode,
        DateField::Start,
        DateField::End,
    ];

    /// Attribute name on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            DateField::DateOfAdmission => "date_of_admission",
            DateField::DischargeDate => "discharge_date",
            DateField::DateOfEpisode => "date_of_episode",
            DateField::Start => "start",
            DateField::End => "end",
        }
    }
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native values of the episode's date attributes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct EpisodeDates {
    date_of_admission: Option<NaiveDate>,
    discharge_date: Option<NaiveDate>,
    date_of_episode: Option<NaiveDate>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl EpisodeDates {
    fn get(&self, field: DateField) -> Option<NaiveDate> {
        match field {
            DateField::DateOfAdmission => self.date_of_admission,
            DateField::DischargeDate => self.discharge_date,
            DateField::DateOfEpisode => self.date_of_episode,
            DateField::Start => self.start,
            DateField::End => self.end,
        }
    }

    fn slot(&mut self, field: DateField) -> &mut Option<NaiveDate> {
        match field {
            DateField::DateOfAdmission => &mut self.date_of_admission,
            DateField::DischargeDate => &mut self.discharge_date,
            DateField::DateOfEpisode => &mut self.date_of_episode,
            DateField::Start => &mut self.start,
            DateField::End => &mut self.end,
        }
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Shallow pre-edit baseline of an episode's editable scalar attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EpisodeSnapshot {
    pub id: Option<i64>,
    pub category_name: Option<Value>,
    pub date_of_admission: Option<NaiveDate>,
    pub date_of_episode: Option<NaiveDate>,
    pub discharge_date: Option<NaiveDate>,
    pub consistency_token: Option<Value>,
}

/// Options for [`Episode::new_item`].
#[derive(Clone, Debug, Default)]
pub struct NewItemOptions {
    /// Descriptor to use instead of the registry entry for the column.
    pub column: Option<Arc<FieldDescriptor>>,
}

// ============================================================================
// EPISODE
// ============================================================================

/// One clinical episode of care.
#[derive(Clone, Debug)]
pub struct Episode {
    registry: Arc<FieldRegistry>,
    id: Option<i64>,
    consistency_token: Option<Value>,
    category_name: Option<Value>,
    dates: EpisodeDates,
    collections: BTreeMap<String, Vec<Item>>,
    attributes: RawAttributes,
    patient_id: PatientId,
    link: String,
}

impl Episode {
    /// Builds an episode from a raw payload.
    ///
    /// # Arguments
    ///
    /// * `raw` - The episode payload as sent by the server.
    /// * `registry` - The record fields to materialise as collections.
    ///
    /// # Errors
    ///
    /// Returns [`EpisodeError`] if:
    /// - `demographics` is missing or empty, or its first entry has no patient id
    ///   (checked before anything else is materialised),
    /// - a registered field holds something other than a list of records,
    /// - a date attribute is not in `DD/MM/YYYY` form.
    ///
    /// `consistency_token` and `category_name` are kept whatever their JSON type. An `id` that
    /// is not an integer (or a string holding one) stays among the plain attributes and leaves
    /// the episode without an id.
    pub fn new(mut raw: RawAttributes, registry: Arc<FieldRegistry>) -> EpisodeResult<Self> {
        let patient_id = demographics_patient_id(&raw)?;

        let id = take_id(&mut raw);
        let consistency_token = take_scalar(&mut raw, CONSISTENCY_TOKEN_ATTRIBUTE);
        let category_name = take_scalar(&mut raw, CATEGORY_NAME_ATTRIBUTE);
        let owner = EpisodeHandle::new(id);

        let mut collections = BTreeMap::new();
        for field in registry.iter() {
            let items = take_collection(&mut raw, field, owner)?;
            collections.insert(field.name.clone(), items);
        }

        let mut dates = EpisodeDates::default();
        for field in DateField::ALL {
            *dates.slot(field) = take_date(&mut raw, field)?;
        }

        let link = match id {
            Some(id) => format!("/patient/{patient_id}/{id}"),
            None => format!("/patient/{patient_id}"),
        };

        tracing::debug!(
            episode_id = ?id,
            collections = collections.len(),
            "initialised episode"
        );

        Ok(Self {
            registry,
            id,
            consistency_token,
            category_name,
            dates,
            collections,
            attributes: raw,
            patient_id,
            link,
        })
    }

    /// Builds an episode from a JSON value, which must be an object.
    pub fn from_value(raw: Value, registry: Arc<FieldRegistry>) -> EpisodeResult<Self> {
        match raw {
            Value::Object(map) => Self::new(map, registry),
            other => Err(EpisodeError::InvalidInput(format!(
                "episode payload must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// The consistency token when the server sent a string.
    pub fn consistency_token(&self) -> Option<&str> {
        self.consistency_token.as_ref().and_then(Value::as_str)
    }

    /// The consistency token exactly as the server sent it.
    pub fn consistency_token_value(&self) -> Option<&Value> {
        self.consistency_token.as_ref()
    }

    pub fn category_name(&self) -> Option<&str> {
        self.category_name.as_ref().and_then(Value::as_str)
    }

    pub fn date(&self, field: DateField) -> Option<NaiveDate> {
        self.dates.get(field)
    }

    /// Attributes that are neither collections, dates nor the fixed scalars.
    pub fn attributes(&self) -> &RawAttributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn patient_id(&self) -> &PatientId {
        &self.patient_id
    }

    /// Route of the episode's detail view, `/patient/<patient id>/<episode id>`.
    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.registry
    }

    /// Handle items use to refer back to this episode.
    pub fn handle(&self) -> EpisodeHandle {
        EpisodeHandle::new(self.id)
    }

    /// The named collection, or an empty slice for a name the episode does not hold.
    pub fn items(&self, name: &str) -> &[Item] {
        self.collections.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn get_item(&self, name: &str, index: usize) -> Option<&Item> {
        self.items(name).get(index)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    // ------------------------------------------------------------------------
    // Collection mutation
    // ------------------------------------------------------------------------

    /// Re-orders a collection descending by `sort_key`.
    pub fn sort_column(&mut self, name: &str, sort_key: &str) {
        if let Some(items) = self.collections.get_mut(name) {
            if !items.is_empty() {
                sort_descending(items, sort_key);
            }
        }
    }

    /// Creates an unsaved item for a collection without inserting it.
    ///
    /// # Errors
    ///
    /// Returns [`EpisodeError::UnknownField`] if `name` is not registered and no descriptor
    /// override is given.
    pub fn new_item(&self, name: &str, options: NewItemOptions) -> EpisodeResult<Item> {
        let field = match options.column {
            Some(column) => column,
            None => self
                .registry
                .get(name)
                .cloned()
                .ok_or_else(|| EpisodeError::UnknownField(name.to_string()))?,
        };
        Ok(Item::new(RawAttributes::new(), self.handle(), field))
    }

    /// Appends an item to the collection named by its field, re-sorting if the field has a
    /// sort key.
    pub fn add_item(&mut self, item: Item) {
        let name = item.column_name().to_string();
        let sort = item.sort().map(str::to_string);
        self.collections.entry(name.clone()).or_default().push(item);
        if let Some(sort) = sort {
            self.sort_column(&name, &sort);
        }
        tracing::debug!(episode_id = ?self.id, column = %name, "added item");
    }

    /// Removes the first entry of the item's collection with the same id.
    ///
    /// Unsaved items (no id) match the first unsaved entry. Returns the removed entry, or `None`
    /// if nothing matched.
    pub fn remove_item(&mut self, item: &Item) -> Option<Item> {
        let items = self.collections.get_mut(item.column_name())?;
        let index = items.iter().position(|candidate| candidate.id() == item.id())?;
        tracing::debug!(episode_id = ?self.id, column = %item.column_name(), "removed item");
        Some(items.remove(index))
    }

    // ------------------------------------------------------------------------
    // Derived queries
    // ------------------------------------------------------------------------

    fn demographics(&self) -> Option<&Item> {
        self.items(DEMOGRAPHICS_FIELD).first()
    }

    fn location(&self) -> Option<&Item> {
        self.items(LOCATION_FIELD).first()
    }

    /// First name and surname from the first demographics entry.
    pub fn full_name(&self) -> String {
        let demographics = self.demographics();
        let first_name = demographics
            .and_then(|d| d.text("first_name"))
            .unwrap_or_default();
        let surname = demographics
            .and_then(|d| d.text("surname"))
            .unwrap_or_default();
        format!("{first_name} {surname}")
    }

    pub fn number_of_items(&self, name: &str) -> usize {
        self.items(name).len()
    }

    /// Names of the truthy attributes of the first tagging entry, excluding its id.
    pub fn tags(&self) -> Vec<String> {
        let Some(tagging) = self.items(TAGGING_FIELD).first() else {
            return Vec::new();
        };
        let mut tags = tagging.make_copy();
        tags.remove(ID_ATTRIBUTE);
        tags.into_iter()
            .filter(|(_, value)| is_truthy(value))
            .map(|(name, _)| name)
            .collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|t| t == tag)
    }

    /// True if the current location is "Discharged" or the discharge date has passed.
    pub fn is_discharged(&self) -> bool {
        self.is_discharged_at(Local::now().naive_local())
    }

    /// [`is_discharged`](Self::is_discharged) evaluated at `now`.
    ///
    /// A discharge date counts from the start of that day.
    pub fn is_discharged_at(&self, now: NaiveDateTime) -> bool {
        let discharged_location = self
            .location()
            .and_then(|l| l.text("category"))
            .is_some_and(|c| c == DISCHARGED_CATEGORY);

        discharged_location
            || self
                .dates
                .discharge_date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .is_some_and(|midnight| midnight < now)
    }

    /// Shallow snapshot of the editable scalar attributes.
    pub fn make_copy(&self) -> EpisodeSnapshot {
        EpisodeSnapshot {
            id: self.id,
            category_name: self.category_name.clone(),
            date_of_admission: self.dates.date_of_admission,
            date_of_episode: self.dates.date_of_episode,
            discharge_date: self.dates.discharge_date,
            consistency_token: self.consistency_token.clone(),
        }
    }
}

// ============================================================================
// CONSTRUCTION HELPERS
// ============================================================================

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn demographics_patient_id(raw: &RawAttributes) -> EpisodeResult<PatientId> {
    let first = raw
        .get(DEMOGRAPHICS_FIELD)
        .and_then(Value::as_array)
        .and_then(|entries| entries.first())
        .ok_or(EpisodeError::MissingDemographics)?;

    match first.get(PATIENT_ID_ATTRIBUTE) {
        None | Some(Value::Null) => Err(EpisodeError::MissingPatientId),
        Some(Value::String(s)) => PatientId::new(s).map_err(EpisodeError::InvalidPatientId),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(n) => Ok(PatientId::from(n)),
            None => PatientId::new(n.to_string()).map_err(EpisodeError::InvalidPatientId),
        },
        Some(other) => Err(EpisodeError::InvalidAttribute {
            field: format!("{DEMOGRAPHICS_FIELD}.0.{PATIENT_ID_ATTRIBUTE}"),
            found: json_kind(other).to_string(),
        }),
    }
}

/// Removes the `id` attribute when it holds an integer id; anything else is left in place.
fn take_id(raw: &mut RawAttributes) -> Option<i64> {
    let id = raw.get(ID_ATTRIBUTE).and_then(integer_id)?;
    raw.remove(ID_ATTRIBUTE);
    Some(id)
}

fn take_scalar(raw: &mut RawAttributes, name: &str) -> Option<Value> {
    raw.remove(name).filter(|value| !value.is_null())
}

fn take_collection(
    raw: &mut RawAttributes,
    field: &Arc<FieldDescriptor>,
    owner: EpisodeHandle,
) -> EpisodeResult<Vec<Item>> {
    let entries = match raw.remove(&field.name) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(EpisodeError::InvalidCollection {
                field: field.name.clone(),
            })
        }
    };

    let mut items = entries
        .into_iter()
        .map(|entry| match entry {
            Value::Object(attrs) => Ok(Item::new(attrs, owner, field.clone())),
            _ => Err(EpisodeError::InvalidCollection {
                field: field.name.clone(),
            }),
        })
        .collect::<EpisodeResult<Vec<_>>>()?;

    if let Some(sort) = field.sort.as_deref() {
        sort_descending(&mut items, sort);
    }
    Ok(items)
}

fn take_date(raw: &mut RawAttributes, field: DateField) -> EpisodeResult<Option<NaiveDate>> {
    match raw.remove(field.as_str()) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => {
            parse_date(&s)
                .map(Some)
                .map_err(|source| EpisodeError::InvalidDate {
                    field: field.as_str().into(),
                    source,
                })
        }
        Some(other) => Err(EpisodeError::InvalidAttribute {
            field: field.as_str().into(),
            found: json_kind(&other).to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Arc<FieldRegistry> {
        Arc::new(FieldRegistry::builtin())
    }

    fn raw(value: Value) -> RawAttributes {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn sample() -> RawAttributes {
        raw(json!({
            "id": 12,
            "consistency_token": "a1b2c3d4",
            "category_name": "inpatient",
            "active": true,
            "date_of_admission": "03/11/2014",
            "discharge_date": null,
            "demographics": [{
                "id": 1,
                "patient_id": 7,
                "first_name": "Sarah",
                "surname": "Williams",
                "hospital_number": "123"
            }],
            "location": [{
                "id": 2,
                "category": "Inepisode",
                "hospital": "UCH",
                "ward": "T10",
                "bed": "4"
            }],
            "diagnosis": [
                {"id": 3, "condition": "Malaria", "date_of_diagnosis": "01/11/2014"},
                {"id": 4, "condition": "Anaemia", "date_of_diagnosis": "02/11/2014"}
            ],
            "tagging": [{"id": 5, "infectious": true, "tropical": false}]
        }))
    }

    #[test]
    fn construction_normalises_payload() {
        let episode = Episode::new(sample(), registry()).expect("valid episode");

        assert_eq!(episode.id(), Some(12));
        assert_eq!(episode.consistency_token(), Some("a1b2c3d4"));
        assert_eq!(episode.category_name(), Some("inpatient"));
        assert_eq!(
            episode.date(DateField::DateOfAdmission),
            NaiveDate::from_ymd_opt(2014, 11, 3)
        );
        assert_eq!(episode.date(DateField::DischargeDate), None);
        assert_eq!(episode.attribute("active"), Some(&json!(true)));
        assert_eq!(episode.link(), "/patient/7/12");
        assert_eq!(episode.full_name(), "Sarah Williams");
    }

    #[test]
    fn every_registered_field_is_present() {
        let episode = Episode::new(sample(), registry()).expect("valid episode");
        for name in episode.registry().names() {
            assert!(
                episode.collection_names().any(|n| n == name),
                "{name} should be present"
            );
        }
        assert_eq!(episode.number_of_items("allergies"), 0);
        assert!(episode.attribute("allergies").is_none());
    }

    #[test]
    fn sorted_fields_are_descending() {
        let episode = Episode::new(sample(), registry()).expect("valid episode");
        let ids: Vec<_> = episode.items("diagnosis").iter().filter_map(Item::id).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[test]
    fn items_refer_back_to_episode() {
        let episode = Episode::new(sample(), registry()).expect("valid episode");
        let item = episode.get_item("diagnosis", 0).expect("diagnosis present");
        assert_eq!(item.owner(), episode.handle());
        assert_eq!(item.owner().episode_id(), Some(12));
    }

    #[test]
    fn missing_demographics_fails() {
        let err = Episode::new(raw(json!({"id": 1})), registry())
            .expect_err("demographics is mandatory");
        assert!(matches!(err, EpisodeError::MissingDemographics));
        assert!(err.is_construction());

        let err = Episode::new(raw(json!({"id": 1, "demographics": []})), registry())
            .expect_err("empty demographics should fail");
        assert!(matches!(err, EpisodeError::MissingDemographics));
    }

    #[test]
    fn missing_patient_id_fails_before_collections_are_checked() {
        // The broken diagnosis collection would fail too; the demographics check comes first.
        let payload = raw(json!({
            "demographics": [{"first_name": "Sarah"}],
            "diagnosis": "not a list"
        }));
        let err = Episode::new(payload, registry()).expect_err("patient id is mandatory");
        assert!(matches!(err, EpisodeError::MissingPatientId));

        let payload = raw(json!({"demographics": [{"patient_id": "  "}]}));
        let err = Episode::new(payload, registry()).expect_err("blank patient id should fail");
        assert!(matches!(err, EpisodeError::InvalidPatientId(_)));
    }

    #[test]
    fn rejects_malformed_dates_and_collections() {
        let mut payload = sample();
        payload.insert("date_of_admission".into(), json!("2014-11-03"));
        let err = Episode::new(payload, registry()).expect_err("ISO date should fail");
        assert!(matches!(err, EpisodeError::InvalidDate { ref field, .. } if field == "date_of_admission"));

        let mut payload = sample();
        payload.insert("allergies".into(), json!([1, 2]));
        let err = Episode::new(payload, registry()).expect_err("non-object entries should fail");
        assert!(matches!(err, EpisodeError::InvalidCollection { ref field } if field == "allergies"));
    }

    #[test]
    fn non_string_scalars_are_kept() {
        let payload = raw(json!({
            "id": "draft",
            "consistency_token": 3,
            "category_name": 5,
            "demographics": [{"patient_id": "X1"}]
        }));
        let episode = Episode::new(payload, registry()).expect("scalars never block construction");

        assert_eq!(episode.id(), None);
        assert_eq!(episode.attribute("id"), Some(&json!("draft")));
        assert_eq!(episode.consistency_token(), None);
        assert_eq!(episode.consistency_token_value(), Some(&json!(3)));
        assert_eq!(episode.category_name(), None);

        let copy = episode.make_copy();
        assert_eq!(copy.consistency_token, Some(json!(3)));
        assert_eq!(copy.category_name, Some(json!(5)));
    }

    #[test]
    fn numeric_string_id_is_read() {
        let payload = raw(json!({"id": "12", "demographics": [{"patient_id": "X1"}]}));
        let episode = Episode::new(payload, registry()).expect("valid episode");
        assert_eq!(episode.id(), Some(12));
        assert_eq!(episode.link(), "/patient/X1/12");
        assert!(episode.attribute("id").is_none());
    }

    #[test]
    fn first_demographics_entry_is_kept_first() {
        let payload = raw(json!({
            "id": 4,
            "demographics": [
                {"id": 1, "patient_id": "X1", "first_name": "Sarah", "surname": "Williams"},
                {"id": 2, "first_name": "Ann"}
            ]
        }));
        let episode = Episode::new(payload, registry()).expect("valid episode");

        let first = episode.get_item("demographics", 0).expect("demographics entry");
        assert_eq!(first.text("patient_id"), Some("X1"));
        assert_eq!(episode.link(), "/patient/X1/4");
        assert_eq!(episode.full_name(), "Sarah Williams");
    }

    #[test]
    fn link_without_id_stops_at_patient() {
        let payload = raw(json!({"demographics": [{"patient_id": "X1"}]}));
        let episode = Episode::new(payload, registry()).expect("id is optional");
        assert_eq!(episode.link(), "/patient/X1");
        assert_eq!(episode.handle().episode_id(), None);
    }

    #[test]
    fn tags_scenario() {
        let payload = raw(json!({
            "demographics": [{"patient_id": "X1"}],
            "tagging": [{"infectious": true, "id": 5}]
        }));
        let episode = Episode::new(payload, registry()).expect("valid episode");

        assert_eq!(episode.tags(), vec!["infectious".to_string()]);
        assert!(episode.has_tag("infectious"));
        assert!(!episode.has_tag("other"));
        // Deriving tags never touches the stored entry.
        assert_eq!(episode.items("tagging")[0].id(), Some(5));
    }

    #[test]
    fn no_tagging_means_no_tags() {
        let payload = raw(json!({"demographics": [{"patient_id": 1}]}));
        let episode = Episode::new(payload, registry()).expect("valid episode");
        assert!(episode.tags().is_empty());
    }

    #[test]
    fn new_item_then_add_item_grows_only_that_collection() {
        let mut episode = Episode::new(sample(), registry()).expect("valid episode");
        let before_diagnosis = episode.number_of_items("diagnosis");
        let before_allergies = episode.number_of_items("allergies");

        let item = episode
            .new_item("allergies", NewItemOptions::default())
            .expect("allergies registered");
        assert_eq!(item.owner(), episode.handle());
        assert_eq!(episode.number_of_items("allergies"), before_allergies);

        episode.add_item(item);

        assert_eq!(episode.number_of_items("allergies"), before_allergies + 1);
        assert_eq!(episode.number_of_items("diagnosis"), before_diagnosis);
    }

    #[test]
    fn new_item_rejects_unknown_column() {
        let episode = Episode::new(sample(), registry()).expect("valid episode");
        let err = episode
            .new_item("nonsense", NewItemOptions::default())
            .expect_err("unregistered column");
        assert!(matches!(err, EpisodeError::UnknownField(name) if name == "nonsense"));
    }

    #[test]
    fn new_item_accepts_descriptor_override() {
        let mut episode = Episode::new(sample(), registry()).expect("valid episode");
        let column = Arc::new(FieldDescriptor::new("legacy_notes"));
        let item = episode
            .new_item("anything", NewItemOptions { column: Some(column) })
            .expect("override bypasses registry");
        assert_eq!(item.column_name(), "legacy_notes");

        episode.add_item(item);
        assert_eq!(episode.number_of_items("legacy_notes"), 1);
    }

    #[test]
    fn add_then_remove_restores_collection() {
        let mut episode = Episode::new(sample(), registry()).expect("valid episode");
        let before: Vec<_> = episode.items("diagnosis").to_vec();

        let mut item = episode
            .new_item("diagnosis", NewItemOptions::default())
            .expect("diagnosis registered");
        item.set("id", json!(99));
        item.set("date_of_diagnosis", json!("05/11/2014"));
        episode.add_item(item.clone());

        assert_eq!(episode.get_item("diagnosis", 0).and_then(Item::id), Some(99));

        let removed = episode.remove_item(&item).expect("item should be removed");
        assert_eq!(removed.id(), Some(99));
        assert_eq!(episode.items("diagnosis"), before.as_slice());
    }

    #[test]
    fn add_then_remove_restores_collection_without_dates() {
        let mut payload = sample();
        payload.insert(
            "diagnosis".into(),
            json!([{"id": 1, "condition": "Malaria"}, {"id": 2, "condition": "Anaemia"}]),
        );
        let mut episode = Episode::new(payload, registry()).expect("valid episode");
        let before: Vec<_> = episode.items("diagnosis").iter().filter_map(Item::id).collect();
        assert_eq!(before, vec![1, 2]);

        let mut item = episode
            .new_item("diagnosis", NewItemOptions::default())
            .expect("diagnosis registered");
        item.set("id", json!(99));
        episode.add_item(item.clone());
        episode.remove_item(&item).expect("item should be removed");

        let after: Vec<_> = episode.items("diagnosis").iter().filter_map(Item::id).collect();
        assert_eq!(after, before);
    }

    #[test]
    fn remove_missing_item_is_noop() {
        let mut episode = Episode::new(sample(), registry()).expect("valid episode");
        let mut stranger = episode
            .new_item("diagnosis", NewItemOptions::default())
            .expect("diagnosis registered");
        stranger.set("id", json!(1000));

        assert!(episode.remove_item(&stranger).is_none());
        assert_eq!(episode.number_of_items("diagnosis"), 2);
    }

    #[test]
    fn sort_column_reorders_by_given_key() {
        let mut episode = Episode::new(sample(), registry()).expect("valid episode");
        episode.sort_column("diagnosis", "condition");
        let conditions: Vec<_> = episode
            .items("diagnosis")
            .iter()
            .filter_map(|i| i.text("condition"))
            .collect();
        assert_eq!(conditions, vec!["Malaria", "Anaemia"]);

        // Empty and unknown collections are left alone.
        episode.sort_column("allergies", "drug");
        episode.sort_column("nonsense", "drug");
    }

    #[test]
    fn discharged_by_location_category() {
        let mut payload = sample();
        payload.insert(
            "location".into(),
            json!([{"category": "Discharged", "hospital": "UCH"}]),
        );
        let episode = Episode::new(payload, registry()).expect("valid episode");
        assert!(episode.is_discharged());
    }

    #[test]
    fn discharged_by_past_discharge_date() {
        let mut payload = sample();
        payload.insert("discharge_date".into(), json!("10/11/2014"));
        let episode = Episode::new(payload, registry()).expect("valid episode");

        let before = NaiveDate::from_ymd_opt(2014, 11, 9)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let same_day = NaiveDate::from_ymd_opt(2014, 11, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        assert!(!episode.is_discharged_at(before));
        assert!(episode.is_discharged_at(same_day));
    }

    #[test]
    fn make_copy_captures_editable_scalars() {
        let episode = Episode::new(sample(), registry()).expect("valid episode");
        let copy = episode.make_copy();
        assert_eq!(copy.id, Some(12));
        assert_eq!(copy.category_name, Some(json!("inpatient")));
        assert_eq!(copy.date_of_admission, NaiveDate::from_ymd_opt(2014, 11, 3));
        assert_eq!(copy.consistency_token, Some(json!("a1b2c3d4")));
    }

    #[test]
    fn from_value_rejects_non_objects() {
        let err = Episode::from_value(json!([1, 2]), registry()).expect_err("arrays are not episodes");
        assert!(matches!(err, EpisodeError::InvalidInput(_)));
    }
}
