//! Normalized canonical payloads.
//!
//! # Responsibility
//! - Decode the normalized `{ type, id, attributes, relationships }` shape
//!   produced by the serializer collaborator.
//! - Offer builders so callers and tests can assemble payloads in code.
//!
//! # Invariants
//! - A relationship's `data` key is tri-state: absent means "no change",
//!   `null` clears a belongs-to, any other value replaces canonical state.
//! - Ids are always carried as strings; JSON integers are stringified.

use crate::model::key::RecordKey;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// `{ type, id }` reference to one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub model: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
}

impl ResourceIdentifier {
    pub fn to_key(&self) -> RecordKey {
        RecordKey::new(self.model.clone(), self.id.clone())
    }
}

impl From<RecordKey> for ResourceIdentifier {
    fn from(value: RecordKey) -> Self {
        Self {
            model: value.model,
            id: value.id,
        }
    }
}

/// Canonical relationship value carried by a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipData {
    One(Option<ResourceIdentifier>),
    Many(Vec<ResourceIdentifier>),
}

/// Remote locators for one relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RelationshipLinks {
    #[serde(default)]
    pub related: Option<String>,
}

/// One relationship entry of an entity payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RelationshipPayload {
    #[serde(default, deserialize_with = "deserialize_data")]
    pub data: Option<RelationshipData>,
    #[serde(default)]
    pub links: Option<RelationshipLinks>,
}

impl RelationshipPayload {
    pub fn related_link(&self) -> Option<&str> {
        self.links.as_ref()?.related.as_deref()
    }
}

/// Canonical data for one record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityPayload {
    #[serde(rename = "type")]
    pub model: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipPayload>,
}

impl EntityPayload {
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// Decodes a payload from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.model.clone(), self.id.clone())
    }

    pub fn attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn belongs_to(mut self, field: impl Into<String>, target: Option<RecordKey>) -> Self {
        self.relationships
            .entry(field.into())
            .or_default()
            .data = Some(RelationshipData::One(target.map(ResourceIdentifier::from)));
        self
    }

    pub fn has_many(mut self, field: impl Into<String>, members: Vec<RecordKey>) -> Self {
        self.relationships
            .entry(field.into())
            .or_default()
            .data = Some(RelationshipData::Many(
            members.into_iter().map(ResourceIdentifier::from).collect(),
        ));
        self
    }

    pub fn link(mut self, field: impl Into<String>, related: impl Into<String>) -> Self {
        self.relationships.entry(field.into()).or_default().links = Some(RelationshipLinks {
            related: Some(related.into()),
        });
        self
    }
}

/// Primary data of a document: one record or a list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DocumentData {
    Many(Vec<EntityPayload>),
    One(EntityPayload),
}

/// Primary data plus side-loaded records, pushed as one batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub data: Option<DocumentData>,
    #[serde(default)]
    pub included: Vec<EntityPayload>,
}

impl Document {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Keys of the primary records, in document order.
    pub fn primary_keys(&self) -> Vec<RecordKey> {
        match &self.data {
            Some(DocumentData::One(entity)) => vec![entity.key()],
            Some(DocumentData::Many(entities)) => entities.iter().map(EntityPayload::key).collect(),
            None => Vec::new(),
        }
    }

    /// Primary records followed by included records.
    pub fn into_entities(self) -> Vec<EntityPayload> {
        let mut entities = match self.data {
            Some(DocumentData::One(entity)) => vec![entity],
            Some(DocumentData::Many(entities)) => entities,
            None => Vec::new(),
        };
        entities.extend(self.included);
        entities
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(D::Error::custom(format!(
            "record id must be a string or integer, got `{other}`"
        ))),
    }
}

fn deserialize_data<'de, D>(deserializer: D) -> Result<Option<RelationshipData>, D::Error>
where
    D: Deserializer<'de>,
{
    // Only called when `data` is present; absence is handled by `default`.
    let data = match Value::deserialize(deserializer)? {
        Value::Null => RelationshipData::One(None),
        value @ Value::Array(_) => {
            RelationshipData::Many(serde_json::from_value(value).map_err(D::Error::custom)?)
        }
        value => RelationshipData::One(Some(
            serde_json::from_value(value).map_err(D::Error::custom)?,
        )),
    };
    Ok(Some(data))
}
