//! Record: attribute overlay, lifecycle state and owned relationships.
//!
//! # Responsibility
//! - Keep canonical attributes and local overrides apart.
//! - Own the relationship objects of one record, created on first access.
//!
//! # Invariants
//! - A local attribute equal to its canonical value is never stored.
//! - Rollback always targets the latest canonical values.

use crate::model::key::RecordKey;
use crate::model::lifecycle::LifecycleState;
use crate::relationship::Relationship;
use crate::schema::ResolvedRelationship;
use serde_json::Value;
use std::collections::BTreeMap;

/// One entity instance held by the identity map.
#[derive(Debug)]
pub struct Record {
    key: RecordKey,
    pub(crate) state: LifecycleState,
    pub(crate) saving: bool,
    pub(crate) last_error: Option<String>,
    canonical_attributes: BTreeMap<String, Value>,
    local_attributes: BTreeMap<String, Value>,
    relationships: BTreeMap<String, Relationship>,
    /// Record-level dirty flag last reported to observers.
    pub(crate) reported_dirty: bool,
}

impl Record {
    pub(crate) fn new(key: RecordKey) -> Self {
        Self {
            key,
            state: LifecycleState::Empty,
            saving: false,
            last_error: None,
            canonical_attributes: BTreeMap::new(),
            local_attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
            reported_dirty: false,
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Whether a save is in flight.
    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Reason recorded by the last failed save.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Effective attribute value (local override, then canonical).
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.local_attributes
            .get(name)
            .or_else(|| self.canonical_attributes.get(name))
    }

    pub fn canonical_attribute(&self, name: &str) -> Option<&Value> {
        self.canonical_attributes.get(name)
    }

    /// Effective attribute map.
    pub fn attributes(&self) -> BTreeMap<String, Value> {
        let mut merged = self.canonical_attributes.clone();
        merged.extend(
            self.local_attributes
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        merged
    }

    /// Locally changed attributes as `name -> (canonical, local)`.
    pub fn changed_attributes(&self) -> BTreeMap<String, (Option<Value>, Value)> {
        self.local_attributes
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    (self.canonical_attributes.get(name).cloned(), value.clone()),
                )
            })
            .collect()
    }

    pub fn has_dirty_attributes(&self) -> bool {
        !self.local_attributes.is_empty()
    }

    /// Relationship object for `field`, if it was ever accessed.
    pub fn relationship(&self, field: &str) -> Option<&Relationship> {
        self.relationships.get(field)
    }

    pub fn relationships(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.relationships
            .iter()
            .map(|(field, rel)| (field.as_str(), rel))
    }

    pub fn has_dirty_relationships(&self) -> bool {
        self.relationships.values().any(Relationship::is_dirty)
    }

    /// Aggregated dirtiness: attributes, relationships, or an unsaved
    /// create/delete.
    pub fn is_dirty(&self) -> bool {
        self.has_dirty_attributes()
            || self.has_dirty_relationships()
            || matches!(
                self.state,
                LifecycleState::LoadedCreated | LifecycleState::DeletedUncommitted
            )
    }

    pub(crate) fn relationship_mut(&mut self, field: &str) -> Option<&mut Relationship> {
        self.relationships.get_mut(field)
    }

    /// Relationship object for `def`, created on first access.
    pub(crate) fn relationship_or_insert(&mut self, def: &ResolvedRelationship) -> &mut Relationship {
        self.relationships
            .entry(def.name.clone())
            .or_insert_with(|| Relationship::new(def.kind, def.is_async))
    }

    /// Drops every relationship object; pending fetch waiters are cancelled.
    pub(crate) fn clear_relationships(&mut self) -> Vec<String> {
        std::mem::take(&mut self.relationships).into_keys().collect()
    }

    pub(crate) fn relationship_fields(&self) -> Vec<String> {
        self.relationships.keys().cloned().collect()
    }

    /// Sets a local override. Returns whether the effective value changed.
    pub(crate) fn set_local_attribute(&mut self, name: &str, value: Value) -> bool {
        let changed = self.attribute(name) != Some(&value);
        if self.canonical_attributes.get(name) == Some(&value) {
            self.local_attributes.remove(name);
        } else {
            self.local_attributes.insert(name.to_string(), value);
        }
        changed
    }

    /// Sets a canonical value, dropping an override that now matches it.
    /// Returns whether the effective value changed.
    pub(crate) fn set_canonical_attribute(&mut self, name: &str, value: Value) -> bool {
        let before = self.attribute(name).cloned();
        if self.local_attributes.get(name) == Some(&value) {
            self.local_attributes.remove(name);
        }
        self.canonical_attributes.insert(name.to_string(), value);
        before.as_ref() != self.attribute(name)
    }

    /// Discards local overrides and returns the affected attribute names.
    pub(crate) fn rollback_attributes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.local_attributes)
            .into_keys()
            .collect()
    }

    /// Promotes local overrides into canonical state.
    pub(crate) fn commit_attributes(&mut self) -> Vec<String> {
        let committed = std::mem::take(&mut self.local_attributes);
        let names = committed.keys().cloned().collect();
        self.canonical_attributes.extend(committed);
        names
    }
}
