//! Relationship graph store.
//!
//! # Responsibility
//! - Own the identity map and route every record/relationship mutation.
//! - Wrap each public mutation in one edit: propagation, dirty/lifecycle
//!   reconciliation and notification flush complete before it returns.
//!
//! # Invariants
//! - Validation precedes mutation; a rejected call leaves the graph untouched.
//! - Records are only reachable through the identity map by `RecordKey`.
//! - The store is an explicit context object; nothing here is global.

pub mod error;
mod fetch;
mod identity_map;
mod many_array;
mod propagation;
mod push;
mod rollback;
mod save;

pub use error::{StoreError, StoreResult};
pub use many_array::ManyArray;

use crate::adapter::Adapter;
use crate::config::StoreConfig;
use crate::model::key::RecordKey;
use crate::model::lifecycle::{LifecycleEvent, LifecycleState};
use crate::model::record::Record;
use crate::notify::{ChangedProperty, Notification, NotificationBus, ObserverId};
use crate::relationship::resolution::FetchId;
use crate::schema::definition::{ModelDef, RelationshipKind};
use crate::schema::{ResolvedRelationship, Schema, SchemaResult};
use fetch::InFlightFetch;
use identity_map::IdentityMap;
use indexmap::IndexSet;
use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeMap;

/// In-memory relationship graph over normalized records.
pub struct Store {
    schema: Schema,
    records: IdentityMap,
    bus: NotificationBus,
    adapter: Option<Box<dyn Adapter>>,
    in_flight: Vec<InFlightFetch>,
    next_fetch_id: FetchId,
    touched: IndexSet<RecordKey>,
}

impl Store {
    /// Creates a store without an adapter; async fetches fail until one is set.
    pub fn new(schema: Schema) -> Self {
        info!(
            "event=store_init module=store status=ok models={}",
            schema.model_names().count()
        );
        Self {
            schema,
            records: IdentityMap::default(),
            bus: NotificationBus::default(),
            adapter: None,
            in_flight: Vec::new(),
            next_fetch_id: 0,
            touched: IndexSet::new(),
        }
    }

    pub fn with_adapter(schema: Schema, adapter: impl Adapter + 'static) -> Self {
        let mut store = Self::new(schema);
        store.set_adapter(adapter);
        store
    }

    /// Builds the schema with the config's async default and creates a store.
    pub fn from_config(
        config: &StoreConfig,
        defs: impl IntoIterator<Item = ModelDef>,
    ) -> SchemaResult<Self> {
        Ok(Self::new(Schema::build(defs, config.default_async)?))
    }

    pub fn set_adapter(&mut self, adapter: impl Adapter + 'static) {
        self.adapter = Some(Box::new(adapter));
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Registers an observer for coalesced change notifications.
    pub fn subscribe(&mut self, observer: impl FnMut(&Notification) + 'static) -> ObserverId {
        self.bus.subscribe(Box::new(observer))
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Returns the key of `(model, id)`, creating an `empty` record if absent.
    ///
    /// # Errors
    /// - `UnknownModel` / `InvalidId` for undeclared models or empty ids.
    pub fn record_for(&mut self, model: &str, id: &str) -> StoreResult<RecordKey> {
        let key = self.checked_key(model, id)?;
        self.records.get_or_insert(&key);
        Ok(key)
    }

    /// Looks up a record without creating it.
    pub fn peek_record(&self, key: &RecordKey) -> Option<&Record> {
        self.records.get(key)
    }

    /// Records of `model` in first-reference order.
    pub fn peek_all(&self, model: &str) -> Vec<&Record> {
        self.records.of_model(model).collect()
    }

    pub fn has_record(&self, key: &RecordKey) -> bool {
        self.records.contains(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.len() == 0
    }

    /// Creates a local record with a client-generated id.
    pub fn create_record(
        &mut self,
        model: &str,
        attributes: BTreeMap<String, Value>,
    ) -> StoreResult<RecordKey> {
        let key = RecordKey::generate(model);
        self.create_record_with_id(model, &key.id, attributes)
    }

    /// Creates a local record (`loaded.created`) under a caller-chosen id.
    ///
    /// # Errors
    /// - `InvalidTransition` when the id already names a non-empty record.
    /// - `UnknownField` for undeclared attributes.
    pub fn create_record_with_id(
        &mut self,
        model: &str,
        id: &str,
        attributes: BTreeMap<String, Value>,
    ) -> StoreResult<RecordKey> {
        let key = self.checked_key(model, id)?;
        for name in attributes.keys() {
            self.ensure_attribute(model, name)?;
        }
        if let Some(existing) = self.records.get(&key) {
            existing.state().apply(LifecycleEvent::Created)?;
        }

        self.in_edit(|store| {
            store.records.get_or_insert(&key);
            store.transition(&key, LifecycleEvent::Created)?;
            for (name, value) in attributes {
                store.write_local_attribute(&key, &name, value);
            }
            info!("event=record_created module=store status=ok key={key}");
            Ok(key.clone())
        })
    }

    pub fn state(&self, key: &RecordKey) -> StoreResult<LifecycleState> {
        Ok(self.record(key)?.state())
    }

    /// Record-level dirtiness: attributes, relationships, or unsaved create/delete.
    pub fn is_dirty(&self, key: &RecordKey) -> StoreResult<bool> {
        Ok(self.record(key)?.is_dirty())
    }

    pub fn attribute(&self, key: &RecordKey, name: &str) -> StoreResult<Option<Value>> {
        self.ensure_attribute(&key.model, name)?;
        Ok(self.record(key)?.attribute(name).cloned())
    }

    /// Sets a local attribute override.
    ///
    /// Setting the canonical value back clears the override (net zero).
    pub fn set_attribute(&mut self, key: &RecordKey, name: &str, value: Value) -> StoreResult<()> {
        self.ensure_attribute(&key.model, name)?;
        self.ensure_editable(key)?;
        self.in_edit(|store| {
            store.write_local_attribute(key, name, value);
            Ok(())
        })
    }

    /// Locally changed attributes as `name -> (canonical, local)`.
    pub fn changed_attributes(
        &self,
        key: &RecordKey,
    ) -> StoreResult<BTreeMap<String, (Option<Value>, Value)>> {
        Ok(self.record(key)?.changed_attributes())
    }

    /// Current value of a belongs-to field (no fetch).
    pub fn belongs_to(&self, owner: &RecordKey, field: &str) -> StoreResult<Option<RecordKey>> {
        self.relationship_def_of_kind(&owner.model, field, RelationshipKind::BelongsTo)?;
        Ok(self
            .record(owner)?
            .relationship(field)
            .and_then(|rel| rel.as_belongs_to())
            .and_then(|rel| rel.current().cloned()))
    }

    /// Current members of a has-many field (no fetch); deleted members are hidden.
    pub fn has_many(&self, owner: &RecordKey, field: &str) -> StoreResult<Vec<RecordKey>> {
        self.relationship_def_of_kind(&owner.model, field, RelationshipKind::HasMany)?;
        let members = self
            .record(owner)?
            .relationship(field)
            .and_then(|rel| rel.as_has_many())
            .map(|rel| rel.current())
            .unwrap_or_default();
        Ok(self.visible_members(members))
    }

    pub fn is_relationship_dirty(&self, owner: &RecordKey, field: &str) -> StoreResult<bool> {
        self.relationship_def(&owner.model, field)?;
        Ok(self
            .record(owner)?
            .relationship(field)
            .is_some_and(|rel| rel.is_dirty()))
    }

    /// Live collection view over a has-many field.
    pub fn many_array(&mut self, owner: &RecordKey, field: &str) -> StoreResult<ManyArray<'_>> {
        self.relationship_def_of_kind(&owner.model, field, RelationshipKind::HasMany)?;
        self.record(owner)?;
        Ok(ManyArray::new(self, owner.clone(), field.to_string()))
    }

    fn checked_key(&self, model: &str, id: &str) -> StoreResult<RecordKey> {
        if self.schema.model(model).is_none() {
            return Err(StoreError::UnknownModel(model.to_string()));
        }
        if id.trim().is_empty() {
            return Err(StoreError::InvalidId(model.to_string()));
        }
        Ok(RecordKey::new(model, id))
    }

    fn record(&self, key: &RecordKey) -> StoreResult<&Record> {
        self.records
            .get(key)
            .ok_or_else(|| StoreError::RecordNotFound(key.clone()))
    }

    fn ensure_attribute(&self, model: &str, name: &str) -> StoreResult<()> {
        let schema = self
            .schema
            .model(model)
            .ok_or_else(|| StoreError::UnknownModel(model.to_string()))?;
        if schema.has_attribute(name) {
            Ok(())
        } else {
            Err(StoreError::UnknownField {
                model: model.to_string(),
                field: name.to_string(),
            })
        }
    }

    pub(crate) fn relationship_def(
        &self,
        model: &str,
        field: &str,
    ) -> StoreResult<ResolvedRelationship> {
        let schema = self
            .schema
            .model(model)
            .ok_or_else(|| StoreError::UnknownModel(model.to_string()))?;
        schema
            .relationship(field)
            .cloned()
            .ok_or_else(|| StoreError::UnknownField {
                model: model.to_string(),
                field: field.to_string(),
            })
    }

    pub(crate) fn relationship_def_of_kind(
        &self,
        model: &str,
        field: &str,
        kind: RelationshipKind,
    ) -> StoreResult<ResolvedRelationship> {
        let def = self.relationship_def(model, field)?;
        if def.kind != kind {
            return Err(StoreError::KindMismatch {
                model: model.to_string(),
                field: field.to_string(),
                expected: kind,
            });
        }
        Ok(def)
    }

    /// Rejects local edits on records that are missing, unloaded or deleted.
    pub(crate) fn ensure_editable(&self, key: &RecordKey) -> StoreResult<()> {
        let state = self.record(key)?.state();
        if state.is_deleted() {
            return Err(StoreError::RecordDeleted(key.clone()));
        }
        if !state.accepts_local_edits() {
            return Err(StoreError::RecordNotLoaded {
                key: key.clone(),
                state,
            });
        }
        Ok(())
    }

    /// Checks that `member` may be linked through `def` by a local edit.
    pub(crate) fn ensure_member(
        &self,
        owner: &RecordKey,
        def: &ResolvedRelationship,
        member: &RecordKey,
    ) -> StoreResult<()> {
        if member.model != def.target {
            return Err(StoreError::TypeMismatch {
                model: owner.model.clone(),
                field: def.name.clone(),
                expected: def.target.clone(),
                found: member.model.clone(),
            });
        }
        if self.record(member)?.state().is_deleted() {
            return Err(StoreError::RecordDeleted(member.clone()));
        }
        Ok(())
    }

    /// Runs `edit` as one batch; the outermost edit reconciles dirtiness and
    /// flushes notifications before returning.
    pub(crate) fn in_edit<T>(&mut self, edit: impl FnOnce(&mut Self) -> T) -> T {
        self.bus.begin_batch();
        let result = edit(self);
        if self.bus.is_outermost() {
            self.reconcile_touched();
        }
        self.bus.end_batch();
        result
    }

    pub(crate) fn touch(&mut self, key: &RecordKey, property: ChangedProperty) {
        self.touched.insert(key.clone());
        self.bus.touch(key, property);
    }

    /// Queues a dirtiness recheck without notifying a property change.
    pub(crate) fn recheck(&mut self, key: &RecordKey) {
        self.touched.insert(key.clone());
    }

    /// Applies a lifecycle event to a record and notifies a state change.
    pub(crate) fn transition(&mut self, key: &RecordKey, event: LifecycleEvent) -> StoreResult<()> {
        let record = self
            .records
            .get_mut(key)
            .ok_or_else(|| StoreError::RecordNotFound(key.clone()))?;
        let from = record.state;
        let next = from.apply(event)?;
        record.state = next;
        if from != next {
            debug!(
                "event=state_transition module=store status=ok key={key} from={from} to={next}"
            );
            self.touch(key, ChangedProperty::State);
        }
        Ok(())
    }

    pub(crate) fn write_local_attribute(&mut self, key: &RecordKey, name: &str, value: Value) {
        let changed = self
            .records
            .get_mut(key)
            .is_some_and(|record| record.set_local_attribute(name, value));
        if changed {
            self.touch(key, ChangedProperty::Attribute(name.to_string()));
        }
    }

    /// Filters out members whose records are deleted.
    pub(crate) fn visible_members(&self, members: Vec<RecordKey>) -> Vec<RecordKey> {
        members
            .into_iter()
            .filter(|member| {
                self.records
                    .get(member)
                    .map_or(true, |record| !record.state().is_deleted())
            })
            .collect()
    }

    fn reconcile_touched(&mut self) {
        let touched: Vec<RecordKey> = self.touched.drain(..).collect();
        for key in touched {
            let Some(record) = self.records.get_mut(&key) else {
                continue;
            };
            let dirty = record.is_dirty();
            let event = match record.state {
                LifecycleState::LoadedSaved if dirty => Some(LifecycleEvent::BecameDirty),
                LifecycleState::LoadedUpdated if !dirty => Some(LifecycleEvent::BecameClean),
                _ => None,
            };
            let mut state_changed = false;
            if let Some(next) = event.and_then(|event| record.state.apply(event).ok()) {
                state_changed = next != record.state;
                record.state = next;
            }
            let dirty_changed = record.reported_dirty != dirty;
            record.reported_dirty = dirty;

            if state_changed {
                self.bus.touch(&key, ChangedProperty::State);
            }
            if dirty_changed {
                self.bus.touch(&key, ChangedProperty::IsDirty);
            }
        }
    }
}
