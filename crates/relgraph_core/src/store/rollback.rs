//! Rollback, delete and unload coordination.
//!
//! # Responsibility
//! - Discard local overlays of a record and undo their inverse-side effects.
//! - Drive delete/unload and disconnect records from every inverse.
//!
//! # Invariants
//! - Canonical state is always the rollback target; no snapshot is kept.
//! - Rolling back one side of a pair restores the other side too.
//! - A record that was never saved is discarded rather than restored.

use crate::model::key::RecordKey;
use crate::model::lifecycle::{LifecycleEvent, LifecycleState};
use crate::notify::ChangedProperty;
use crate::relationship::Relationship;
use crate::store::{Store, StoreError, StoreResult};
use log::info;
use std::collections::HashSet;

pub(crate) type Visited = HashSet<(RecordKey, String)>;

impl Store {
    /// Discards local attribute and relationship edits (both sides) and undoes
    /// an uncommitted delete or a failed save.
    ///
    /// Rolling back a `loaded.created` record discards and unloads it.
    pub fn rollback(&mut self, key: &RecordKey) -> StoreResult<()> {
        let state = self.rollback_target_state(key)?;
        self.in_edit(|store| {
            if state == LifecycleState::LoadedCreated {
                return store.discard_new_record(key, LifecycleEvent::RolledBack);
            }
            store.rollback_local_attributes(key);
            let mut visited = Visited::new();
            let fields = store
                .records
                .get(key)
                .map(|record| record.relationship_fields())
                .unwrap_or_default();
            for field in fields {
                store.rollback_relationship(key, &field, &mut visited);
            }
            store.finish_rollback(key, state)?;
            info!("event=record_rollback module=store status=ok key={key} scope=all");
            Ok(())
        })
    }

    /// Discards local attribute edits and undoes an uncommitted delete or a
    /// failed save; local relationship edits are kept.
    pub fn rollback_attributes(&mut self, key: &RecordKey) -> StoreResult<()> {
        let state = self.rollback_target_state(key)?;
        self.in_edit(|store| {
            if state == LifecycleState::LoadedCreated {
                return store.discard_new_record(key, LifecycleEvent::RolledBack);
            }
            store.rollback_local_attributes(key);
            store.finish_rollback(key, state)?;
            info!("event=record_rollback module=store status=ok key={key} scope=attributes");
            Ok(())
        })
    }

    /// Marks a record deleted (`deleted.uncommitted`) and hides it from every
    /// has-many that contains it. A never-saved record is discarded.
    pub fn delete_record(&mut self, key: &RecordKey) -> StoreResult<()> {
        let state = self
            .peek_record(key)
            .ok_or_else(|| StoreError::RecordNotFound(key.clone()))?
            .state();
        match state {
            LifecycleState::DeletedUncommitted => return Ok(()),
            LifecycleState::DeletedSaved => return Err(StoreError::RecordDeleted(key.clone())),
            LifecycleState::Empty | LifecycleState::Loading => {
                return Err(StoreError::RecordNotLoaded {
                    key: key.clone(),
                    state,
                })
            }
            _ => {}
        }

        self.in_edit(|store| {
            if state == LifecycleState::LoadedCreated {
                return store.discard_new_record(key, LifecycleEvent::Deleted);
            }
            store.transition(key, LifecycleEvent::Deleted)?;
            store.touch_inverse_sides(key);
            info!("event=record_delete module=store status=ok key={key}");
            Ok(())
        })
    }

    /// Disconnects a record from every inverse and removes it from the
    /// identity map. Pending fetches on its relationships are cancelled.
    pub fn unload_record(&mut self, key: &RecordKey) -> StoreResult<()> {
        if !self.has_record(key) {
            return Err(StoreError::RecordNotFound(key.clone()));
        }
        self.in_edit(|store| {
            store.disconnect(key);
            store.records.remove(key);
            info!("event=record_unload module=store status=ok key={key}");
            Ok(())
        })
    }

    fn rollback_target_state(&self, key: &RecordKey) -> StoreResult<LifecycleState> {
        let state = self
            .peek_record(key)
            .ok_or_else(|| StoreError::RecordNotFound(key.clone()))?
            .state();
        match state {
            LifecycleState::Empty | LifecycleState::Loading => Err(StoreError::RecordNotLoaded {
                key: key.clone(),
                state,
            }),
            LifecycleState::DeletedSaved => Err(StoreError::RecordDeleted(key.clone())),
            _ => Ok(state),
        }
    }

    fn rollback_local_attributes(&mut self, key: &RecordKey) {
        let names = self
            .records
            .get_mut(key)
            .map(|record| record.rollback_attributes())
            .unwrap_or_default();
        for name in names {
            self.touch(key, ChangedProperty::Attribute(name));
        }
    }

    fn finish_rollback(&mut self, key: &RecordKey, state: LifecycleState) -> StoreResult<()> {
        if let Some(record) = self.records.get_mut(key) {
            record.last_error = None;
        }
        match state {
            LifecycleState::DeletedUncommitted => {
                self.transition(key, LifecycleEvent::RolledBack)?;
                self.touch_inverse_sides(key);
            }
            LifecycleState::Error => self.transition(key, LifecycleEvent::RolledBack)?,
            _ => {}
        }
        Ok(())
    }

    /// Discards the local delta of one relationship and undoes its inverse edges.
    pub(crate) fn rollback_relationship(
        &mut self,
        owner: &RecordKey,
        field: &str,
        visited: &mut Visited,
    ) {
        if !visited.insert((owner.clone(), field.to_string())) {
            return;
        }
        let inverse = self
            .schema
            .inverse_of(&owner.model, field)
            .map(str::to_string);
        let Some(rel) = self
            .records
            .get_mut(owner)
            .and_then(|record| record.relationship_mut(field))
        else {
            return;
        };

        let affected: Vec<RecordKey> = match rel {
            Relationship::BelongsTo(belongs_to) => {
                let canonical = belongs_to.canonical().cloned();
                match belongs_to.discard_local() {
                    Some(local) => local.into_iter().chain(canonical).collect(),
                    None => return,
                }
            }
            Relationship::HasMany(has_many) => {
                let (additions, removals) = has_many.discard_local();
                if additions.is_empty() && removals.is_empty() {
                    return;
                }
                additions.into_iter().chain(removals).collect()
            }
        };
        self.touch(owner, ChangedProperty::Relationship(field.to_string()));

        let Some(inverse) = inverse else {
            return;
        };
        for member in affected {
            self.revert_inverse_edge(&member, &inverse, owner, visited);
        }
    }

    /// Undoes the inverse-side effect of a local edit between `member` and `owner`.
    pub(crate) fn revert_inverse_edge(
        &mut self,
        member: &RecordKey,
        inverse: &str,
        owner: &RecordKey,
        visited: &mut Visited,
    ) {
        let Some(rel) = self
            .records
            .get_mut(member)
            .and_then(|record| record.relationship_mut(inverse))
        else {
            return;
        };
        match rel {
            Relationship::HasMany(has_many) => {
                let reverted_addition = has_many.revert_addition(owner);
                let reverted_removal = has_many.revert_removal(owner);
                if reverted_addition || reverted_removal {
                    self.touch(member, ChangedProperty::Relationship(inverse.to_string()));
                }
            }
            Relationship::BelongsTo(belongs_to) => {
                let involved = belongs_to.is_dirty()
                    && (belongs_to.current() == Some(owner)
                        || belongs_to.canonical() == Some(owner));
                if involved {
                    self.rollback_relationship(member, inverse, visited);
                }
            }
        }
    }

    /// Undoes a never-saved record's edits, disconnects and unloads it.
    fn discard_new_record(&mut self, key: &RecordKey, event: LifecycleEvent) -> StoreResult<()> {
        let mut visited = Visited::new();
        let fields = self
            .records
            .get(key)
            .map(|record| record.relationship_fields())
            .unwrap_or_default();
        for field in fields {
            self.rollback_relationship(key, &field, &mut visited);
        }
        self.disconnect(key);
        self.transition(key, event)?;
        self.records.remove(key);
        info!("event=record_discard module=store status=ok key={key}");
        Ok(())
    }

    /// Removes every reference to `key` held by other records.
    pub(crate) fn disconnect(&mut self, key: &RecordKey) {
        let mut edges: Vec<(RecordKey, String)> = Vec::new();
        if let Some(record) = self.records.get(key) {
            for (field, rel) in record.relationships() {
                let Some(inverse) = self.schema.inverse_of(&key.model, field) else {
                    continue;
                };
                for member in rel.referenced() {
                    edges.push((member, inverse.to_string()));
                }
            }
        }
        for (model, field) in self.schema.inverse_less_fields_targeting(&key.model) {
            for holder in self.records.keys_of_model(&model) {
                edges.push((holder, field.clone()));
            }
        }

        for (holder, field) in edges {
            let forgot = self
                .records
                .get_mut(&holder)
                .and_then(|record| record.relationship_mut(&field))
                .is_some_and(|rel| rel.forget(key));
            if forgot {
                self.touch(&holder, ChangedProperty::Relationship(field));
            }
        }
    }

    /// Notifies inverse has-many fields whose visible members include `key`.
    pub(crate) fn touch_inverse_sides(&mut self, key: &RecordKey) {
        let mut edges: Vec<(RecordKey, String)> = Vec::new();
        if let Some(record) = self.records.get(key) {
            for (field, rel) in record.relationships() {
                let Some(inverse) = self.schema.inverse_of(&key.model, field) else {
                    continue;
                };
                for member in rel.referenced() {
                    edges.push((member, inverse.to_string()));
                }
            }
        }
        for (holder, field) in edges {
            let holds = self
                .records
                .get(&holder)
                .and_then(|record| record.relationship(&field))
                .is_some_and(|rel| rel.references(key));
            if holds {
                self.touch(&holder, ChangedProperty::Relationship(field));
            }
        }
    }
}
