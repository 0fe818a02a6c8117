//! Inverse propagation across both sides of a relationship.
//!
//! # Responsibility
//! - Apply a link/unlink to one relationship and mirror it on the inverse.
//! - Enforce the single-value side eagerly: linking a member whose inverse
//!   belongs-to points elsewhere first detaches it from the old owner.
//!
//! # Invariants
//! - Propagation is one level deep on each side; it writes the other side's
//!   state directly and never re-enters the public edit API.
//! - The canonical layer only touches canonical state and the local layer
//!   only touches local overlays.

use crate::model::key::RecordKey;
use crate::notify::ChangedProperty;
use crate::relationship::Relationship;
use crate::schema::definition::RelationshipKind;
use crate::store::{Store, StoreResult};
use log::debug;

/// Which state layer a link/unlink writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StateLayer {
    Canonical,
    Local,
}

impl Store {
    /// Sets a belongs-to field locally and propagates to old and new inverses.
    ///
    /// # Errors
    /// - `KindMismatch`, `TypeMismatch`, `RecordNotFound`, `RecordNotLoaded`,
    ///   `RecordDeleted` for invalid usage.
    pub fn set_belongs_to(
        &mut self,
        owner: &RecordKey,
        field: &str,
        value: Option<RecordKey>,
    ) -> StoreResult<()> {
        let def = self.relationship_def_of_kind(&owner.model, field, RelationshipKind::BelongsTo)?;
        self.ensure_editable(owner)?;
        if let Some(member) = &value {
            self.ensure_member(owner, &def, member)?;
        }

        self.in_edit(|store| {
            match &value {
                Some(member) => store.link(StateLayer::Local, owner, field, member),
                None => {
                    let current = store.belongs_to(owner, field)?;
                    if let Some(current) = current {
                        store.unlink(StateLayer::Local, owner, field, &current);
                    }
                }
            }
            debug!(
                "event=belongs_to_set module=store status=ok key={owner} field={field} value={}",
                value
                    .as_ref()
                    .map_or_else(|| "null".to_string(), RecordKey::to_string)
            );
            Ok(())
        })
    }

    /// Adds `member` to a has-many field locally and propagates to its inverse.
    pub fn add_to_has_many(
        &mut self,
        owner: &RecordKey,
        field: &str,
        member: &RecordKey,
    ) -> StoreResult<()> {
        self.add_all_to_has_many(owner, field, std::slice::from_ref(member))
    }

    /// Removes `member` from a has-many field locally and propagates.
    pub fn remove_from_has_many(
        &mut self,
        owner: &RecordKey,
        field: &str,
        member: &RecordKey,
    ) -> StoreResult<()> {
        self.remove_all_from_has_many(owner, field, std::slice::from_ref(member))
    }

    /// Adds several members in one edit; nothing is applied if any is invalid.
    pub(crate) fn add_all_to_has_many(
        &mut self,
        owner: &RecordKey,
        field: &str,
        members: &[RecordKey],
    ) -> StoreResult<()> {
        self.check_has_many_edit(owner, field, members)?;
        self.in_edit(|store| {
            for member in members {
                store.link(StateLayer::Local, owner, field, member);
            }
            debug!(
                "event=has_many_add module=store status=ok key={owner} field={field} members={}",
                members.len()
            );
            Ok(())
        })
    }

    pub(crate) fn remove_all_from_has_many(
        &mut self,
        owner: &RecordKey,
        field: &str,
        members: &[RecordKey],
    ) -> StoreResult<()> {
        self.check_has_many_edit(owner, field, members)?;
        self.in_edit(|store| {
            for member in members {
                store.unlink(StateLayer::Local, owner, field, member);
            }
            debug!(
                "event=has_many_remove module=store status=ok key={owner} field={field} members={}",
                members.len()
            );
            Ok(())
        })
    }

    fn check_has_many_edit(
        &self,
        owner: &RecordKey,
        field: &str,
        members: &[RecordKey],
    ) -> StoreResult<()> {
        let def = self.relationship_def_of_kind(&owner.model, field, RelationshipKind::HasMany)?;
        self.ensure_editable(owner)?;
        for member in members {
            self.ensure_member(owner, &def, member)?;
        }
        Ok(())
    }

    /// Links `owner.field -> member` and mirrors it on the inverse side.
    pub(crate) fn link(
        &mut self,
        layer: StateLayer,
        owner: &RecordKey,
        field: &str,
        member: &RecordKey,
    ) {
        let displaced = self.link_one_side(layer, owner, field, member);
        let Some(inverse) = self.schema.inverse_of(&owner.model, field).map(str::to_string) else {
            return;
        };
        if let Some(displaced) = displaced {
            self.unlink_one_side(layer, &displaced, &inverse, owner);
        }
        if let Some(previous_owner) = self.link_one_side(layer, member, &inverse, owner) {
            self.unlink_one_side(layer, &previous_owner, field, member);
        }
    }

    /// Unlinks `owner.field -> member` on both sides.
    pub(crate) fn unlink(
        &mut self,
        layer: StateLayer,
        owner: &RecordKey,
        field: &str,
        member: &RecordKey,
    ) {
        self.unlink_one_side(layer, owner, field, member);
        if let Some(inverse) = self.schema.inverse_of(&owner.model, field).map(str::to_string) {
            self.unlink_one_side(layer, member, &inverse, owner);
        }
    }

    /// Adds `member` on one side. Returns the target a belongs-to displaced.
    pub(crate) fn link_one_side(
        &mut self,
        layer: StateLayer,
        owner: &RecordKey,
        field: &str,
        member: &RecordKey,
    ) -> Option<RecordKey> {
        let def = self.schema.relationship(&owner.model, field)?.clone();
        let record = self.records.get_mut(owner)?;
        let rel = record.relationship_or_insert(&def);
        let (changed, displaced) = match rel {
            Relationship::BelongsTo(belongs_to) => {
                let previous = match layer {
                    StateLayer::Local => belongs_to.current().cloned(),
                    StateLayer::Canonical => belongs_to.canonical().cloned(),
                };
                let changed = match layer {
                    StateLayer::Local => belongs_to.set_local(Some(member.clone())),
                    StateLayer::Canonical => belongs_to.set_canonical(Some(member.clone())),
                };
                (changed, previous.filter(|previous| previous != member))
            }
            Relationship::HasMany(has_many) => {
                let changed = match layer {
                    StateLayer::Local => has_many.add_local(member.clone()),
                    StateLayer::Canonical => has_many.add_canonical(member.clone()),
                };
                (changed, None)
            }
        };
        if layer == StateLayer::Canonical {
            rel.meta_mut().has_data = true;
        }
        self.recheck(owner);
        if changed {
            self.touch(owner, ChangedProperty::Relationship(field.to_string()));
        }
        displaced
    }

    /// Removes `member` on one side. Returns whether current state changed.
    pub(crate) fn unlink_one_side(
        &mut self,
        layer: StateLayer,
        owner: &RecordKey,
        field: &str,
        member: &RecordKey,
    ) -> bool {
        let Some(def) = self.schema.relationship(&owner.model, field).cloned() else {
            return false;
        };
        let Some(record) = self.records.get_mut(owner) else {
            return false;
        };
        let rel = record.relationship_or_insert(&def);
        let changed = match rel {
            Relationship::BelongsTo(belongs_to) => match layer {
                StateLayer::Local if belongs_to.current() == Some(member) => {
                    belongs_to.set_local(None)
                }
                StateLayer::Canonical if belongs_to.canonical() == Some(member) => {
                    belongs_to.set_canonical(None)
                }
                _ => false,
            },
            Relationship::HasMany(has_many) => match layer {
                StateLayer::Local => has_many.remove_local(member),
                StateLayer::Canonical => has_many.remove_canonical(member),
            },
        };
        if layer == StateLayer::Canonical {
            rel.meta_mut().has_data = true;
        }
        self.recheck(owner);
        if changed {
            self.touch(owner, ChangedProperty::Relationship(field.to_string()));
        }
        changed
    }
}
