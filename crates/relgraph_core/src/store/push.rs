//! Canonical payload ingestion.
//!
//! # Responsibility
//! - Validate normalized payloads against the schema.
//! - Apply canonical attributes and relationships, propagating to inverses.
//!
//! # Invariants
//! - A whole payload (or document) is validated before anything is applied.
//! - Referenced records that are not in the identity map become `empty` stubs.
//! - A has-many `data` array is authoritative canonical membership.

use crate::model::key::RecordKey;
use crate::model::lifecycle::{LifecycleEvent, LifecycleState};
use crate::notify::ChangedProperty;
use crate::payload::{Document, EntityPayload, RelationshipData, ResourceIdentifier};
use crate::relationship::Relationship;
use crate::schema::definition::RelationshipKind;
use crate::schema::ResolvedRelationship;
use crate::store::propagation::StateLayer;
use crate::store::{Store, StoreError, StoreResult};
use log::{info, warn};

impl Store {
    /// Pushes one canonical record payload.
    ///
    /// # Errors
    /// - Schema violations (`UnknownModel`, `UnknownField`, `KindMismatch`,
    ///   `TypeMismatch`, `InvalidId`) and `RecordDeleted` for records whose
    ///   deletion was already committed.
    pub fn push(&mut self, entity: EntityPayload) -> StoreResult<RecordKey> {
        self.validate_entity(&entity)?;
        let key = entity.key();
        self.in_edit(|store| store.apply_entity(entity));
        Ok(key)
    }

    /// Pushes primary and included records as one batch.
    ///
    /// Returns the primary record keys in document order.
    pub fn push_document(&mut self, document: Document) -> StoreResult<Vec<RecordKey>> {
        let primary = document.primary_keys();
        let entities = document.into_entities();
        for entity in &entities {
            self.validate_entity(entity)?;
        }
        self.in_edit(|store| {
            for entity in entities {
                store.apply_entity(entity);
            }
        });
        Ok(primary)
    }

    pub(crate) fn validate_entity(&self, entity: &EntityPayload) -> StoreResult<()> {
        let model = self
            .schema
            .model(&entity.model)
            .ok_or_else(|| StoreError::UnknownModel(entity.model.clone()))?;
        let key = entity.key();
        self.ensure_pushable(&key)?;

        for name in entity.attributes.keys() {
            if !model.has_attribute(name) {
                return Err(StoreError::UnknownField {
                    model: entity.model.clone(),
                    field: name.clone(),
                });
            }
        }

        for (field, payload) in &entity.relationships {
            let def = self.relationship_def(&entity.model, field)?;
            match (&payload.data, def.kind) {
                (None, _) => {}
                (Some(RelationshipData::One(target)), RelationshipKind::BelongsTo) => {
                    if let Some(target) = target {
                        self.validate_identifier(&key, &def, target)?;
                    }
                }
                (Some(RelationshipData::Many(members)), RelationshipKind::HasMany) => {
                    for member in members {
                        self.validate_identifier(&key, &def, member)?;
                    }
                }
                (Some(_), kind) => {
                    return Err(StoreError::KindMismatch {
                        model: entity.model.clone(),
                        field: field.clone(),
                        expected: kind,
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_identifier(
        &self,
        owner: &RecordKey,
        def: &ResolvedRelationship,
        identifier: &ResourceIdentifier,
    ) -> StoreResult<()> {
        if identifier.model != def.target {
            return Err(StoreError::TypeMismatch {
                model: owner.model.clone(),
                field: def.name.clone(),
                expected: def.target.clone(),
                found: identifier.model.clone(),
            });
        }
        self.ensure_pushable(&identifier.to_key())
    }

    fn ensure_pushable(&self, key: &RecordKey) -> StoreResult<()> {
        if key.id.trim().is_empty() {
            return Err(StoreError::InvalidId(key.model.clone()));
        }
        match self.records.get(key) {
            Some(record) if record.state() == LifecycleState::DeletedSaved => {
                Err(StoreError::RecordDeleted(key.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Applies a validated payload. Must run inside an edit.
    pub(crate) fn apply_entity(&mut self, entity: EntityPayload) {
        let key = entity.key();
        self.records.get_or_insert(&key);

        for (name, value) in entity.attributes {
            let changed = self
                .records
                .get_mut(&key)
                .is_some_and(|record| record.set_canonical_attribute(&name, value));
            if changed {
                self.touch(&key, ChangedProperty::Attribute(name));
            }
        }

        self.recheck(&key);
        let relationship_count = entity.relationships.len();
        for (field, payload) in entity.relationships {
            let Some(def) = self.schema.relationship(&key.model, &field).cloned() else {
                continue;
            };
            if let Some(link) = payload.related_link() {
                self.set_link(&key, &def, link);
            }
            match payload.data {
                None => {}
                Some(RelationshipData::One(target)) => {
                    self.push_belongs_to(&key, &def, target.map(|target| target.to_key()));
                }
                Some(RelationshipData::Many(members)) => {
                    let members = members.iter().map(ResourceIdentifier::to_key).collect();
                    self.push_has_many(&key, &def, members);
                }
            }
        }

        if let Err(err) = self.transition(&key, LifecycleEvent::Pushed) {
            warn!("event=record_push module=store status=error key={key} error={err}");
        }
        info!(
            "event=record_push module=store status=ok key={key} relationships={relationship_count}"
        );
    }

    fn set_link(&mut self, owner: &RecordKey, def: &ResolvedRelationship, link: &str) {
        if let Some(record) = self.records.get_mut(owner) {
            let meta = record.relationship_or_insert(def).meta_mut();
            if meta.link.as_deref() != Some(link) {
                meta.link = Some(link.to_string());
                meta.has_loaded = false;
            }
        }
    }

    /// Replaces the canonical value of a belongs-to field.
    pub(crate) fn push_belongs_to(
        &mut self,
        owner: &RecordKey,
        def: &ResolvedRelationship,
        target: Option<RecordKey>,
    ) {
        match target {
            Some(target) => {
                self.records.get_or_insert(&target);
                self.link(StateLayer::Canonical, owner, &def.name, &target);
            }
            None => {
                let canonical = self.records.get_mut(owner).and_then(|record| {
                    let rel = record.relationship_or_insert(def);
                    rel.meta_mut().has_data = true;
                    rel.as_belongs_to().and_then(|rel| rel.canonical().cloned())
                });
                if let Some(canonical) = canonical {
                    self.unlink(StateLayer::Canonical, owner, &def.name, &canonical);
                }
            }
        }
    }

    /// Replaces canonical has-many membership and mirrors the diff on inverses.
    pub(crate) fn push_has_many(
        &mut self,
        owner: &RecordKey,
        def: &ResolvedRelationship,
        members: Vec<RecordKey>,
    ) {
        for member in &members {
            self.records.get_or_insert(member);
        }
        let Some(record) = self.records.get_mut(owner) else {
            return;
        };
        let rel = record.relationship_or_insert(def);
        rel.meta_mut().has_data = true;
        let Relationship::HasMany(has_many) = rel else {
            return;
        };
        let before = has_many.current();
        let diff = has_many.replace_canonical(members);
        let changed = before != has_many.current();
        self.recheck(owner);
        if changed {
            self.touch(owner, ChangedProperty::Relationship(def.name.clone()));
        }

        let Some(inverse) = def.inverse.as_deref() else {
            return;
        };
        for member in &diff.added {
            if let Some(previous_owner) =
                self.link_one_side(StateLayer::Canonical, member, inverse, owner)
            {
                self.unlink_one_side(StateLayer::Canonical, &previous_owner, &def.name, member);
            }
        }
        for member in &diff.removed {
            self.unlink_one_side(StateLayer::Canonical, member, inverse, owner);
        }
        let mut visited = Default::default();
        for member in &diff.reinstated {
            self.revert_inverse_edge(member, inverse, owner, &mut visited);
        }
    }
}
