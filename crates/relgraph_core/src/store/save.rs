//! Save confirmation from the external persistence collaborator.
//!
//! # Responsibility
//! - Track in-flight saves and promote committed local state to canonical.
//!
//! # Invariants
//! - After a successful save the record has no local overlay; later
//!   rollbacks return to the committed values.
//! - A committed delete disconnects the record from every inverse.

use crate::model::key::RecordKey;
use crate::model::lifecycle::{LifecycleEvent, LifecycleState};
use crate::notify::ChangedProperty;
use crate::payload::EntityPayload;
use crate::relationship::Relationship;
use crate::store::propagation::StateLayer;
use crate::store::{Store, StoreError, StoreResult};
use log::{info, warn};

/// Local relationship delta captured before it is committed.
enum PendingCommit {
    One {
        local: Option<RecordKey>,
        canonical: Option<RecordKey>,
    },
    Many {
        additions: Vec<RecordKey>,
        removals: Vec<RecordKey>,
    },
}

impl Store {
    /// Marks a record as being saved.
    pub fn will_save(&mut self, key: &RecordKey) -> StoreResult<()> {
        let state = self.savable_state(key)?;
        self.in_edit(|store| {
            if let Some(record) = store.records.get_mut(key) {
                record.saving = true;
            }
            store.touch(key, ChangedProperty::State);
            info!("event=record_save module=store status=start key={key} state={state}");
        });
        Ok(())
    }

    /// Confirms a save: local state becomes canonical, then `response` (if
    /// any) is applied as a canonical push.
    ///
    /// # Errors
    /// - `ResponseMismatch` when `response` names another record.
    /// - Payload validation errors for `response`.
    pub fn did_save(&mut self, key: &RecordKey, response: Option<EntityPayload>) -> StoreResult<()> {
        let state = self.savable_state(key)?;
        if let Some(response) = &response {
            let found = response.key();
            if &found != key {
                return Err(StoreError::ResponseMismatch {
                    expected: key.clone(),
                    found,
                });
            }
            self.validate_entity(response)?;
        }

        self.in_edit(|store| {
            if state == LifecycleState::DeletedUncommitted {
                store.disconnect(key);
                let fields = store
                    .records
                    .get_mut(key)
                    .map(|record| record.clear_relationships())
                    .unwrap_or_default();
                for field in fields {
                    store.touch(key, ChangedProperty::Relationship(field));
                }
            } else {
                store.commit_record(key);
                if let Some(response) = response {
                    store.apply_entity(response);
                }
            }
            store.transition(key, LifecycleEvent::Committed)?;
            store.recheck(key);
            if let Some(record) = store.records.get_mut(key) {
                record.saving = false;
                record.last_error = None;
            }
            info!("event=record_save module=store status=ok key={key}");
            Ok(())
        })
    }

    /// Records a failed save; local edits are kept and the record enters `error`.
    pub fn did_fail_save(&mut self, key: &RecordKey, reason: impl Into<String>) -> StoreResult<()> {
        self.savable_state(key)?;
        let reason = reason.into();
        self.in_edit(|store| {
            store.transition(key, LifecycleEvent::CommitFailed)?;
            if let Some(record) = store.records.get_mut(key) {
                record.saving = false;
                record.last_error = Some(reason);
            }
            warn!("event=record_save module=store status=error key={key}");
            Ok(())
        })
    }

    fn savable_state(&self, key: &RecordKey) -> StoreResult<LifecycleState> {
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

    /// Promotes attribute overrides and relationship deltas to canonical
    /// state on both sides of every edited relationship.
    fn commit_record(&mut self, key: &RecordKey) {
        let mut pending: Vec<(String, PendingCommit)> = Vec::new();
        if let Some(record) = self.records.get_mut(key) {
            record.commit_attributes();
            for (field, rel) in record.relationships() {
                if !rel.is_dirty() {
                    continue;
                }
                let commit = match rel {
                    Relationship::BelongsTo(belongs_to) => PendingCommit::One {
                        local: belongs_to.current().cloned(),
                        canonical: belongs_to.canonical().cloned(),
                    },
                    Relationship::HasMany(has_many) => PendingCommit::Many {
                        additions: has_many.local_additions().cloned().collect(),
                        removals: has_many.local_removals().cloned().collect(),
                    },
                };
                pending.push((field.to_string(), commit));
            }
        }

        for (field, commit) in pending {
            match commit {
                PendingCommit::One { local, canonical } => match (local, canonical) {
                    (Some(local), _) => self.link(StateLayer::Canonical, key, &field, &local),
                    (None, Some(canonical)) => {
                        self.unlink(StateLayer::Canonical, key, &field, &canonical)
                    }
                    (None, None) => {}
                },
                PendingCommit::Many {
                    additions,
                    removals,
                } => {
                    for member in &removals {
                        self.unlink(StateLayer::Canonical, key, &field, member);
                    }
                    for member in &additions {
                        self.link(StateLayer::Canonical, key, &field, member);
                    }
                }
            }
        }
    }
}
