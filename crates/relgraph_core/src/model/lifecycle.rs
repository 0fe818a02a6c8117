//! Record lifecycle state machine.
//!
//! # Responsibility
//! - Enumerate record lifecycle states and the events that move between them.
//! - Reject events that make no sense in the current state.
//!
//! # Invariants
//! - `deleted.saved` is terminal.
//! - `loaded.saved <-> loaded.updated` is driven only by dirtiness events.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Lifecycle state of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Referenced but no data known yet.
    Empty,
    /// A fetch for this record is in flight.
    Loading,
    /// Created locally, never confirmed by remote.
    LoadedCreated,
    /// Loaded and identical to canonical state.
    LoadedSaved,
    /// Loaded with uncommitted local edits.
    LoadedUpdated,
    /// Marked deleted locally, deletion not confirmed.
    DeletedUncommitted,
    /// Deletion confirmed (or new record discarded).
    DeletedSaved,
    /// Last save attempt failed.
    Error,
}

/// Event applied to the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    LoadStarted,
    LoadFailed,
    Pushed,
    Created,
    BecameDirty,
    BecameClean,
    Deleted,
    Committed,
    CommitFailed,
    RolledBack,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadStarted => "load_started",
            Self::LoadFailed => "load_failed",
            Self::Pushed => "pushed",
            Self::Created => "created",
            Self::BecameDirty => "became_dirty",
            Self::BecameClean => "became_clean",
            Self::Deleted => "deleted",
            Self::Committed => "committed",
            Self::CommitFailed => "commit_failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Lifecycle transition error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    InvalidTransition {
        from: LifecycleState,
        event: LifecycleEvent,
    },
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, event } => write!(
                f,
                "event `{}` is not valid in state `{}`",
                event.as_str(),
                from.as_str()
            ),
        }
    }
}

impl Error for LifecycleError {}

impl LifecycleState {
    /// Stable dotted name, e.g. `loaded.saved`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loading => "loading",
            Self::LoadedCreated => "loaded.created",
            Self::LoadedSaved => "loaded.saved",
            Self::LoadedUpdated => "loaded.updated",
            Self::DeletedUncommitted => "deleted.uncommitted",
            Self::DeletedSaved => "deleted.saved",
            Self::Error => "error",
        }
    }

    /// Applies one event and returns the next state.
    pub fn apply(self, event: LifecycleEvent) -> Result<Self, LifecycleError> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        let next = match (self, event) {
            (S::Empty, E::LoadStarted) | (S::Loading, E::LoadStarted) => S::Loading,
            (S::Empty, E::Created) => S::LoadedCreated,
            (S::Loading, E::LoadFailed) => S::Empty,
            (S::Empty | S::Loading, E::Pushed) => S::LoadedSaved,

            (S::LoadedCreated, E::BecameDirty | E::BecameClean) => S::LoadedCreated,
            (S::LoadedCreated, E::Pushed | E::Committed) => S::LoadedSaved,
            (S::LoadedCreated, E::Deleted | E::RolledBack) => S::DeletedSaved,

            (S::LoadedSaved | S::LoadedUpdated, E::BecameDirty) => S::LoadedUpdated,
            (S::LoadedSaved | S::LoadedUpdated, E::BecameClean) => S::LoadedSaved,
            (S::LoadedSaved, E::Pushed) => S::LoadedSaved,
            (S::LoadedUpdated, E::Pushed) => S::LoadedUpdated,
            (S::LoadedSaved | S::LoadedUpdated, E::Deleted) => S::DeletedUncommitted,
            (S::LoadedSaved | S::LoadedUpdated, E::Committed | E::RolledBack) => S::LoadedSaved,

            (S::DeletedUncommitted, E::Committed) => S::DeletedSaved,
            (S::DeletedUncommitted, E::RolledBack) => S::LoadedSaved,
            (
                S::DeletedUncommitted,
                E::Pushed | E::BecameDirty | E::BecameClean | E::Deleted,
            ) => S::DeletedUncommitted,

            (S::Error, E::RolledBack | E::Pushed | E::Committed) => S::LoadedSaved,
            (S::Error, E::BecameDirty | E::BecameClean) => S::Error,
            (S::Error, E::Deleted) => S::DeletedUncommitted,

            (S::LoadedCreated | S::LoadedSaved | S::LoadedUpdated, E::CommitFailed)
            | (S::DeletedUncommitted | S::Error, E::CommitFailed) => S::Error,

            (from, event) => return Err(LifecycleError::InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// Whether record data is available (`loaded.*`, `deleted.uncommitted`, `error`).
    pub fn is_loaded(self) -> bool {
        !matches!(self, Self::Empty | Self::Loading | Self::DeletedSaved)
    }

    pub fn is_empty(self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_new(self) -> bool {
        matches!(self, Self::LoadedCreated)
    }

    pub fn is_deleted(self) -> bool {
        matches!(self, Self::DeletedUncommitted | Self::DeletedSaved)
    }

    /// Whether local attribute/relationship edits may target this record.
    pub fn accepts_local_edits(self) -> bool {
        matches!(
            self,
            Self::LoadedCreated | Self::LoadedSaved | Self::LoadedUpdated | Self::Error
        )
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{LifecycleError, LifecycleEvent, LifecycleState};

    #[test]
    fn remote_load_path_reaches_loaded_saved() {
        let state = LifecycleState::Empty
            .apply(LifecycleEvent::LoadStarted)
            .and_then(|s| s.apply(LifecycleEvent::Pushed))
            .unwrap();
        assert_eq!(state, LifecycleState::LoadedSaved);
    }

    #[test]
    fn failed_load_returns_to_empty() {
        let state = LifecycleState::Loading
            .apply(LifecycleEvent::LoadFailed)
            .unwrap();
        assert_eq!(state, LifecycleState::Empty);
    }

    #[test]
    fn dirtiness_toggles_saved_and_updated() {
        let dirty = LifecycleState::LoadedSaved
            .apply(LifecycleEvent::BecameDirty)
            .unwrap();
        assert_eq!(dirty, LifecycleState::LoadedUpdated);
        let clean = dirty.apply(LifecycleEvent::BecameClean).unwrap();
        assert_eq!(clean, LifecycleState::LoadedSaved);
    }

    #[test]
    fn delete_then_commit_or_rollback() {
        let deleted = LifecycleState::LoadedUpdated
            .apply(LifecycleEvent::Deleted)
            .unwrap();
        assert_eq!(deleted, LifecycleState::DeletedUncommitted);
        assert_eq!(
            deleted.apply(LifecycleEvent::Committed).unwrap(),
            LifecycleState::DeletedSaved
        );
        assert_eq!(
            deleted.apply(LifecycleEvent::RolledBack).unwrap(),
            LifecycleState::LoadedSaved
        );
    }

    #[test]
    fn deleted_saved_is_terminal() {
        let err = LifecycleState::DeletedSaved
            .apply(LifecycleEvent::RolledBack)
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidTransition {
                from: LifecycleState::DeletedSaved,
                event: LifecycleEvent::RolledBack,
            }
        );
        assert!(err.to_string().contains("deleted.saved"));
    }

    #[test]
    fn empty_record_rejects_local_edits() {
        assert!(!LifecycleState::Empty.accepts_local_edits());
        assert!(!LifecycleState::DeletedUncommitted.accepts_local_edits());
        assert!(LifecycleState::Error.accepts_local_edits());
    }
}
