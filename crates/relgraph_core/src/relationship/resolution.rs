//! Per-relationship async resolution cell and caller handles.
//!
//! # Responsibility
//! - Track whether one relationship has a fetch in flight and who waits on it.
//! - Hand callers a future that resolves when the shared fetch completes.
//!
//! # Invariants
//! - At most one fetch per relationship instance is in flight; later readers
//!   attach to the existing waiter list.
//! - A fetch result only applies to the cell that issued that fetch id.
//! - Dropping the cell (relationship/record unloaded) cancels all waiters.

use crate::model::key::RecordKey;
use futures::channel::oneshot;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Errors delivered to callers awaiting an async relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Adapter rejected the fetch.
    Adapter(String),
    /// Adapter resolved with data the graph refused.
    InvalidPayload(String),
    /// Relationship or record was unloaded before the fetch completed.
    Cancelled,
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adapter(message) => write!(f, "relationship fetch failed: {message}"),
            Self::InvalidPayload(message) => {
                write!(f, "relationship fetch returned invalid data: {message}")
            }
            Self::Cancelled => write!(f, "relationship fetch was cancelled"),
        }
    }
}

impl Error for FetchError {}

/// Resolved value of one relationship read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelatedValue {
    One(Option<RecordKey>),
    Many(Vec<RecordKey>),
}

pub(crate) type FetchOutcome = Result<RelatedValue, FetchError>;

/// Identifies one adapter fetch issued by the store.
pub(crate) type FetchId = u64;

/// Async resolution state of one relationship.
#[derive(Debug, Default)]
pub(crate) enum FetchCell {
    #[default]
    Idle,
    Pending {
        id: FetchId,
        waiters: Vec<oneshot::Sender<FetchOutcome>>,
    },
}

impl FetchCell {
    pub(crate) fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Whether this cell is waiting on fetch `id`.
    pub(crate) fn awaits(&self, id: FetchId) -> bool {
        matches!(self, Self::Pending { id: pending, .. } if *pending == id)
    }

    /// Marks fetch `id` as in flight with its first waiter.
    pub(crate) fn begin(&mut self, id: FetchId, waiter: oneshot::Sender<FetchOutcome>) {
        *self = Self::Pending {
            id,
            waiters: vec![waiter],
        };
    }

    /// Attaches a waiter to the pending fetch; returns `false` when idle.
    pub(crate) fn join(&mut self, waiter: oneshot::Sender<FetchOutcome>) -> bool {
        match self {
            Self::Pending { waiters, .. } => {
                waiters.push(waiter);
                true
            }
            Self::Idle => false,
        }
    }

    /// Resets to idle and returns waiters to notify.
    pub(crate) fn take_waiters(&mut self) -> Vec<oneshot::Sender<FetchOutcome>> {
        match std::mem::take(self) {
            Self::Pending { waiters, .. } => waiters,
            Self::Idle => Vec::new(),
        }
    }
}

/// Conversion from a resolved relationship value into the caller's shape.
pub trait FromRelated: Sized {
    fn from_related(value: RelatedValue) -> Result<Self, FetchError>;
}

impl FromRelated for Option<RecordKey> {
    fn from_related(value: RelatedValue) -> Result<Self, FetchError> {
        match value {
            RelatedValue::One(value) => Ok(value),
            RelatedValue::Many(_) => Err(FetchError::InvalidPayload(
                "expected a single related record".to_string(),
            )),
        }
    }
}

impl FromRelated for Vec<RecordKey> {
    fn from_related(value: RelatedValue) -> Result<Self, FetchError> {
        match value {
            RelatedValue::Many(values) => Ok(values),
            RelatedValue::One(_) => Err(FetchError::InvalidPayload(
                "expected a related record collection".to_string(),
            )),
        }
    }
}

/// Future-like handle returned by async relationship reads.
///
/// A pending handle only completes after the owning store settles its
/// in-flight fetches (`Store::settle`).
#[derive(Debug)]
pub struct RelationshipHandle<T> {
    state: HandleState<T>,
}

#[derive(Debug)]
enum HandleState<T> {
    Ready(Option<T>),
    Waiting(oneshot::Receiver<FetchOutcome>),
}

impl<T> RelationshipHandle<T> {
    pub(crate) fn ready(value: T) -> Self {
        Self {
            state: HandleState::Ready(Some(value)),
        }
    }

    pub(crate) fn waiting(receiver: oneshot::Receiver<FetchOutcome>) -> Self {
        Self {
            state: HandleState::Waiting(receiver),
        }
    }

    /// Whether the value depends on an in-flight fetch.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, HandleState::Waiting(_))
    }
}

impl<T: FromRelated + Unpin> Future for RelationshipHandle<T> {
    type Output = Result<T, FetchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            HandleState::Ready(value) => Poll::Ready(value.take().ok_or(FetchError::Cancelled)),
            HandleState::Waiting(receiver) => match Pin::new(receiver).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome.and_then(T::from_related)),
                Poll::Ready(Err(_)) => Poll::Ready(Err(FetchError::Cancelled)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchCell, FetchError, RelatedValue, RelationshipHandle};
    use crate::model::key::RecordKey;
    use futures::channel::oneshot;
    use futures::executor::block_on;

    #[test]
    fn second_waiter_joins_pending_cell() {
        let mut cell = FetchCell::default();
        let (first, _first_rx) = oneshot::channel();
        let (second, _second_rx) = oneshot::channel();
        let (idle, _idle_rx) = oneshot::channel();
        assert!(!cell.join(idle));
        cell.begin(7, first);
        assert!(cell.join(second));
        assert!(cell.is_pending());
        assert!(cell.awaits(7));
        assert!(!cell.awaits(8));
        assert_eq!(cell.take_waiters().len(), 2);
        assert!(!cell.is_pending());
        assert!(!cell.awaits(7));
    }

    #[test]
    fn waiting_handle_resolves_from_shared_outcome() {
        let mut cell = FetchCell::default();
        let (tx, rx) = oneshot::channel();
        cell.begin(1, tx);
        let handle: RelationshipHandle<Vec<RecordKey>> = RelationshipHandle::waiting(rx);
        assert!(handle.is_pending());

        for waiter in cell.take_waiters() {
            let _ = waiter.send(Ok(RelatedValue::Many(vec![RecordKey::new("user", "1")])));
        }
        assert_eq!(block_on(handle).unwrap(), vec![RecordKey::new("user", "1")]);
    }

    #[test]
    fn dropped_cell_cancels_waiters() {
        let mut cell = FetchCell::default();
        let (tx, rx) = oneshot::channel();
        cell.begin(1, tx);
        let handle: RelationshipHandle<Option<RecordKey>> = RelationshipHandle::waiting(rx);
        drop(cell);
        assert_eq!(block_on(handle).unwrap_err(), FetchError::Cancelled);
    }
}
