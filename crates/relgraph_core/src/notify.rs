//! Change notification bus.
//!
//! # Responsibility
//! - Collect per-record property invalidations raised during an edit.
//! - Deliver them to observers once the outermost edit completes.
//!
//! # Invariants
//! - Within one batch each `(key, property)` pair is delivered at most once,
//!   in first-touch order.
//! - Observers never run while a batch is open, so they only see settled
//!   graph state.

use crate::model::key::RecordKey;
use indexmap::IndexSet;
use log::debug;
use std::fmt::{Debug, Formatter};

/// Invalidated computed property of one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangedProperty {
    Attribute(String),
    Relationship(String),
    IsDirty,
    State,
}

/// One coalesced change notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Notification {
    pub key: RecordKey,
    pub property: ChangedProperty,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub type Observer = Box<dyn FnMut(&Notification)>;

#[derive(Default)]
pub(crate) struct NotificationBus {
    observers: Vec<(ObserverId, Observer)>,
    next_id: u64,
    depth: usize,
    pending: IndexSet<Notification>,
}

impl Debug for NotificationBus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("observers", &self.observers.len())
            .field("depth", &self.depth)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl NotificationBus {
    pub(crate) fn subscribe(&mut self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        before != self.observers.len()
    }

    pub(crate) fn begin_batch(&mut self) {
        self.depth += 1;
    }

    /// Closes one batch level; the outermost close flushes.
    pub(crate) fn end_batch(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.flush();
        }
    }

    pub(crate) fn is_outermost(&self) -> bool {
        self.depth == 1
    }

    pub(crate) fn touch(&mut self, key: &RecordKey, property: ChangedProperty) {
        self.pending.insert(Notification {
            key: key.clone(),
            property,
        });
        if self.depth == 0 {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch: Vec<Notification> = self.pending.drain(..).collect();
        debug!(
            "event=notify_flush module=notify status=ok notifications={} observers={}",
            batch.len(),
            self.observers.len()
        );
        for notification in &batch {
            for (_, observer) in self.observers.iter_mut() {
                observer(notification);
            }
        }
    }
}
