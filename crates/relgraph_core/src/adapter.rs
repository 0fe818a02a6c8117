//! Adapter collaborator contract for async relationship data.
//!
//! # Responsibility
//! - Describe how the store asks a remote source for relationship data.
//!
//! # Invariants
//! - Adapter futures are `'static`: they capture owned inputs only and never
//!   borrow the store.
//! - The store calls the adapter at most once per relationship until that
//!   fetch settles.

use crate::model::key::RecordKey;
use crate::payload::EntityPayload;
use futures::future::LocalBoxFuture;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Opaque failure reported by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterError {
    message: String,
}

impl AdapterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for AdapterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "adapter error: {}", self.message)
    }
}

impl Error for AdapterError {}

/// Result of a link fetch: one record (or none) or a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkPayload {
    One(Option<EntityPayload>),
    Many(Vec<EntityPayload>),
}

/// Remote source of relationship data.
pub trait Adapter {
    /// Fetches the related record of the belongs-to `owner.field`.
    fn fetch_related_record(
        &self,
        owner: &RecordKey,
        field: &str,
    ) -> LocalBoxFuture<'static, AdapterResult<Option<EntityPayload>>>;

    /// Fetches the related records of the has-many `owner.field`.
    fn fetch_related_records(
        &self,
        owner: &RecordKey,
        field: &str,
    ) -> LocalBoxFuture<'static, AdapterResult<Vec<EntityPayload>>>;

    /// Fetches relationship data from a remote locator.
    fn fetch_by_link(&self, link: &str) -> LocalBoxFuture<'static, AdapterResult<LinkPayload>>;
}
