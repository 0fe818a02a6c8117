//! Record identity keys.
//!
//! # Responsibility
//! - Define the only cross-record reference type used by the graph.
//!
//! # Invariants
//! - A `RecordKey` is plain data; holding one never keeps a record alive.
//! - Two keys are equal iff model name and id are equal.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Model (type) name, e.g. `user`.
pub type ModelName = String;

/// Record id within one model namespace.
pub type RecordId = String;

/// Identity of one record: `(model, id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Serialized as `type` to match normalized payload naming.
    #[serde(rename = "type")]
    pub model: ModelName,
    pub id: RecordId,
}

impl RecordKey {
    pub fn new(model: impl Into<ModelName>, id: impl Into<RecordId>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }

    /// Creates a key with a client-generated UUID v4 id.
    ///
    /// Used by local record creation where the remote id is not known yet.
    pub fn generate(model: impl Into<ModelName>) -> Self {
        Self::new(model, Uuid::new_v4().to_string())
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.model, self.id)
    }
}
