//! Core relationship graph engine for relgraph.
//! Normalized records, bidirectional relationships and local edit rollback
//! live here; transport and persistence stay with external collaborators.

pub mod adapter;
pub mod config;
pub mod logging;
pub mod model;
pub mod notify;
pub mod payload;
pub mod relationship;
pub mod schema;
pub mod store;

pub use adapter::{Adapter, AdapterError, AdapterResult, LinkPayload};
pub use config::{ConfigError, ConfigResult, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::key::RecordKey;
pub use model::lifecycle::{LifecycleError, LifecycleEvent, LifecycleState};
pub use model::record::Record;
pub use notify::{ChangedProperty, Notification, ObserverId};
pub use payload::{
    Document, EntityPayload, RelationshipData, RelationshipPayload, ResourceIdentifier,
};
pub use relationship::resolution::{FetchError, RelatedValue, RelationshipHandle};
pub use relationship::Relationship;
pub use schema::definition::{ModelDef, RelationshipDef, RelationshipKind};
pub use schema::{ResolvedRelationship, Schema, SchemaError, SchemaResult};
pub use store::{ManyArray, Store, StoreError, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
