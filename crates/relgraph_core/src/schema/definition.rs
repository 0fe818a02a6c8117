//! Declarative model and relationship definitions.
//!
//! # Responsibility
//! - Describe models (attributes + relationship fields) before validation.
//! - Decode the same shape from JSON configuration.
//!
//! # Invariants
//! - Definitions are inert data; `Schema::build` is the only validator.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Relationship cardinality on the declaring side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Single optional reference.
    BelongsTo,
    /// Ordered set of references.
    HasMany,
}

impl RelationshipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BelongsTo => "belongs_to",
            Self::HasMany => "has_many",
        }
    }
}

/// Inverse declaration of one relationship field.
///
/// JSON form: key absent -> `Infer`, `null` -> `NoInverse`, string -> `Named`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InverseDecl {
    /// Look for a unique matching field on the target model.
    #[default]
    Infer,
    /// Explicit inverse field name on the target model.
    Named(String),
    /// Explicitly inverse-less; propagation is a no-op.
    NoInverse,
}

/// One relationship field declaration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelationshipDef {
    pub kind: RelationshipKind,
    /// Target model name.
    pub target: String,
    #[serde(default, deserialize_with = "deserialize_inverse")]
    pub inverse: InverseDecl,
    /// `None` falls back to the schema-wide default.
    #[serde(default, rename = "async")]
    pub is_async: Option<bool>,
}

impl RelationshipDef {
    pub fn belongs_to(target: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::BelongsTo,
            target: target.into(),
            inverse: InverseDecl::Infer,
            is_async: None,
        }
    }

    pub fn has_many(target: impl Into<String>) -> Self {
        Self {
            kind: RelationshipKind::HasMany,
            target: target.into(),
            inverse: InverseDecl::Infer,
            is_async: None,
        }
    }

    pub fn inverse(mut self, field: impl Into<String>) -> Self {
        self.inverse = InverseDecl::Named(field.into());
        self
    }

    pub fn no_inverse(mut self) -> Self {
        self.inverse = InverseDecl::NoInverse;
        self
    }

    pub fn asynchronous(mut self, is_async: bool) -> Self {
        self.is_async = Some(is_async);
        self
    }
}

/// Model declaration: attribute names plus relationship fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelDef {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipDef>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    pub fn relationship(mut self, field: impl Into<String>, def: RelationshipDef) -> Self {
        self.relationships.insert(field.into(), def);
        self
    }
}

fn deserialize_inverse<'de, D>(deserializer: D) -> Result<InverseDecl, D::Error>
where
    D: Deserializer<'de>,
{
    // Only called when the key is present; absence is handled by `default`.
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(match value {
        Some(name) => InverseDecl::Named(name),
        None => InverseDecl::NoInverse,
    })
}

#[cfg(test)]
mod tests {
    use super::{InverseDecl, ModelDef, RelationshipKind};

    #[test]
    fn inverse_key_is_tri_state() {
        let model: ModelDef = serde_json::from_value(serde_json::json!({
            "name": "user",
            "attributes": ["name"],
            "relationships": {
                "topics": { "kind": "has_many", "target": "topic" },
                "accounts": { "kind": "has_many", "target": "account", "inverse": "owner" },
                "friends": { "kind": "has_many", "target": "user", "inverse": null, "async": false }
            }
        }))
        .unwrap();

        assert_eq!(model.relationships["topics"].inverse, InverseDecl::Infer);
        assert_eq!(
            model.relationships["accounts"].inverse,
            InverseDecl::Named("owner".to_string())
        );
        assert_eq!(model.relationships["friends"].inverse, InverseDecl::NoInverse);
        assert_eq!(model.relationships["friends"].is_async, Some(false));
        assert_eq!(model.relationships["topics"].kind, RelationshipKind::HasMany);
        assert_eq!(model.relationships["topics"].is_async, None);
    }
}
