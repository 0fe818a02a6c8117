//! Validated model schema.
//!
//! # Responsibility
//! - Turn `ModelDef` declarations into a validated, inverse-resolved schema.
//! - Answer relationship/attribute lookups for the store at edit time.
//!
//! # Invariants
//! - Every configuration error surfaces from `Schema::build`, never later.
//! - Inverse resolution is symmetric: `A.f -> B.g` implies `B.g -> A.f`.
//! - Relationship capabilities are attached per model at build time; records
//!   never gain fields at runtime.

pub mod definition;
mod inverse;

use crate::model::key::RecordKey;
use definition::{ModelDef, RelationshipKind};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

static MODEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").expect("valid model name regex"));
static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid field name regex"));

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Configuration errors detected while building a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidModelName(String),
    InvalidFieldName {
        model: String,
        field: String,
    },
    DuplicateModel(String),
    DuplicateField {
        model: String,
        field: String,
    },
    UnknownTarget {
        model: String,
        field: String,
        target: String,
    },
    UnknownInverse {
        model: String,
        field: String,
        inverse: String,
    },
    /// Declared/inferred inverse does not point back at the declaring field.
    InverseMismatch {
        model: String,
        field: String,
        inverse: String,
    },
    AmbiguousInverse {
        model: String,
        field: String,
        candidates: Vec<String>,
    },
    /// Schema document could not be decoded.
    InvalidDocument(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidModelName(name) => write!(f, "invalid model name: `{name}`"),
            Self::InvalidFieldName { model, field } => {
                write!(f, "invalid field name `{field}` on model `{model}`")
            }
            Self::DuplicateModel(name) => write!(f, "model declared twice: `{name}`"),
            Self::DuplicateField { model, field } => {
                write!(f, "field `{field}` declared twice on model `{model}`")
            }
            Self::UnknownTarget {
                model,
                field,
                target,
            } => write!(f, "`{model}.{field}` targets unknown model `{target}`"),
            Self::UnknownInverse {
                model,
                field,
                inverse,
            } => write!(f, "`{model}.{field}` names unknown inverse `{inverse}`"),
            Self::InverseMismatch {
                model,
                field,
                inverse,
            } => write!(
                f,
                "inverse `{inverse}` of `{model}.{field}` does not point back to it"
            ),
            Self::AmbiguousInverse {
                model,
                field,
                candidates,
            } => write!(
                f,
                "`{model}.{field}` has ambiguous inverse candidates [{}]; declare `inverse` explicitly",
                candidates.join(", ")
            ),
            Self::InvalidDocument(message) => write!(f, "invalid schema document: {message}"),
        }
    }
}

impl Error for SchemaError {}

/// Relationship field after inverse resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelationship {
    pub name: String,
    pub kind: RelationshipKind,
    pub target: String,
    /// Inverse field on `target`; `None` means propagation is a no-op.
    pub inverse: Option<String>,
    pub is_async: bool,
}

/// Validated model: declared attributes and resolved relationships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    name: String,
    attributes: BTreeSet<String>,
    relationships: BTreeMap<String, ResolvedRelationship>,
}

impl ModelSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(String::as_str)
    }

    pub fn relationship(&self, field: &str) -> Option<&ResolvedRelationship> {
        self.relationships.get(field)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &ResolvedRelationship> {
        self.relationships.values()
    }
}

/// Validated, inverse-resolved schema shared by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    models: BTreeMap<String, ModelSchema>,
}

impl Schema {
    /// Validates declarations and resolves every relationship's inverse.
    ///
    /// `default_async` applies to relationship declarations that do not set
    /// `async` explicitly.
    ///
    /// # Errors
    /// - Any `SchemaError` variant; the schema is unusable on error.
    pub fn build(
        defs: impl IntoIterator<Item = ModelDef>,
        default_async: bool,
    ) -> SchemaResult<Self> {
        let mut declared = BTreeMap::<String, ModelDef>::new();
        for def in defs {
            validate_model(&def)?;
            if declared.contains_key(def.name.as_str()) {
                return Err(SchemaError::DuplicateModel(def.name));
            }
            declared.insert(def.name.clone(), def);
        }

        let mut models = BTreeMap::new();
        for (name, def) in &declared {
            let mut relationships = BTreeMap::new();
            for (field, rel) in &def.relationships {
                let inverse = inverse::resolve_inverse(&declared, name, field, rel)?;
                relationships.insert(
                    field.clone(),
                    ResolvedRelationship {
                        name: field.clone(),
                        kind: rel.kind,
                        target: rel.target.clone(),
                        inverse,
                        is_async: rel.is_async.unwrap_or(default_async),
                    },
                );
            }
            models.insert(
                name.clone(),
                ModelSchema {
                    name: name.clone(),
                    attributes: def.attributes.iter().cloned().collect(),
                    relationships,
                },
            );
        }

        let schema = Self { models };
        schema.check_symmetry()?;
        info!(
            "event=schema_build module=schema status=ok models={}",
            schema.models.len()
        );
        Ok(schema)
    }

    /// Decodes a JSON array of model declarations and builds the schema.
    pub fn from_json_str(json: &str, default_async: bool) -> SchemaResult<Self> {
        let defs: Vec<ModelDef> = serde_json::from_str(json)
            .map_err(|err| SchemaError::InvalidDocument(err.to_string()))?;
        Self::build(defs, default_async)
    }

    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn relationship(&self, model: &str, field: &str) -> Option<&ResolvedRelationship> {
        self.models.get(model)?.relationship(field)
    }

    /// Inverse field of `model.field`, if any.
    pub fn inverse_of(&self, model: &str, field: &str) -> Option<&str> {
        self.relationship(model, field)?.inverse.as_deref()
    }

    /// Inverse field for a relationship field of a concrete record.
    pub fn inverse_field_for(&self, record: &RecordKey, field: &str) -> Option<&str> {
        self.inverse_of(&record.model, field)
    }

    /// `(model, field)` pairs of inverse-less relationships targeting `target`.
    pub(crate) fn inverse_less_fields_targeting(&self, target: &str) -> Vec<(String, String)> {
        self.models
            .values()
            .flat_map(|model| {
                model
                    .relationships
                    .values()
                    .filter(|rel| rel.target == target && rel.inverse.is_none())
                    .map(|rel| (model.name.clone(), rel.name.clone()))
            })
            .collect()
    }

    fn check_symmetry(&self) -> SchemaResult<()> {
        for model in self.models.values() {
            for rel in model.relationships.values() {
                let Some(inverse) = rel.inverse.as_deref() else {
                    continue;
                };
                let back = self.inverse_of(&rel.target, inverse);
                if back != Some(rel.name.as_str()) {
                    return Err(SchemaError::InverseMismatch {
                        model: model.name.clone(),
                        field: rel.name.clone(),
                        inverse: inverse.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn validate_model(def: &ModelDef) -> SchemaResult<()> {
    if !MODEL_NAME_RE.is_match(def.name.as_str()) {
        return Err(SchemaError::InvalidModelName(def.name.clone()));
    }

    let mut fields = BTreeSet::new();
    let names = def
        .attributes
        .iter()
        .chain(def.relationships.keys())
        .map(String::as_str);
    for field in names {
        if !FIELD_NAME_RE.is_match(field) {
            return Err(SchemaError::InvalidFieldName {
                model: def.name.clone(),
                field: field.to_string(),
            });
        }
        if !fields.insert(field) {
            return Err(SchemaError::DuplicateField {
                model: def.name.clone(),
                field: field.to_string(),
            });
        }
    }
    Ok(())
}
