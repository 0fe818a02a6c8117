//! Inverse field resolution.
//!
//! # Responsibility
//! - Decide, once at schema build time, which field on the target model is
//!   the reciprocal of each relationship field.
//!
//! # Invariants
//! - Resolution order: explicit `inverse` option, then an explicit
//!   back-reference declared on the target, then the unique inferable field.
//! - Ambiguity is a configuration error, never an edit-time error.
//! - An explicitly inverse-less field always resolves to `None`.

use crate::schema::definition::{InverseDecl, ModelDef, RelationshipDef};
use crate::schema::{SchemaError, SchemaResult};
use std::collections::BTreeMap;

/// Resolves the inverse field of `model.field`.
///
/// Returns `Ok(None)` when the field is inverse-less (declared or because
/// no candidate exists on the target model).
pub(crate) fn resolve_inverse(
    models: &BTreeMap<String, ModelDef>,
    model: &str,
    field: &str,
    def: &RelationshipDef,
) -> SchemaResult<Option<String>> {
    let target = models
        .get(def.target.as_str())
        .ok_or_else(|| SchemaError::UnknownTarget {
            model: model.to_string(),
            field: field.to_string(),
            target: def.target.clone(),
        })?;

    match &def.inverse {
        InverseDecl::NoInverse => Ok(None),
        InverseDecl::Named(name) => {
            let candidate =
                target
                    .relationships
                    .get(name.as_str())
                    .ok_or_else(|| SchemaError::UnknownInverse {
                        model: model.to_string(),
                        field: field.to_string(),
                        inverse: name.clone(),
                    })?;
            let points_back = candidate.target == model
                && match &candidate.inverse {
                    InverseDecl::Infer => true,
                    InverseDecl::Named(back) => back == field,
                    InverseDecl::NoInverse => false,
                };
            if !points_back {
                return Err(SchemaError::InverseMismatch {
                    model: model.to_string(),
                    field: field.to_string(),
                    inverse: name.clone(),
                });
            }
            Ok(Some(name.clone()))
        }
        InverseDecl::Infer => {
            let explicit_back_refs: Vec<String> = target
                .relationships
                .iter()
                .filter(|(_, candidate)| {
                    candidate.target == model
                        && matches!(&candidate.inverse, InverseDecl::Named(back) if back == field)
                })
                .map(|(name, _)| name.clone())
                .collect();
            if let Some(found) = pick_unique(model, field, explicit_back_refs)? {
                return Ok(Some(found));
            }

            let inferable: Vec<String> = target
                .relationships
                .iter()
                .filter(|(name, candidate)| {
                    candidate.target == model
                        && candidate.inverse == InverseDecl::Infer
                        && !(def.target == model && name.as_str() == field)
                })
                .map(|(name, _)| name.clone())
                .collect();
            pick_unique(model, field, inferable)
        }
    }
}

fn pick_unique(
    model: &str,
    field: &str,
    mut candidates: Vec<String>,
) -> SchemaResult<Option<String>> {
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(candidates.pop()),
        _ => Err(SchemaError::AmbiguousInverse {
            model: model.to_string(),
            field: field.to_string(),
            candidates,
        }),
    }
}
