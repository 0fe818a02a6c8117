//! Store usage errors.

use crate::model::key::RecordKey;
use crate::model::lifecycle::{LifecycleError, LifecycleState};
use crate::relationship::resolution::FetchError;
use crate::schema::definition::RelationshipKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported to store callers.
///
/// Every variant is raised before the graph is mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    UnknownModel(String),
    /// Attribute or relationship not declared on the model.
    UnknownField { model: String, field: String },
    /// Relationship accessed through the wrong variant.
    KindMismatch {
        model: String,
        field: String,
        expected: RelationshipKind,
    },
    /// Member record has a different model than the relationship target.
    TypeMismatch {
        model: String,
        field: String,
        expected: String,
        found: String,
    },
    RecordNotFound(RecordKey),
    /// Record has no data yet (or cannot take local edits in its state).
    RecordNotLoaded {
        key: RecordKey,
        state: LifecycleState,
    },
    RecordDeleted(RecordKey),
    InvalidPayload(String),
    InvalidTransition(LifecycleError),
    /// Save response names a different record than the one saved.
    ResponseMismatch {
        expected: RecordKey,
        found: RecordKey,
    },
    /// Empty record id for the given model.
    InvalidId(String),
    Fetch(FetchError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownModel(model) => write!(f, "unknown model: `{model}`"),
            Self::UnknownField { model, field } => {
                write!(f, "model `{model}` has no field `{field}`")
            }
            Self::KindMismatch {
                model,
                field,
                expected,
            } => write!(f, "`{model}.{field}` is not a {} relationship", expected.as_str()),
            Self::TypeMismatch {
                model,
                field,
                expected,
                found,
            } => write!(
                f,
                "`{model}.{field}` expects `{expected}` records, got `{found}`"
            ),
            Self::RecordNotFound(key) => write!(f, "record not found: {key}"),
            Self::RecordNotLoaded { key, state } => {
                write!(f, "record {key} is not loaded (state `{state}`)")
            }
            Self::RecordDeleted(key) => write!(f, "record {key} is deleted"),
            Self::InvalidPayload(message) => write!(f, "invalid payload: {message}"),
            Self::InvalidTransition(err) => write!(f, "{err}"),
            Self::ResponseMismatch { expected, found } => {
                write!(f, "save response for {found} does not match saved record {expected}")
            }
            Self::InvalidId(model) => write!(f, "empty record id for model `{model}`"),
            Self::Fetch(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidTransition(err) => Some(err),
            Self::Fetch(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LifecycleError> for StoreError {
    fn from(value: LifecycleError) -> Self {
        Self::InvalidTransition(value)
    }
}

impl From<FetchError> for StoreError {
    fn from(value: FetchError) -> Self {
        Self::Fetch(value)
    }
}
