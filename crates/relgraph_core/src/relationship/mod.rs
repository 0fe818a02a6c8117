//! Relationship state objects.
//!
//! # Responsibility
//! - Track canonical membership and local overlays for one relationship
//!   field of one record.
//! - Hold per-relationship fetch metadata (link, loaded flag, fetch cell).
//!
//! # Invariants
//! - Relationships only store `RecordKey`s; they never own other records.
//! - Primitives here touch one side only. Keeping both sides consistent is
//!   the store's propagation job.

pub mod belongs_to;
pub mod has_many;
pub mod resolution;

use crate::model::key::RecordKey;
use crate::schema::definition::RelationshipKind;
use belongs_to::BelongsTo;
use has_many::HasMany;
use resolution::FetchCell;

/// Metadata shared by both relationship variants.
#[derive(Debug, Default)]
pub struct RelationshipMeta {
    pub(crate) link: Option<String>,
    pub(crate) has_loaded: bool,
    pub(crate) has_data: bool,
    pub(crate) is_async: bool,
    pub(crate) fetch: FetchCell,
}

impl RelationshipMeta {
    pub(crate) fn new(is_async: bool) -> Self {
        Self {
            is_async,
            ..Self::default()
        }
    }

    /// Remote locator for lazily fetching this relationship.
    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    /// Whether an async fetch has completed for this relationship.
    pub fn has_loaded(&self) -> bool {
        self.has_loaded
    }

    /// Whether canonical data has ever been received.
    pub fn has_data(&self) -> bool {
        self.has_data
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn is_fetch_pending(&self) -> bool {
        self.fetch.is_pending()
    }
}

/// One relationship field of one record.
#[derive(Debug)]
pub enum Relationship {
    BelongsTo(BelongsTo),
    HasMany(HasMany),
}

impl Relationship {
    pub(crate) fn new(kind: RelationshipKind, is_async: bool) -> Self {
        let meta = RelationshipMeta::new(is_async);
        match kind {
            RelationshipKind::BelongsTo => Self::BelongsTo(BelongsTo::new(meta)),
            RelationshipKind::HasMany => Self::HasMany(HasMany::new(meta)),
        }
    }

    pub fn kind(&self) -> RelationshipKind {
        match self {
            Self::BelongsTo(_) => RelationshipKind::BelongsTo,
            Self::HasMany(_) => RelationshipKind::HasMany,
        }
    }

    pub fn meta(&self) -> &RelationshipMeta {
        match self {
            Self::BelongsTo(rel) => &rel.meta,
            Self::HasMany(rel) => &rel.meta,
        }
    }

    pub(crate) fn meta_mut(&mut self) -> &mut RelationshipMeta {
        match self {
            Self::BelongsTo(rel) => &mut rel.meta,
            Self::HasMany(rel) => &mut rel.meta,
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            Self::BelongsTo(rel) => rel.is_dirty(),
            Self::HasMany(rel) => rel.is_dirty(),
        }
    }

    pub fn as_belongs_to(&self) -> Option<&BelongsTo> {
        match self {
            Self::BelongsTo(rel) => Some(rel),
            Self::HasMany(_) => None,
        }
    }

    pub fn as_has_many(&self) -> Option<&HasMany> {
        match self {
            Self::HasMany(rel) => Some(rel),
            Self::BelongsTo(_) => None,
        }
    }

    pub(crate) fn as_belongs_to_mut(&mut self) -> Option<&mut BelongsTo> {
        match self {
            Self::BelongsTo(rel) => Some(rel),
            Self::HasMany(_) => None,
        }
    }

    pub(crate) fn as_has_many_mut(&mut self) -> Option<&mut HasMany> {
        match self {
            Self::HasMany(rel) => Some(rel),
            Self::BelongsTo(_) => None,
        }
    }

    /// Removes `member` from canonical and local state on this side only.
    pub(crate) fn forget(&mut self, member: &RecordKey) -> bool {
        match self {
            Self::BelongsTo(rel) => rel.forget(member),
            Self::HasMany(rel) => rel.forget(member),
        }
    }

    pub(crate) fn references(&self, member: &RecordKey) -> bool {
        match self {
            Self::BelongsTo(rel) => rel.references(member),
            Self::HasMany(rel) => rel.references(member),
        }
    }

    /// Every key referenced by canonical or local state.
    pub(crate) fn referenced(&self) -> Vec<RecordKey> {
        match self {
            Self::BelongsTo(rel) => rel.referenced(),
            Self::HasMany(rel) => rel.referenced(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Relationship;
    use crate::model::key::RecordKey;
    use crate::schema::definition::RelationshipKind;

    #[test]
    fn variants_share_meta_and_dirtiness() {
        let mut rel = Relationship::new(RelationshipKind::HasMany, true);
        assert!(rel.meta().is_async());
        assert!(!rel.meta().has_loaded());
        rel.as_has_many_mut()
            .expect("has-many variant")
            .add_local(RecordKey::new("topic", "1"));
        assert!(rel.is_dirty());
        assert!(rel.references(&RecordKey::new("topic", "1")));
        assert!(rel.forget(&RecordKey::new("topic", "1")));
        assert!(!rel.is_dirty());
        assert!(rel.as_belongs_to().is_none());
    }
}
