//! Collection view over one has-many field.

use crate::model::key::RecordKey;
use crate::store::{Store, StoreResult};

/// Live view of `owner.field`; reads always reflect the current graph and
/// mutations go through the store's propagation.
pub struct ManyArray<'a> {
    store: &'a mut Store,
    owner: RecordKey,
    field: String,
}

impl<'a> ManyArray<'a> {
    pub(crate) fn new(store: &'a mut Store, owner: RecordKey, field: String) -> Self {
        Self {
            store,
            owner,
            field,
        }
    }

    pub fn owner(&self) -> &RecordKey {
        &self.owner
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Visible members in order.
    pub fn to_array(&self) -> Vec<RecordKey> {
        self.store
            .has_many(&self.owner, &self.field)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.to_array().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn object_at(&self, index: usize) -> Option<RecordKey> {
        self.to_array().into_iter().nth(index)
    }

    pub fn contains(&self, member: &RecordKey) -> bool {
        self.to_array().contains(member)
    }

    pub fn is_dirty(&self) -> bool {
        self.store
            .is_relationship_dirty(&self.owner, &self.field)
            .unwrap_or(false)
    }

    pub fn push_object(&mut self, member: &RecordKey) -> StoreResult<()> {
        self.add_object(member)
    }

    pub fn add_object(&mut self, member: &RecordKey) -> StoreResult<()> {
        self.store
            .add_all_to_has_many(&self.owner, &self.field, std::slice::from_ref(member))
    }

    /// Adds every member in one edit; observers see one flush.
    pub fn add_objects(&mut self, members: &[RecordKey]) -> StoreResult<()> {
        self.store
            .add_all_to_has_many(&self.owner, &self.field, members)
    }

    pub fn remove_object(&mut self, member: &RecordKey) -> StoreResult<()> {
        self.store
            .remove_all_from_has_many(&self.owner, &self.field, std::slice::from_ref(member))
    }

    pub fn remove_objects(&mut self, members: &[RecordKey]) -> StoreResult<()> {
        self.store
            .remove_all_from_has_many(&self.owner, &self.field, members)
    }
}
