//! Identity map: the single owner of every record.
//!
//! # Invariants
//! - At most one `Record` per `RecordKey` while it is loaded.
//! - Iteration follows first-reference order.

use crate::model::key::RecordKey;
use crate::model::record::Record;
use indexmap::IndexMap;
use log::debug;

#[derive(Debug, Default)]
pub(crate) struct IdentityMap {
    records: IndexMap<RecordKey, Record>,
}

impl IdentityMap {
    pub(crate) fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.records.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &RecordKey) -> Option<&mut Record> {
        self.records.get_mut(key)
    }

    pub(crate) fn contains(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    /// Returns the record for `key`, creating an empty one when absent.
    pub(crate) fn get_or_insert(&mut self, key: &RecordKey) -> &mut Record {
        if !self.records.contains_key(key) {
            debug!("event=record_create module=identity_map status=ok key={key}");
        }
        self.records
            .entry(key.clone())
            .or_insert_with(|| Record::new(key.clone()))
    }

    pub(crate) fn remove(&mut self, key: &RecordKey) -> Option<Record> {
        let removed = self.records.shift_remove(key);
        if removed.is_some() {
            debug!("event=record_remove module=identity_map status=ok key={key}");
        }
        removed
    }

    pub(crate) fn of_model<'a>(&'a self, model: &str) -> impl Iterator<Item = &'a Record> + 'a {
        let model = model.to_string();
        self.records
            .values()
            .filter(move |record| record.key().model == model)
    }

    pub(crate) fn keys_of_model(&self, model: &str) -> Vec<RecordKey> {
        self.of_model(model).map(|record| record.key().clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
