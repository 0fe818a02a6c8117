//! Single-valued relationship state.

use crate::model::key::RecordKey;
use crate::relationship::RelationshipMeta;

/// Local overlay of a belongs-to field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum LocalValue {
    #[default]
    NotSet,
    Set(Option<RecordKey>),
}

/// Canonical value plus optional local override.
///
/// Normalized so that a local value equal to canonical is stored as
/// `NotSet`; dirtiness is therefore just "a local value is present".
#[derive(Debug, Default)]
pub struct BelongsTo {
    pub(crate) meta: RelationshipMeta,
    canonical: Option<RecordKey>,
    local: LocalValue,
}

impl BelongsTo {
    pub(crate) fn new(meta: RelationshipMeta) -> Self {
        Self {
            meta,
            canonical: None,
            local: LocalValue::NotSet,
        }
    }

    pub fn canonical(&self) -> Option<&RecordKey> {
        self.canonical.as_ref()
    }

    /// Effective value exposed to readers.
    pub fn current(&self) -> Option<&RecordKey> {
        match &self.local {
            LocalValue::Set(value) => value.as_ref(),
            LocalValue::NotSet => self.canonical.as_ref(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self.local, LocalValue::Set(_))
    }

    /// Replaces the local value. Returns whether `current()` changed.
    pub(crate) fn set_local(&mut self, value: Option<RecordKey>) -> bool {
        let before = self.current().cloned();
        let changed = before != value;
        self.local = if value == self.canonical {
            LocalValue::NotSet
        } else {
            LocalValue::Set(value)
        };
        changed
    }

    /// Replaces the canonical value. Returns whether `current()` changed.
    pub(crate) fn set_canonical(&mut self, value: Option<RecordKey>) -> bool {
        let before = self.current().cloned();
        self.canonical = value;
        if self.local == LocalValue::Set(self.canonical.clone()) {
            self.local = LocalValue::NotSet;
        }
        before.as_ref() != self.current()
    }

    /// Drops the local override, returning it when one was present.
    pub(crate) fn discard_local(&mut self) -> Option<Option<RecordKey>> {
        match std::mem::take(&mut self.local) {
            LocalValue::Set(value) => Some(value),
            LocalValue::NotSet => None,
        }
    }

    /// Removes every trace of `member`. Returns whether anything changed.
    pub(crate) fn forget(&mut self, member: &RecordKey) -> bool {
        let before = self.current().cloned();
        let mut touched = false;
        if self.canonical.as_ref() == Some(member) {
            self.canonical = None;
            touched = true;
        }
        if self.local == LocalValue::Set(Some(member.clone())) {
            self.local = LocalValue::NotSet;
            touched = true;
        }
        if self.local == LocalValue::Set(self.canonical.clone()) {
            self.local = LocalValue::NotSet;
        }
        touched || before.as_ref() != self.current()
    }

    /// Whether `member` is referenced by canonical or local state.
    pub(crate) fn references(&self, member: &RecordKey) -> bool {
        self.canonical.as_ref() == Some(member)
            || self.local == LocalValue::Set(Some(member.clone()))
    }

    pub(crate) fn referenced(&self) -> Vec<RecordKey> {
        let mut keys: Vec<RecordKey> = self.canonical.iter().cloned().collect();
        if let LocalValue::Set(Some(value)) = &self.local {
            if !keys.contains(value) {
                keys.push(value.clone());
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::BelongsTo;
    use crate::model::key::RecordKey;
    use crate::relationship::RelationshipMeta;

    fn key(id: &str) -> RecordKey {
        RecordKey::new("user", id)
    }

    #[test]
    fn local_value_overrides_canonical() {
        let mut rel = BelongsTo::new(RelationshipMeta::default());
        rel.set_canonical(Some(key("1")));
        assert!(rel.set_local(Some(key("2"))));
        assert_eq!(rel.current(), Some(&key("2")));
        assert_eq!(rel.canonical(), Some(&key("1")));
        assert!(rel.is_dirty());
    }

    #[test]
    fn setting_back_to_canonical_is_net_zero() {
        let mut rel = BelongsTo::new(RelationshipMeta::default());
        rel.set_canonical(Some(key("1")));
        rel.set_local(None);
        assert!(rel.is_dirty());
        rel.set_local(Some(key("1")));
        assert!(!rel.is_dirty());
        assert_eq!(rel.current(), Some(&key("1")));
    }

    #[test]
    fn canonical_null_keeps_explicit_local_value() {
        let mut rel = BelongsTo::new(RelationshipMeta::default());
        rel.set_canonical(Some(key("1")));
        rel.set_local(Some(key("2")));
        rel.set_canonical(None);
        assert_eq!(rel.current(), Some(&key("2")));

        let mut plain = BelongsTo::new(RelationshipMeta::default());
        plain.set_canonical(Some(key("1")));
        assert!(plain.set_canonical(None));
        assert_eq!(plain.current(), None);
    }

    #[test]
    fn canonical_confirming_local_value_clears_dirtiness() {
        let mut rel = BelongsTo::new(RelationshipMeta::default());
        rel.set_local(Some(key("3")));
        assert!(!rel.set_canonical(Some(key("3"))));
        assert!(!rel.is_dirty());
    }

    #[test]
    fn discard_local_returns_override() {
        let mut rel = BelongsTo::new(RelationshipMeta::default());
        rel.set_local(Some(key("4")));
        assert_eq!(rel.discard_local(), Some(Some(key("4"))));
        assert_eq!(rel.discard_local(), None);
        assert_eq!(rel.current(), None);
    }
}
