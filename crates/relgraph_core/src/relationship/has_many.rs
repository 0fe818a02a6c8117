//! Ordered, multi-valued relationship state.
//!
//! # Invariants
//! - `removals ⊆ canonical` and `additions ∩ canonical = ∅`, so a remove
//!   followed by a re-add of a canonical member (or the reverse) leaves no
//!   delta behind.
//! - Current order is canonical order (minus removals) followed by
//!   additions in insertion order.

use crate::model::key::RecordKey;
use crate::relationship::RelationshipMeta;
use indexmap::IndexSet;

/// Membership delta produced by an authoritative canonical replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CanonicalDiff {
    /// Members new to canonical state.
    pub(crate) added: Vec<RecordKey>,
    /// Members dropped from canonical state.
    pub(crate) removed: Vec<RecordKey>,
    /// Locally removed members that the new canonical state still contains.
    pub(crate) reinstated: Vec<RecordKey>,
}

#[derive(Debug, Default)]
pub struct HasMany {
    pub(crate) meta: RelationshipMeta,
    canonical: IndexSet<RecordKey>,
    additions: IndexSet<RecordKey>,
    removals: IndexSet<RecordKey>,
}

impl HasMany {
    pub(crate) fn new(meta: RelationshipMeta) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    pub fn canonical(&self) -> impl Iterator<Item = &RecordKey> {
        self.canonical.iter()
    }

    pub fn is_canonical_member(&self, member: &RecordKey) -> bool {
        self.canonical.contains(member)
    }

    /// Effective members: canonical minus removals, then additions.
    pub fn current(&self) -> Vec<RecordKey> {
        self.canonical
            .iter()
            .filter(|member| !self.removals.contains(*member))
            .chain(self.additions.iter())
            .cloned()
            .collect()
    }

    pub fn contains(&self, member: &RecordKey) -> bool {
        self.additions.contains(member)
            || (self.canonical.contains(member) && !self.removals.contains(member))
    }

    pub fn is_dirty(&self) -> bool {
        !self.additions.is_empty() || !self.removals.is_empty()
    }

    pub fn local_additions(&self) -> impl Iterator<Item = &RecordKey> {
        self.additions.iter()
    }

    pub fn local_removals(&self) -> impl Iterator<Item = &RecordKey> {
        self.removals.iter()
    }

    /// Adds `member` locally. Returns whether current membership changed.
    pub(crate) fn add_local(&mut self, member: RecordKey) -> bool {
        if self.removals.shift_remove(&member) {
            return true;
        }
        if self.canonical.contains(&member) {
            return false;
        }
        self.additions.insert(member)
    }

    /// Removes `member` locally. Returns whether current membership changed.
    pub(crate) fn remove_local(&mut self, member: &RecordKey) -> bool {
        if self.additions.shift_remove(member) {
            return true;
        }
        if self.canonical.contains(member) {
            return self.removals.insert(member.clone());
        }
        false
    }

    /// Adds `member` to canonical state, absorbing a matching local addition.
    pub(crate) fn add_canonical(&mut self, member: RecordKey) -> bool {
        if self.canonical.contains(&member) {
            return false;
        }
        let was_added = self.additions.shift_remove(&member);
        self.canonical.insert(member);
        !was_added
    }

    /// Removes `member` from canonical state, absorbing a matching local removal.
    pub(crate) fn remove_canonical(&mut self, member: &RecordKey) -> bool {
        if !self.canonical.shift_remove(member) {
            return false;
        }
        !self.removals.shift_remove(member)
    }

    /// Replaces canonical membership with `members` (authoritative).
    ///
    /// Local removals are dropped; local additions already present in
    /// `members` are absorbed, the rest are kept.
    pub(crate) fn replace_canonical(&mut self, members: Vec<RecordKey>) -> CanonicalDiff {
        let next: IndexSet<RecordKey> = members.into_iter().collect();
        let added = next
            .iter()
            .filter(|member| !self.canonical.contains(*member))
            .cloned()
            .collect();
        let removed = self
            .canonical
            .iter()
            .filter(|member| !next.contains(*member))
            .cloned()
            .collect();
        let reinstated = self
            .removals
            .drain(..)
            .filter(|member| next.contains(member))
            .collect();
        self.additions.retain(|member| !next.contains(member));
        self.canonical = next;
        CanonicalDiff {
            added,
            removed,
            reinstated,
        }
    }

    /// Drops both local overlays and returns `(additions, removals)`.
    pub(crate) fn discard_local(&mut self) -> (Vec<RecordKey>, Vec<RecordKey>) {
        let additions = self.additions.drain(..).collect();
        let removals = self.removals.drain(..).collect();
        (additions, removals)
    }

    pub(crate) fn revert_addition(&mut self, member: &RecordKey) -> bool {
        self.additions.shift_remove(member)
    }

    pub(crate) fn revert_removal(&mut self, member: &RecordKey) -> bool {
        self.removals.shift_remove(member)
    }

    /// Removes every trace of `member`. Returns whether it was a current member.
    pub(crate) fn forget(&mut self, member: &RecordKey) -> bool {
        let was_current = self.contains(member);
        self.canonical.shift_remove(member);
        self.additions.shift_remove(member);
        self.removals.shift_remove(member);
        was_current
    }

    pub(crate) fn references(&self, member: &RecordKey) -> bool {
        self.canonical.contains(member) || self.additions.contains(member)
    }

    pub(crate) fn referenced(&self) -> Vec<RecordKey> {
        self.canonical
            .iter()
            .chain(self.additions.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::HasMany;
    use crate::model::key::RecordKey;
    use crate::relationship::RelationshipMeta;

    fn key(id: &str) -> RecordKey {
        RecordKey::new("topic", id)
    }

    fn loaded(ids: &[&str]) -> HasMany {
        let mut rel = HasMany::new(RelationshipMeta::default());
        rel.replace_canonical(ids.iter().map(|id| key(id)).collect());
        rel
    }

    #[test]
    fn add_then_remove_is_net_zero() {
        let mut rel = loaded(&["1"]);
        assert!(rel.add_local(key("2")));
        assert!(rel.is_dirty());
        assert!(rel.remove_local(&key("2")));
        assert!(!rel.is_dirty());
        assert_eq!(rel.current(), vec![key("1")]);
    }

    #[test]
    fn remove_then_readd_canonical_member_is_net_zero() {
        let mut rel = loaded(&["1", "2"]);
        assert!(rel.remove_local(&key("1")));
        assert_eq!(rel.current(), vec![key("2")]);
        assert!(rel.add_local(key("1")));
        assert!(!rel.is_dirty());
        assert_eq!(rel.current(), vec![key("1"), key("2")]);
    }

    #[test]
    fn interleaved_edits_keep_overlays_disjoint() {
        let mut rel = loaded(&["1"]);
        for _ in 0..3 {
            rel.add_local(key("2"));
            rel.remove_local(&key("1"));
            rel.add_local(key("1"));
            rel.remove_local(&key("2"));
        }
        assert!(!rel.add_local(key("1")));
        assert!(!rel.remove_local(&key("9")));
        assert!(!rel.is_dirty());
    }

    #[test]
    fn canonical_add_absorbs_local_addition() {
        let mut rel = loaded(&[]);
        rel.add_local(key("3"));
        assert!(!rel.add_canonical(key("3")));
        assert!(!rel.is_dirty());
        assert!(rel.is_canonical_member(&key("3")));
    }

    #[test]
    fn canonical_remove_absorbs_local_removal() {
        let mut rel = loaded(&["1"]);
        rel.remove_local(&key("1"));
        assert!(!rel.remove_canonical(&key("1")));
        assert!(!rel.is_dirty());
        assert!(rel.current().is_empty());
    }

    #[test]
    fn replace_canonical_is_authoritative() {
        let mut rel = loaded(&["1", "2"]);
        rel.remove_local(&key("1"));
        rel.remove_local(&key("2"));
        rel.add_local(key("3"));
        rel.add_local(key("4"));

        let diff = rel.replace_canonical(vec![key("2"), key("3")]);
        assert_eq!(diff.added, vec![key("3")]);
        assert_eq!(diff.removed, vec![key("1")]);
        assert_eq!(diff.reinstated, vec![key("2")]);
        assert_eq!(rel.current(), vec![key("2"), key("3"), key("4")]);
        assert_eq!(rel.local_additions().cloned().collect::<Vec<_>>(), vec![key("4")]);
        assert_eq!(rel.local_removals().count(), 0);
    }

    #[test]
    fn discard_local_returns_both_overlays() {
        let mut rel = loaded(&["1"]);
        rel.remove_local(&key("1"));
        rel.add_local(key("2"));
        let (additions, removals) = rel.discard_local();
        assert_eq!(additions, vec![key("2")]);
        assert_eq!(removals, vec![key("1")]);
        assert_eq!(rel.current(), vec![key("1")]);
    }
}
