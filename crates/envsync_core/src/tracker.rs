//! Dirty-domain tracking with nested update transactions.

use crate::domain::DomainMask;
use crate::error::{CoreError, CoreResult};

/// Tracks which domains hold unpushed edits, batches edits made inside
/// `begin_update`/`end_update`, and counts settings revisions.
///
/// # Invariants
///
/// - A bit in the live mask means the cache holds edits the authority has
///   not seen yet
/// - The batched mask is only non-empty while `depth > 0`, and is merged into
///   the live mask exactly once, when the outermost update ends
/// - At most one push is scheduled per outermost update
/// - The scheduled mask holds the domains marked since it was last taken
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    dirty: DomainMask,
    batched: DomainMask,
    depth: u32,
    revision: u64,
    scheduled: DomainMask,
}

impl DirtyTracker {
    /// Creates a tracker with nothing dirty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks domains dirty, adding their enabled dependents.
    ///
    /// Outside a transaction the domains go straight into the live mask, the
    /// revision is bumped and a push is scheduled. Inside one they are only
    /// batched. Returns the expanded mask.
    pub fn mark_dirty(&mut self, mask: DomainMask, enabled: DomainMask) -> DomainMask {
        let expanded = mask.with_dependents(enabled);
        if expanded.is_empty() {
            return expanded;
        }
        if self.depth > 0 {
            self.batched |= expanded;
        } else {
            self.dirty |= expanded;
            self.revision += 1;
            self.scheduled |= expanded;
        }
        expanded
    }

    /// Opens a (possibly nested) transaction.
    pub fn begin_update(&mut self) {
        self.depth += 1;
    }

    /// Closes a transaction.
    ///
    /// When the outermost transaction closes, batched domains are marked
    /// dirty in one step. Returns true if that flush happened.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnbalancedTransaction`] if no transaction is open.
    pub fn end_update(&mut self, enabled: DomainMask) -> CoreResult<bool> {
        if self.depth == 0 {
            return Err(CoreError::UnbalancedTransaction);
        }
        self.depth -= 1;
        if self.depth > 0 || self.batched.is_empty() {
            return Ok(false);
        }
        let batched = std::mem::take(&mut self.batched);
        self.mark_dirty(batched, enabled);
        Ok(true)
    }

    /// Current transaction depth.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// True while a transaction is open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// The live dirty mask.
    #[must_use]
    pub fn dirty(&self) -> DomainMask {
        self.dirty
    }

    /// The batched mask of the open transaction.
    #[must_use]
    pub fn batched(&self) -> DomainMask {
        self.batched
    }

    /// True if any domain has unpushed edits, live or batched.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty() || !self.batched.is_empty()
    }

    /// Replaces the live mask, typically with the domains a push must retry.
    pub fn set_dirty(&mut self, mask: DomainMask) {
        self.dirty = mask;
    }

    /// Clears live and batched masks and any scheduled push.
    ///
    /// The revision is left alone: clearing dirtiness is not an edit.
    pub fn clear(&mut self) {
        self.dirty = DomainMask::EMPTY;
        self.batched = DomainMask::EMPTY;
        self.scheduled = DomainMask::EMPTY;
    }

    /// Takes the domains freshly marked dirty since the last call.
    ///
    /// Empty when no push has been scheduled.
    pub fn take_scheduled(&mut self) -> DomainMask {
        std::mem::take(&mut self.scheduled)
    }

    /// Current settings revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Bumps the revision without dirtying any domain.
    ///
    /// Used when the cache changed in a way the authority already reflects
    /// (a pull) or that only the persisted snapshot needs (a migration).
    pub fn bump_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;

    fn only(domain: Domain) -> DomainMask {
        DomainMask::only(domain)
    }

    #[test]
    fn mark_outside_transaction_is_live() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(only(Domain::Fog), DomainMask::EMPTY);

        assert_eq!(tracker.dirty(), only(Domain::Fog));
        assert_eq!(tracker.revision(), 1);
        assert_eq!(tracker.take_scheduled(), only(Domain::Fog));
        assert!(tracker.take_scheduled().is_empty());
    }

    #[test]
    fn mark_inside_transaction_is_batched() {
        let mut tracker = DirtyTracker::new();
        tracker.begin_update();
        tracker.mark_dirty(only(Domain::Fog), DomainMask::EMPTY);
        tracker.mark_dirty(only(Domain::SkyDisc), DomainMask::EMPTY);

        assert!(tracker.dirty().is_empty());
        assert_eq!(tracker.batched().len(), 2);
        assert_eq!(tracker.revision(), 0);
        assert!(tracker.take_scheduled().is_empty());
        assert!(tracker.has_pending());

        assert!(tracker.end_update(DomainMask::EMPTY).unwrap());
        assert_eq!(tracker.dirty().len(), 2);
        assert!(tracker.batched().is_empty());
        assert_eq!(tracker.revision(), 1);
        assert_eq!(tracker.take_scheduled(), only(Domain::Fog) | Domain::SkyDisc);
    }

    #[test]
    fn nested_transactions_flush_once() {
        let mut tracker = DirtyTracker::new();
        tracker.begin_update();
        tracker.begin_update();
        tracker.mark_dirty(only(Domain::Fog), DomainMask::EMPTY);

        assert!(!tracker.end_update(DomainMask::EMPTY).unwrap());
        assert!(tracker.dirty().is_empty());
        assert_eq!(tracker.depth(), 1);

        assert!(tracker.end_update(DomainMask::EMPTY).unwrap());
        assert_eq!(tracker.dirty(), only(Domain::Fog));
        assert_eq!(tracker.revision(), 1);
    }

    #[test]
    fn empty_transaction_schedules_nothing() {
        let mut tracker = DirtyTracker::new();
        tracker.begin_update();
        assert!(!tracker.end_update(DomainMask::EMPTY).unwrap());
        assert!(tracker.take_scheduled().is_empty());
        assert_eq!(tracker.revision(), 0);
    }

    #[test]
    fn unbalanced_end_is_an_error() {
        let mut tracker = DirtyTracker::new();
        assert!(matches!(
            tracker.end_update(DomainMask::EMPTY),
            Err(CoreError::UnbalancedTransaction)
        ));
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn dependents_expand_with_enabled_set() {
        let mut tracker = DirtyTracker::new();
        let enabled = only(Domain::Atmosphere) | Domain::Sun;
        let expanded = tracker.mark_dirty(only(Domain::Sun), enabled);

        assert!(expanded.contains(Domain::Atmosphere));
        assert!(tracker.dirty().contains(Domain::Atmosphere));
        assert!(!tracker.dirty().contains(Domain::SkyDisc));
    }

    #[test]
    fn dependents_expand_at_flush_time() {
        let mut tracker = DirtyTracker::new();
        tracker.begin_update();
        tracker.mark_dirty(only(Domain::SkyImage), DomainMask::EMPTY);
        tracker
            .end_update(only(Domain::SkyLight) | Domain::SkyImage)
            .unwrap();
        assert!(tracker.dirty().contains(Domain::SkyLight));
    }

    #[test]
    fn scheduled_holds_only_fresh_marks() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(only(Domain::Sun), DomainMask::EMPTY);
        tracker.take_scheduled();

        // Sun stays dirty but is not marked again
        tracker.mark_dirty(only(Domain::Fog), DomainMask::ALL);
        assert_eq!(tracker.dirty(), only(Domain::Sun) | Domain::Fog);
        assert_eq!(tracker.take_scheduled(), only(Domain::Fog));
    }

    #[test]
    fn clear_keeps_revision() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(DomainMask::ALL, DomainMask::ALL);
        tracker.clear();
        assert!(!tracker.has_pending());
        assert_eq!(tracker.revision(), 1);
        assert_eq!(tracker.bump_revision(), 2);
    }
}
