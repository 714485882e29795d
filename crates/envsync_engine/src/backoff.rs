//! Per-domain retry bookkeeping.

use crate::config::RetryConfig;
use envsync_core::{Domain, DomainMask};

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    failures: u32,
    next_frame: u64,
}

/// When each failed domain may be pushed again.
#[derive(Debug, Clone, Default)]
pub(crate) struct RetrySchedule {
    entries: [Entry; Domain::COUNT],
}

impl RetrySchedule {
    /// Records a failure at `frame`, returning the frame of the next attempt.
    pub(crate) fn record_failure(&mut self, domain: Domain, frame: u64, config: &RetryConfig) -> u64 {
        let entry = &mut self.entries[domain.index()];
        entry.failures = entry.failures.saturating_add(1);
        entry.next_frame = frame + config.delay_for_attempt(entry.failures).max(1);
        entry.next_frame
    }

    pub(crate) fn record_success(&mut self, domain: Domain) {
        self.entries[domain.index()] = Entry::default();
    }

    pub(crate) fn failures(&self, domain: Domain) -> u32 {
        self.entries[domain.index()].failures
    }

    /// The domains of `mask` whose wait has elapsed by `frame`.
    pub(crate) fn due(&self, mask: DomainMask, frame: u64) -> DomainMask {
        mask.iter()
            .filter(|d| self.entries[d.index()].next_frame <= frame)
            .collect()
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_back_off() {
        let config = RetryConfig::new(2);
        let mut schedule = RetrySchedule::default();
        let fog = DomainMask::only(Domain::Fog);

        assert_eq!(schedule.record_failure(Domain::Fog, 10, &config), 12);
        assert!(schedule.due(fog, 11).is_empty());
        assert_eq!(schedule.due(fog, 12), fog);

        assert_eq!(schedule.record_failure(Domain::Fog, 12, &config), 16);
        assert_eq!(schedule.failures(Domain::Fog), 2);

        schedule.record_success(Domain::Fog);
        assert_eq!(schedule.due(fog, 12), fog);
        assert_eq!(schedule.failures(Domain::Fog), 0);
    }

    #[test]
    fn immediate_retry_waits_one_frame() {
        let mut schedule = RetrySchedule::default();
        assert_eq!(schedule.record_failure(Domain::Sun, 5, &RetryConfig::immediate()), 6);
    }

    #[test]
    fn untouched_domains_are_due() {
        let schedule = RetrySchedule::default();
        assert_eq!(schedule.due(DomainMask::ALL, 0), DomainMask::ALL);
    }
}
