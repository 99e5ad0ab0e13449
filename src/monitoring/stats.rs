/*!
 * Lock-Free Scheduler Statistics
 * Atomic counters bumped on the hot scheduling paths
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerStats {
    pub dispatches: u64,
    pub preemptions: u64,
    pub voluntary_yields: u64,
    pub demotions: u64,
    pub boosts: u64,
    pub escape_grants: u64,
    pub escape_violations: u64,
    pub idle_passes: u64,
}

/// Atomic scheduler statistics for lock-free updates
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - All operations use relaxed ordering
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct AtomicSchedulerStats {
    dispatches: AtomicU64,
    preemptions: AtomicU64,
    voluntary_yields: AtomicU64,
    demotions: AtomicU64,
    boosts: AtomicU64,
    escape_grants: AtomicU64,
    escape_violations: AtomicU64,
    idle_passes: AtomicU64,
}

impl AtomicSchedulerStats {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hot path - called on every context switch into a program
    #[inline(always)]
    pub fn inc_dispatches(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Hot path - called on every timer preemption
    #[inline(always)]
    pub fn inc_preemptions(&self) {
        self.preemptions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_voluntary_yields(&self) {
        self.voluntary_yields.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_demotions(&self) {
        self.demotions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_boosts(&self) {
        self.boosts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_escape_grants(&self) {
        self.escape_grants.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_escape_violations(&self) {
        self.escape_violations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_idle_passes(&self) {
        self.idle_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of current stats
    ///
    /// # Note
    /// Counters may be mutually inconsistent under concurrent updates; each
    /// individual value is accurate.
    #[inline]
    pub fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            voluntary_yields: self.voluntary_yields.load(Ordering::Relaxed),
            demotions: self.demotions.load(Ordering::Relaxed),
            boosts: self.boosts.load(Ordering::Relaxed),
            escape_grants: self.escape_grants.load(Ordering::Relaxed),
            escape_violations: self.escape_violations.load(Ordering::Relaxed),
            idle_passes: self.idle_passes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let stats = AtomicSchedulerStats::new();
        stats.inc_dispatches();
        stats.inc_dispatches();
        stats.inc_boosts();

        let snap = stats.snapshot();
        assert_eq!(snap.dispatches, 2);
        assert_eq!(snap.boosts, 1);
        assert_eq!(snap.demotions, 0);
    }
}
