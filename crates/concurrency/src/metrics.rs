//! Transaction counters
//!
//! The counters use Relaxed ordering: they are observational only, never
//! synchronize other memory, and approximate values are fine for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct MetricCounters {
    active: AtomicU64,
    started: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
    conflicted: AtomicU64,
    exclusive: AtomicU64,
}

impl MetricCounters {
    pub fn record_start(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.finish();
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Rolled back by the caller or after a conflict
    pub fn record_abort(&self, conflict: bool) {
        self.finish();
        self.aborted.fetch_add(1, Ordering::Relaxed);
        if conflict {
            self.conflicted.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_exclusive(&self) {
        self.exclusive.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TransactionMetrics {
        let started = self.started.load(Ordering::Relaxed);
        let committed = self.committed.load(Ordering::Relaxed);
        TransactionMetrics {
            active_count: self.active.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.aborted.load(Ordering::Relaxed),
            total_conflicts: self.conflicted.load(Ordering::Relaxed),
            total_exclusive: self.exclusive.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }

    fn finish(&self) {
        // Saturating so a stray double-finish cannot wrap
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }
}

/// Transaction metrics
///
/// Snapshot of transaction lifecycle statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionMetrics {
    /// Number of currently active transactions
    pub active_count: u64,
    /// Total number of transactions started
    pub total_started: u64,
    /// Total number of transactions committed
    pub total_committed: u64,
    /// Total number of transactions rolled back, conflicts included
    pub total_aborted: u64,
    /// Aborts caused by isolation conflicts
    pub total_conflicts: u64,
    /// Upgrades to exclusive mode
    pub total_exclusive: u64,
    /// Commit success rate (committed / started)
    pub commit_rate: f64,
}

impl TransactionMetrics {
    /// Total transactions that completed (committed + aborted)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// Abort rate (aborted / started)
    pub fn abort_rate(&self) -> f64 {
        if self.total_started > 0 {
            self.total_aborted as f64 / self.total_started as f64
        } else {
            0.0
        }
    }
}
