use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

/// Statistics regarding the pool.
///
/// Counters are updated with relaxed ordering and are advisory; readings
/// taken while the pool is busy may be mutually inconsistent.
#[derive(Debug, Default)]
#[must_use]
pub struct PoolMetrics {
    created: AtomicU64,
    freed: AtomicU64,
    checkouts: AtomicU64,
    validate_failures: AtomicU64,
    check_failures: AtomicU64,
    total_waiting: AtomicU64,
}

// 64bit microseconds is 580000 years - really not important
#[allow(clippy::cast_possible_truncation)]
impl PoolMetrics {
    pub(crate) fn record_created(&self) {
        let _ = self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_freed(&self) {
        let _ = self.freed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkout(&self, wait_start: Instant) {
        let waiting = wait_start.elapsed().as_micros() as u64;
        let _ = self.checkouts.fetch_add(1, Ordering::Relaxed);
        let _ = self.total_waiting.fetch_add(waiting, Ordering::Relaxed);
    }

    pub(crate) fn record_validate_failure(&self) {
        let _ = self.validate_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_check_failure(&self) {
        let _ = self.check_failures.fetch_add(1, Ordering::Relaxed);
    }
}

impl PoolMetrics {
    /// Get the total number of resources the factory has produced.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Get the total number of resources handed to the destructor.
    pub fn freed(&self) -> u64 {
        self.freed.load(Ordering::Relaxed)
    }

    /// Get the total number of successful checkouts.
    pub fn checkouts(&self) -> u64 {
        self.checkouts.load(Ordering::Relaxed)
    }

    /// Get the number of idle resources dropped by the pre-checkout probe.
    pub fn validate_failures(&self) -> u64 {
        self.validate_failures.load(Ordering::Relaxed)
    }

    /// Get the number of released resources rejected by the health check.
    pub fn check_failures(&self) -> u64 {
        self.check_failures.load(Ordering::Relaxed)
    }

    /// Get the total number of microseconds acquirers spent waiting for a
    /// checkout.
    pub fn microseconds_waiting(&self) -> u64 {
        self.total_waiting.load(Ordering::Relaxed)
    }
}
