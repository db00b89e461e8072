use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-local counters for quota decisions. Cloning shares the counters.
#[derive(Clone, Default)]
pub struct QuotaMetrics {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    accepted: AtomicU64,
    rejected: AtomicU64,
    overflows: AtomicU64,
    drain_failures: AtomicU64,
    store_errors: AtomicU64,
}

impl QuotaMetrics {
    pub fn record_accepted(&self) {
        self.inner.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// An increment landed past capacity and had to be drained.
    pub fn record_overflow(&self) {
        self.inner.overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drain_failure(&self) {
        self.inner.drain_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.inner.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QuotaStatsSnapshot {
        QuotaStatsSnapshot {
            accepted: self.inner.accepted.load(Ordering::Relaxed),
            rejected: self.inner.rejected.load(Ordering::Relaxed),
            overflows: self.inner.overflows.load(Ordering::Relaxed),
            drain_failures: self.inner.drain_failures.load(Ordering::Relaxed),
            store_errors: self.inner.store_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuotaStatsSnapshot {
    pub accepted: u64,
    pub rejected: u64,
    pub overflows: u64,
    pub drain_failures: u64,
    pub store_errors: u64,
}
