use std::sync::atomic::{AtomicU64, Ordering};

/// Cheap counters observed by the portfolio risk monitor and any reporting
/// surface; never gates dispatch.
#[derive(Debug, Default)]
pub struct BusMetrics {
    published: AtomicU64,
    dispatched: AtomicU64,
    handler_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusMetricsSnapshot {
    pub published: u64,
    pub dispatched: u64,
    pub handler_errors: u64,
}

impl BusMetrics {
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BusMetricsSnapshot {
        BusMetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
        }
    }
}
