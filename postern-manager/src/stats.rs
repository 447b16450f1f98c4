use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Running counters for a [`SpoolManager`](crate::SpoolManager)
#[derive(Debug, Default)]
pub struct ManagerStats {
    claimed: AtomicU64,
    disposed: AtomicU64,
    parked: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
}

/// A point-in-time copy of [`ManagerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Mail taken off the queue by a worker
    pub claimed: u64,
    /// Mail removed from the queue after routing finished
    pub disposed: u64,
    /// Stalled mail put back with a delay
    pub parked: u64,
    /// Claims or queue writes that failed
    pub failed: u64,
    /// Mail currently being routed
    pub in_flight: usize,
}

impl ManagerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            claimed: self.claimed.load(Ordering::Relaxed),
            disposed: self.disposed.load(Ordering::Relaxed),
            parked: self.parked.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn record_disposed(&self) {
        self.disposed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parked(&self) {
        self.parked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a claim; the mail stays in flight until the returned guard drops
    pub(crate) fn begin(&self) -> InFlight<'_> {
        self.claimed.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlight { stats: self }
    }
}

pub(crate) struct InFlight<'a> {
    stats: &'a ManagerStats,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
