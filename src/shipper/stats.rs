use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between producers, the publisher and whoever inspects the shipper.
#[derive(Debug, Default)]
pub struct ShipperStats {
    enqueued: AtomicU64,
    delivery_attempts: AtomicU64,
    ordering_conflicts: AtomicU64,
    batches_delivered: AtomicU64,
    events_delivered: AtomicU64,
    batches_lost: AtomicU64,
    events_lost: AtomicU64,
}

impl ShipperStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self) {
        self.delivery_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.ordering_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, events: usize) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.events_delivered
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_lost(&self, events: usize) {
        self.batches_lost.fetch_add(1, Ordering::Relaxed);
        self.events_lost.fetch_add(events as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters. `dropped` comes from the buffer.
    pub fn snapshot(&self, dropped: u64, buffered: usize) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped,
            buffered,
            delivery_attempts: self.delivery_attempts.load(Ordering::Relaxed),
            ordering_conflicts: self.ordering_conflicts.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            batches_lost: self.batches_lost.load(Ordering::Relaxed),
            events_lost: self.events_lost.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub buffered: usize,
    pub delivery_attempts: u64,
    pub ordering_conflicts: u64,
    pub batches_delivered: u64,
    pub events_delivered: u64,
    pub batches_lost: u64,
    pub events_lost: u64,
}
