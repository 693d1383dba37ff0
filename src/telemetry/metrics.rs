//! Per-queue packet counters.
//!
//! Counters are atomic so a session task and a reporting task can share them
//! without locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Statistics for one bound queue session.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Events delivered by the kernel.
    pub received: Counter,
    /// Payload bytes delivered.
    pub bytes_received: Counter,
    /// Accept verdicts sent (including defaults after callback errors).
    pub accepted: Counter,
    /// Drop verdicts sent.
    pub dropped: Counter,
    /// Modify verdicts sent.
    pub modified: Counter,
    /// Packets that failed header parsing (still verdicted).
    pub parse_failures: Counter,
}

impl QueueStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold another stats object's counts into this one.
    pub fn absorb(&self, other: &QueueStats) {
        self.received.add(other.received.get());
        self.bytes_received.add(other.bytes_received.get());
        self.accepted.add(other.accepted.get());
        self.dropped.add(other.dropped.get());
        self.modified.add(other.modified.get());
        self.parse_failures.add(other.parse_failures.get());
    }
}

/// Registry aggregating stats across queues, keyed by queue number.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queues: RwLock<HashMap<u16, Arc<QueueStats>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a session's stats under its queue number.
    ///
    /// Counts from a previous session on the same queue (a rebind after a
    /// failure) carry over into the new stats object.
    pub fn attach(&self, queue: u16, stats: Arc<QueueStats>) {
        let mut queues = self.queues.write().unwrap();
        if let Some(prev) = queues.insert(queue, Arc::clone(&stats)) {
            if !Arc::ptr_eq(&prev, &stats) {
                stats.absorb(&prev);
            }
        }
    }

    /// Export all counters as key-value pairs (Prometheus-convertible).
    pub fn export(&self) -> Vec<(String, u64)> {
        let queues = self.queues.read().unwrap();
        let mut result = Vec::new();
        for (num, stats) in queues.iter() {
            result.extend([
                (format!("queue{}_received", num), stats.received.get()),
                (
                    format!("queue{}_bytes_received", num),
                    stats.bytes_received.get(),
                ),
                (format!("queue{}_accepted", num), stats.accepted.get()),
                (format!("queue{}_dropped", num), stats.dropped.get()),
                (format!("queue{}_modified", num), stats.modified.get()),
                (
                    format!("queue{}_parse_failures", num),
                    stats.parse_failures.get(),
                ),
            ]);
        }
        result.sort();
        result
    }
}
