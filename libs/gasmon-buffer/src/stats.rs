//! Buffer counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the acquisition cycle
#[derive(Debug, Default)]
pub struct BufferStats {
    /// Readings appended after passing validation
    pub accepted: AtomicU64,
    /// Readings appended through the forced-accept path
    pub forced_accepted: AtomicU64,
    /// Non-sentinel readings sent to the outlier log
    pub rejected: AtomicU64,
    /// Sentinel readings dropped
    pub discarded: AtomicU64,
    pub flush_count: AtomicU64,
    pub measurements_flushed: AtomicU64,
    /// Batches the sink refused; those measurements are lost
    pub sink_errors: AtomicU64,
}

impl BufferStats {
    pub fn snapshot(&self) -> BufferStatsSnapshot {
        BufferStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            forced_accepted: self.forced_accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
            measurements_flushed: self.measurements_flushed.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Snapshot of buffer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStatsSnapshot {
    pub accepted: u64,
    pub forced_accepted: u64,
    pub rejected: u64,
    pub discarded: u64,
    pub flush_count: u64,
    pub measurements_flushed: u64,
    pub sink_errors: u64,
}
