//! Notifications published by [`BufferManager`](crate::BufferManager)

use std::sync::Arc;

use gasmon_model::Measurement;

/// Broadcast channel depth; slow subscribers see `Lagged` beyond this
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum BufferEvent {
    /// A new pending reading was installed
    CurrentReplaced(Measurement),
    /// A reading was appended to the buffer
    LastElementsChanged,
    /// A non-sentinel reading was rejected and sent to the outlier log
    OutlierRejected(Measurement),
    /// A batch left the buffer, oldest first. `sequence` counts flushes
    /// from 1.
    Flushed {
        sequence: u64,
        batch: Arc<[Measurement]>,
    },
}
