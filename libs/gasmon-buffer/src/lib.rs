//! Measurement buffer
//!
//! [`BufferManager`] classifies each pending reading, keeps accepted ones in
//! FIFO order and hands everything but the most recent
//! [`RETAINED_WINDOW`] entries to a [`BatchSink`] once the buffer outgrows its
//! capacity. Rejected readings go to an [`OutlierSink`].

pub mod error;
pub mod events;
pub mod manager;
pub mod sink;
pub mod stats;

pub use error::{BufferError, Result};
pub use events::BufferEvent;
pub use manager::{BufferConfig, BufferManager, Disposition, RETAINED_WINDOW};
pub use sink::{BatchSink, MemorySink, OutlierSink};
pub use stats::{BufferStats, BufferStatsSnapshot};
