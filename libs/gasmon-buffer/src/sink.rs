//! Persistence seams
//!
//! Both sinks are called from inside the acquisition cycle and must return
//! promptly. Implementations that do real I/O should queue the work.

use std::sync::Arc;

use gasmon_model::Measurement;
use parking_lot::Mutex;

use crate::error::{BufferError, Result};

/// Receives flushed batches, in flush order
pub trait BatchSink: Send + Sync {
    fn submit(&self, batch: Vec<Measurement>) -> Result<()>;
}

/// Receives rejected readings. Failures are logged and otherwise ignored.
pub trait OutlierSink: Send + Sync {
    fn append(&self, measurement: &Measurement) -> Result<()>;
}

/// In-memory sink recording everything it is given
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemorySinkState>>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    batches: Vec<Vec<Measurement>>,
    outliers: Vec<Measurement>,
    failing: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every following submission
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    pub fn batches(&self) -> Vec<Vec<Measurement>> {
        self.inner.lock().batches.clone()
    }

    pub fn outliers(&self) -> Vec<Measurement> {
        self.inner.lock().outliers.clone()
    }
}

impl BatchSink for MemorySink {
    fn submit(&self, batch: Vec<Measurement>) -> Result<()> {
        let mut state = self.inner.lock();
        if state.failing {
            return Err(BufferError::Sink("memory sink set to fail".into()));
        }
        state.batches.push(batch);
        Ok(())
    }
}

impl OutlierSink for MemorySink {
    fn append(&self, measurement: &Measurement) -> Result<()> {
        let mut state = self.inner.lock();
        if state.failing {
            return Err(BufferError::Sink("memory sink set to fail".into()));
        }
        state.outliers.push(*measurement);
        Ok(())
    }
}
