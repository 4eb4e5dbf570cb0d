//! Buffer manager: classify, append, flush

use std::collections::VecDeque;
use std::sync::Arc;

use gasmon_model::{Measurement, ValidationState, Validator, Verdict};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{BufferError, Result};
use crate::events::{BufferEvent, EVENT_CHANNEL_CAPACITY};
use crate::sink::{BatchSink, OutlierSink};
use crate::stats::{BufferStats, BufferStatsSnapshot};

/// Entries kept after a flush, for validation continuity and live display
pub const RETAINED_WINDOW: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferConfig {
    /// Measurements handed to the sink per flush
    pub batch_size: usize,
    /// Absolute delta allowed on each channel
    pub threshold: f64,
}

impl BufferConfig {
    pub fn new(batch_size: usize, threshold: f64) -> Self {
        Self {
            batch_size,
            threshold,
        }
    }

    /// Largest length the buffer holds without flushing
    pub fn capacity(&self) -> usize {
        self.batch_size + RETAINED_WINDOW - 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BufferError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(BufferError::InvalidConfig(format!(
                "threshold {} must be a non-negative number",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// What happened to the pending reading during [`BufferManager::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Accepted,
    /// Outlier accepted because the rejection streak ran too long
    ForcedAccepted,
    /// Sent to the outlier log
    Rejected,
    /// Sentinel; dropped without logging
    Discarded,
}

/// Owner of the pending reading, the buffer and the rejection streak.
///
/// Not synchronised: one acquisition cycle at a time.
pub struct BufferManager {
    config: BufferConfig,
    validator: Validator,
    current: Measurement,
    buffer: VecDeque<Measurement>,
    state: ValidationState,
    batch_sink: Arc<dyn BatchSink>,
    outlier_sink: Arc<dyn OutlierSink>,
    events: broadcast::Sender<BufferEvent>,
    flush_sequence: u64,
    stats: BufferStats,
}

impl BufferManager {
    pub fn new(
        config: BufferConfig,
        batch_sink: Arc<dyn BatchSink>,
        outlier_sink: Arc<dyn OutlierSink>,
    ) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            validator: Validator::new(config.threshold),
            current: Measurement::sentinel(),
            buffer: VecDeque::with_capacity(config.capacity() + 1),
            state: ValidationState::default(),
            batch_sink,
            outlier_sink,
            events,
            flush_sequence: 0,
            stats: BufferStats::default(),
        })
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity()
    }

    /// Reading waiting for classification on the next [`add`](Self::add)
    pub fn current(&self) -> &Measurement {
        &self.current
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn validation_state(&self) -> &ValidationState {
        &self.state
    }

    pub fn stats(&self) -> BufferStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.events.subscribe()
    }

    /// Up to [`RETAINED_WINDOW`] most recent entries, oldest first.
    ///
    /// Borrows the buffer; nothing is copied.
    pub fn last_elements(&self) -> impl Iterator<Item = &Measurement> + '_ {
        let skip = self.buffer.len().saturating_sub(RETAINED_WINDOW);
        self.buffer.iter().skip(skip)
    }

    /// Classify the pending reading, then make `measurement` the new pending
    /// reading. Flushes when the buffer has outgrown its capacity.
    pub fn add(&mut self, measurement: Measurement) -> Disposition {
        let pending = self.current;
        let disposition = self.classify(&pending);

        match disposition {
            Disposition::Accepted | Disposition::ForcedAccepted => {
                if disposition == Disposition::ForcedAccepted {
                    warn!(
                        "Forced accept after {} rejections: O2={:.3} CO2={:.3}",
                        self.state.consecutive_rejections, pending.o2, pending.co2
                    );
                    BufferStats::bump(&self.stats.forced_accepted, 1);
                } else {
                    BufferStats::bump(&self.stats.accepted, 1);
                }
                self.buffer.push_back(pending);
                self.state.accept(pending);
                self.emit(BufferEvent::LastElementsChanged);
            },
            Disposition::Rejected => {
                warn!(
                    "Outlier rejected: O2={:.3} CO2={:.3} (threshold {})",
                    pending.o2,
                    pending.co2,
                    self.validator.threshold()
                );
                if let Err(e) = self.outlier_sink.append(&pending) {
                    debug!("Outlier log: {}", e);
                }
                self.state.reject();
                BufferStats::bump(&self.stats.rejected, 1);
                self.emit(BufferEvent::OutlierRejected(pending));
            },
            Disposition::Discarded => {
                debug!("No reading pending, nothing buffered");
                BufferStats::bump(&self.stats.discarded, 1);
            },
        }

        self.current = measurement;
        self.emit(BufferEvent::CurrentReplaced(measurement));

        if self.buffer.len() > self.config.capacity() {
            self.flush();
        }
        disposition
    }

    fn classify(&self, pending: &Measurement) -> Disposition {
        // Sentinels never enter the buffer, not even through a forced accept
        if pending.is_sentinel() {
            return Disposition::Discarded;
        }
        match self.validator.evaluate(pending, self.buffer.back()) {
            Verdict::Valid => Disposition::Accepted,
            Verdict::Outlier if self.state.should_force() => Disposition::ForcedAccepted,
            Verdict::Outlier => Disposition::Rejected,
        }
    }

    /// Move everything but the last [`RETAINED_WINDOW`] entries to the batch
    /// sink, oldest first. Returns the batch length.
    ///
    /// A batch the sink refuses is not retried.
    pub fn flush(&mut self) -> usize {
        let excess = self.buffer.len().saturating_sub(RETAINED_WINDOW);
        if excess == 0 {
            return 0;
        }

        let batch: Vec<Measurement> = self.buffer.drain(..excess).collect();
        let flushed: Arc<[Measurement]> = Arc::from(batch.as_slice());
        self.flush_sequence += 1;
        BufferStats::bump(&self.stats.flush_count, 1);
        BufferStats::bump(&self.stats.measurements_flushed, excess as u64);
        info!("Flush #{}: {} measurements", self.flush_sequence, excess);

        if let Err(e) = self.batch_sink.submit(batch) {
            error!("Flush #{} dropped: {}", self.flush_sequence, e);
            BufferStats::bump(&self.stats.sink_errors, 1);
        }

        self.emit(BufferEvent::Flushed {
            sequence: self.flush_sequence,
            batch: flushed,
        });
        excess
    }

    fn emit(&self, event: BufferEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferManager")
            .field("config", &self.config)
            .field("current", &self.current)
            .field("len", &self.buffer.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn manager(batch_size: usize, threshold: f64) -> (BufferManager, MemorySink) {
        let sink = MemorySink::new();
        let manager = BufferManager::new(
            BufferConfig::new(batch_size, threshold),
            Arc::new(sink.clone()),
            Arc::new(sink.clone()),
        )
        .unwrap();
        (manager, sink)
    }

    fn reading(o2: f32, co2: f32) -> Measurement {
        Measurement::new(o2, co2)
    }

    #[test]
    fn test_capacity() {
        assert_eq!(BufferConfig::new(5, 0.3).capacity(), 13);
        assert_eq!(BufferConfig::new(1, 0.3).capacity(), 9);
        assert!(BufferConfig::new(0, 0.3).validate().is_err());
        assert!(BufferConfig::new(5, -1.0).validate().is_err());
    }

    #[test]
    fn test_first_add_only_installs_current() {
        let (mut manager, sink) = manager(5, 0.3);
        assert!(manager.current().is_sentinel());

        let disposition = manager.add(reading(20.0, 0.1));
        assert_eq!(disposition, Disposition::Discarded);
        assert!(manager.is_empty());
        assert_eq!(manager.current().o2, 20.0);
        assert!(sink.outliers().is_empty());
    }

    #[test]
    fn test_pending_reading_is_classified_next_cycle() {
        let (mut manager, _sink) = manager(5, 0.3);
        manager.add(reading(20.0, 0.1));
        assert_eq!(manager.add(reading(20.1, 0.1)), Disposition::Accepted);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.validation_state().last_accepted.unwrap().o2, 20.0);
    }

    #[test]
    fn test_outlier_goes_to_log() {
        let (mut manager, sink) = manager(5, 0.3);
        manager.add(reading(20.0, 0.1));
        manager.add(reading(25.0, 0.1));
        assert_eq!(manager.add(reading(20.1, 0.1)), Disposition::Rejected);

        assert_eq!(manager.len(), 1);
        assert_eq!(sink.outliers().len(), 1);
        assert_eq!(sink.outliers()[0].o2, 25.0);
        assert_eq!(manager.validation_state().consecutive_rejections, 1);
    }

    #[test]
    fn test_sentinel_not_logged_and_streak_unchanged() {
        let (mut manager, sink) = manager(5, 0.3);
        manager.add(reading(20.0, 0.1));
        assert_eq!(manager.add(Measurement::sentinel()), Disposition::Accepted);
        assert_eq!(manager.add(reading(20.0, 0.1)), Disposition::Discarded);
        assert_eq!(manager.add(reading(20.0, 0.1)), Disposition::Accepted);

        assert!(sink.outliers().is_empty());
        assert_eq!(manager.validation_state().consecutive_rejections, 0);
        assert_eq!(manager.stats().discarded, 2);
    }

    #[test]
    fn test_forced_accept_after_six_rejections() {
        let (mut manager, sink) = manager(5, 0.3);
        manager.add(reading(20.0, 0.1));
        manager.add(reading(30.0, 0.1));
        for _ in 0..6 {
            assert_eq!(manager.add(reading(30.0, 0.1)), Disposition::Rejected);
        }
        assert_eq!(manager.validation_state().consecutive_rejections, 6);

        assert_eq!(manager.add(reading(30.0, 0.1)), Disposition::ForcedAccepted);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.validation_state().consecutive_rejections, 0);
        assert_eq!(sink.outliers().len(), 6);

        // The drifted level is now the reference
        assert_eq!(manager.add(reading(30.0, 0.1)), Disposition::Accepted);
        let stats = manager.stats();
        assert_eq!(stats.forced_accepted, 1);
        assert_eq!(stats.accepted, 2);
    }

    #[test]
    fn test_flush_keeps_retained_window() {
        let (mut manager, sink) = manager(5, 0.0);
        manager.add(reading(1.0, 1.0));
        for i in 2..=14 {
            manager.add(reading(i as f32, 1.0));
        }
        // 13 buffered, pending 14.0
        assert_eq!(manager.len(), 13);
        assert!(sink.batches().is_empty());

        manager.add(reading(15.0, 1.0));
        assert_eq!(manager.len(), RETAINED_WINDOW);
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        let o2: Vec<f32> = batches[0].iter().map(|m| m.o2).collect();
        assert_eq!(o2, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(manager.last_elements().next().unwrap().o2, 6.0);
    }

    #[test]
    fn test_flush_below_window_is_noop() {
        let (mut manager, sink) = manager(5, 0.0);
        manager.add(reading(1.0, 1.0));
        manager.add(reading(2.0, 1.0));
        assert_eq!(manager.flush(), 0);
        assert!(sink.batches().is_empty());
        assert_eq!(manager.stats().flush_count, 0);
    }

    #[test]
    fn test_sink_failure_drops_batch() {
        let (mut manager, sink) = manager(1, 0.0);
        sink.set_failing(true);
        for i in 1..=11 {
            manager.add(reading(i as f32, 1.0));
        }
        assert_eq!(manager.len(), RETAINED_WINDOW);
        let stats = manager.stats();
        assert_eq!(stats.flush_count, 1);
        assert_eq!(stats.sink_errors, 1);

        sink.set_failing(false);
        manager.add(reading(12.0, 1.0));
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].o2, 2.0);
    }

    #[test]
    fn test_last_elements_view() {
        let (mut manager, _sink) = manager(5, 0.0);
        assert_eq!(manager.last_elements().count(), 0);
        for i in 1..=5 {
            manager.add(reading(i as f32, 1.0));
        }
        assert_eq!(manager.last_elements().count(), 4);

        for i in 6..=13 {
            manager.add(reading(i as f32, 1.0));
        }
        let window: Vec<f32> = manager.last_elements().map(|m| m.o2).collect();
        assert_eq!(window, vec![4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
    }
}
