//! Periodic acquisition loop
//!
//! Each tick runs one cycle to completion (poll, evaluate, buffer, maybe
//! flush) before the next tick is considered. Ticks missed while a cycle was
//! still busy are skipped, never queued.

use std::sync::Arc;
use std::time::Duration;

use gasmon_buffer::{BufferEvent, BufferManager, BufferStatsSnapshot, Disposition};
use gasmon_rtu::LinkFactory;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::acquirer::MeasurementAcquirer;
use crate::config::AcqConfig;
use crate::error::Result;
use crate::persistence::{PersistenceDispatcher, PersistenceStatsSnapshot};

pub struct AcquisitionService {
    acquirer: MeasurementAcquirer,
    buffer: BufferManager,
    dispatcher: Arc<PersistenceDispatcher>,
    interval: Duration,
    cycles: u64,
}

impl AcquisitionService {
    pub fn new(
        acquirer: MeasurementAcquirer,
        buffer: BufferManager,
        dispatcher: Arc<PersistenceDispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            acquirer,
            buffer,
            dispatcher,
            interval,
            cycles: 0,
        }
    }

    /// Wire the acquirer, buffer and persistence from one configuration.
    /// Needs a running tokio runtime for the persistence worker.
    pub fn from_config(config: &AcqConfig, factory: Arc<dyn LinkFactory>) -> Result<Self> {
        let dispatcher = Arc::new(PersistenceDispatcher::from_config(config));
        let buffer = BufferManager::new(
            config.buffer_config(),
            dispatcher.clone(),
            dispatcher.clone(),
        )?;

        Ok(Self::new(
            MeasurementAcquirer::from_config(config, factory),
            buffer,
            dispatcher,
            Duration::from_secs(config.modbus.interval_secs),
        ))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.buffer.subscribe()
    }

    pub fn buffer(&self) -> &BufferManager {
        &self.buffer
    }

    pub fn buffer_stats(&self) -> BufferStatsSnapshot {
        self.buffer.stats()
    }

    pub fn persistence_stats(&self) -> PersistenceStatsSnapshot {
        self.dispatcher.stats()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// One acquisition cycle
    pub async fn run_cycle(&mut self) -> Disposition {
        self.cycles += 1;
        let measurement = self.acquirer.poll().await;
        let disposition = self.buffer.add(measurement);
        debug!(
            "Cycle {}: {:?}, buffered {}",
            self.cycles,
            disposition,
            self.buffer.len()
        );

        self.report_persistence_error();
        disposition
    }

    /// Persistence failures are reported once, then cleared
    fn report_persistence_error(&self) {
        if let Some(message) = self.dispatcher.take_error() {
            error!("Persistence: {}", message);
        }
    }

    /// Wait for queued batches to land. Readings still buffered are dropped.
    pub async fn shutdown(&mut self) {
        self.dispatcher.shutdown().await;
        self.report_persistence_error();
        info!(
            "Acquisition stopped after {} cycles ({} measurements left unflushed)",
            self.cycles,
            self.buffer.len()
        );
    }

    /// Run cycles until `token` is cancelled, then drain queued batches
    pub async fn run(&mut self, token: CancellationToken) {
        info!(
            "Acquisition started: every {:?}, {:?}",
            self.interval, self.acquirer
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_cycle().await;
                },
            }
        }

        self.shutdown().await;
    }
}

impl std::fmt::Debug for AcquisitionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionService")
            .field("acquirer", &self.acquirer)
            .field("interval", &self.interval)
            .field("cycles", &self.cycles)
            .finish()
    }
}
