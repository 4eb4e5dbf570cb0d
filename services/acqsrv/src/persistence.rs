//! Durable sinks for flushed batches and rejected readings
//!
//! [`PersistenceDispatcher`] is what the buffer sees. It queues work for a
//! single worker task, so batches reach the SQLite store and the data file in
//! flush order while the acquisition cycle never waits on disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common::SqliteClient;
use gasmon_buffer::{BatchSink, BufferError, OutlierSink};
use gasmon_model::Measurement;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::config::AcqConfig;
use crate::error::{AcqSrvError, Result};

// ============================================================================
// SQLite store
// ============================================================================

/// One row of the measurement table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredRow {
    pub id: i64,
    pub co2: f64,
    pub o2: f64,
    pub timestamp: String,
}

/// Measurement table in SQLite. Connects on first use.
pub struct MeasurementStore {
    path: PathBuf,
    table: String,
    client: Option<SqliteClient>,
    table_ready: bool,
}

impl MeasurementStore {
    /// `table` must already be a validated plain identifier
    pub fn new(path: impl Into<PathBuf>, table: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            table: table.into(),
            client: None,
            table_ready: false,
        }
    }

    pub fn with_client(client: SqliteClient, table: impl Into<String>) -> Self {
        Self {
            path: PathBuf::from(client.path()),
            table: table.into(),
            client: Some(client),
            table_ready: false,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn client(&mut self) -> Result<&SqliteClient> {
        if self.client.is_none() {
            let client = SqliteClient::new(&self.path)
                .await
                .map_err(|e| AcqSrvError::Storage(format!("{}: {}", self.path.display(), e)))?;
            self.client = Some(client);
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AcqSrvError::Internal("store connection missing".into()))?;

        if !self.table_ready {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    co2 REAL NOT NULL,
                    o2 REAL NOT NULL,
                    timestamp TEXT NOT NULL
                )",
                self.table
            ))
            .execute(client.pool())
            .await?;
            self.table_ready = true;
        }
        Ok(client)
    }

    /// Insert the whole batch in one transaction. Returns rows written.
    pub async fn insert_batch(&mut self, batch: &[Measurement]) -> Result<u64> {
        let sql = format!(
            "INSERT INTO {} (co2, o2, timestamp) VALUES (?, ?, ?)",
            self.table
        );
        let client = self.client().await?;
        let mut tx = client.pool().begin().await?;

        let mut written = 0;
        for m in batch {
            written += sqlx::query(&sql)
                .bind(f64::from(m.co2))
                .bind(f64::from(m.o2))
                .bind(m.timestamp_text())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    pub async fn fetch_all(&mut self) -> Result<Vec<StoredRow>> {
        let sql = format!(
            "SELECT id, co2, o2, timestamp FROM {} ORDER BY id",
            self.table
        );
        let client = self.client().await?;
        let rows = sqlx::query_as::<_, StoredRow>(&sql)
            .fetch_all(client.pool())
            .await?;
        Ok(rows)
    }
}

// ============================================================================
// Text files
// ============================================================================

/// Append-only ASCII record file, one measurement per line
#[derive(Debug, Clone)]
pub struct RecordFile {
    path: PathBuf,
}

impl RecordFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, records: &[Measurement]) -> std::io::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut text = String::with_capacity(records.len() * 40);
        for m in records {
            text.push_str(&m.record_line());
            text.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Debug, Default)]
pub struct PersistenceStats {
    pub batches_stored: AtomicU64,
    pub rows_stored: AtomicU64,
    pub store_errors: AtomicU64,
    pub file_errors: AtomicU64,
    pub outliers_logged: AtomicU64,
}

impl PersistenceStats {
    pub fn snapshot(&self) -> PersistenceStatsSnapshot {
        PersistenceStatsSnapshot {
            batches_stored: self.batches_stored.load(Ordering::Relaxed),
            rows_stored: self.rows_stored.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            file_errors: self.file_errors.load(Ordering::Relaxed),
            outliers_logged: self.outliers_logged.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistenceStatsSnapshot {
    pub batches_stored: u64,
    pub rows_stored: u64,
    pub store_errors: u64,
    pub file_errors: u64,
    pub outliers_logged: u64,
}

enum Job {
    Batch(Vec<Measurement>),
    Outlier(Measurement),
    Shutdown(oneshot::Sender<()>),
}

/// Queue in front of the store, the data file and the outlier log.
///
/// Failed batches are reported through [`take_error`](Self::take_error) and
/// are not retried.
pub struct PersistenceDispatcher {
    tx: mpsc::UnboundedSender<Job>,
    last_error: Arc<Mutex<Option<String>>>,
    stats: Arc<PersistenceStats>,
}

impl PersistenceDispatcher {
    /// Start the worker. Needs a running tokio runtime.
    pub fn spawn(
        store: MeasurementStore,
        data_file: RecordFile,
        trim_file: RecordFile,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let last_error = Arc::new(Mutex::new(None));
        let stats = Arc::new(PersistenceStats::default());

        let worker = PersistenceWorker {
            store,
            data_file,
            trim_file,
            last_error: Arc::clone(&last_error),
            stats: Arc::clone(&stats),
        };
        tokio::spawn(worker.run(rx));

        Self {
            tx,
            last_error,
            stats,
        }
    }

    pub fn from_config(config: &AcqConfig) -> Self {
        Self::spawn(
            MeasurementStore::new(&config.storage.database, &config.storage.table),
            RecordFile::new(&config.storage.data_file),
            RecordFile::new(&config.storage.trim_file),
        )
    }

    /// Most recent failure since the last call, if any
    pub fn take_error(&self) -> Option<String> {
        self.last_error.lock().take()
    }

    pub fn stats(&self) -> PersistenceStatsSnapshot {
        self.stats.snapshot()
    }

    /// Wait until every job queued so far is done, then stop the worker
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Job::Shutdown(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

impl BatchSink for PersistenceDispatcher {
    fn submit(&self, batch: Vec<Measurement>) -> gasmon_buffer::Result<()> {
        self.tx
            .send(Job::Batch(batch))
            .map_err(|_| BufferError::SinkClosed)
    }
}

impl OutlierSink for PersistenceDispatcher {
    fn append(&self, measurement: &Measurement) -> gasmon_buffer::Result<()> {
        self.tx
            .send(Job::Outlier(*measurement))
            .map_err(|_| BufferError::SinkClosed)
    }
}

struct PersistenceWorker {
    store: MeasurementStore,
    data_file: RecordFile,
    trim_file: RecordFile,
    last_error: Arc<Mutex<Option<String>>>,
    stats: Arc<PersistenceStats>,
}

impl PersistenceWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job>) {
        debug!("Persistence worker started");
        while let Some(job) = rx.recv().await {
            match job {
                Job::Batch(batch) => self.store_batch(batch).await,
                Job::Outlier(m) => {
                    // Best effort
                    match self.trim_file.append(&[m]).await {
                        Ok(()) => {
                            self.stats.outliers_logged.fetch_add(1, Ordering::Relaxed);
                        },
                        Err(e) => debug!("Outlier log {}: {}", self.trim_file.path().display(), e),
                    }
                },
                Job::Shutdown(ack) => {
                    info!("Persistence worker stopped");
                    let _ = ack.send(());
                    return;
                },
            }
        }
        debug!("Persistence queue closed");
    }

    /// Store and file are written independently; one failing does not skip
    /// the other.
    async fn store_batch(&mut self, batch: Vec<Measurement>) {
        match self.store.insert_batch(&batch).await {
            Ok(rows) => {
                self.stats.batches_stored.fetch_add(1, Ordering::Relaxed);
                self.stats.rows_stored.fetch_add(rows, Ordering::Relaxed);
                debug!("Stored {} rows in {}", rows, self.store.table());
            },
            Err(e) => {
                self.stats.store_errors.fetch_add(1, Ordering::Relaxed);
                self.fail(format!("Batch of {} not stored: {}", batch.len(), e));
            },
        }

        if let Err(e) = self.data_file.append(&batch).await {
            self.stats.file_errors.fetch_add(1, Ordering::Relaxed);
            self.fail(format!(
                "Batch of {} not written to {}: {}",
                batch.len(),
                self.data_file.path().display(),
                e
            ));
        }
    }

    fn fail(&self, message: String) {
        error!("{}", message);
        *self.last_error.lock() = Some(message);
    }
}
