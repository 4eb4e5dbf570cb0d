//! Gas analyzer acquisition service
//!
//! Polls the CO2 and O2 channels of one Modbus RTU analyzer on a fixed
//! interval, trims outliers, and batches accepted readings into SQLite and
//! an append-only text file.

pub mod acquirer;
pub mod bootstrap;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod persistence;
pub mod service;

pub use acquirer::MeasurementAcquirer;
pub use config::AcqConfig;
pub use error::{AcqSrvError, Result};
pub use persistence::{MeasurementStore, PersistenceDispatcher, RecordFile};
pub use service::AcquisitionService;
