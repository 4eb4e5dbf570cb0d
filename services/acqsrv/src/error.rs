//! Error handling for the acquisition service

use errors::{ErrorCategory, GasmonError, GasmonErrorTrait};
use gasmon_buffer::BufferError;
use gasmon_rtu::RtuError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcqSrvError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serial or protocol failure from the RTU master
    #[error(transparent)]
    Rtu(#[from] RtuError),

    /// A register read returned the wrong number of bytes
    #[error("Unexpected response length: expected {expected} bytes, got {actual}")]
    ResponseLength { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AcqSrvError>;

impl From<sqlx::Error> for AcqSrvError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<GasmonError> for AcqSrvError {
    fn from(err: GasmonError) -> Self {
        match err {
            GasmonError::Configuration(msg) => Self::Config(msg),
            GasmonError::InvalidConfig { field, reason } => {
                Self::Config(format!("{}: {}", field, reason))
            },
            GasmonError::Io(e) => Self::Io(e),
            GasmonError::Sqlite(e) => Self::Storage(e.to_string()),
            GasmonError::Database(msg) => Self::Storage(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl GasmonErrorTrait for AcqSrvError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "ACQ_CONFIG_ERROR",
            Self::Rtu(e) => e.error_code(),
            Self::ResponseLength { .. } => "ACQ_RESPONSE_LENGTH",
            Self::Storage(_) => "ACQ_STORAGE_ERROR",
            Self::Io(_) => "ACQ_IO_ERROR",
            Self::Buffer(e) => e.error_code(),
            Self::Internal(_) => "ACQ_INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Rtu(e) => e.category(),
            Self::ResponseLength { .. } => ErrorCategory::Protocol,
            Self::Storage(_) => ErrorCategory::Database,
            Self::Io(_) | Self::Internal(_) => ErrorCategory::Internal,
            Self::Buffer(e) => e.category(),
        }
    }
}
