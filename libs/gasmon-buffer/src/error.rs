//! Buffer error types

use errors::{ErrorCategory, GasmonErrorTrait};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BufferError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Invalid buffer configuration: {0}")]
    InvalidConfig(String),

    /// The sink's worker is gone; nothing more can be delivered
    #[error("Sink closed")]
    SinkClosed,

    #[error("Sink error: {0}")]
    Sink(String),
}

impl GasmonErrorTrait for BufferError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "BUFFER_INVALID_CONFIG",
            Self::SinkClosed => "BUFFER_SINK_CLOSED",
            Self::Sink(_) => "BUFFER_SINK_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfig(_) => ErrorCategory::Configuration,
            Self::SinkClosed => ErrorCategory::Internal,
            Self::Sink(_) => ErrorCategory::Database,
        }
    }
}
