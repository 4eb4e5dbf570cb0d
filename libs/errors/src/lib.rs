//! Unified error handling for gasmon crates
//!
//! Library crates keep their own domain error enums (`RtuError`, `BufferError`,
//! `AcqSrvError`) and expose a common face through [`GasmonErrorTrait`].
//! [`GasmonError`] is the catch-all used by binaries and glue code.

use thiserror::Error;

// ============================================================================
// GasmonError - Main error type
// ============================================================================

/// Main error type shared by gasmon services
#[derive(Debug, Error)]
pub enum GasmonError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    // ======================================
    // Database Errors
    // ======================================
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // ======================================
    // Catch-all for other errors
    // ======================================
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using GasmonError
pub type GasmonResult<T> = Result<T, GasmonError>;

impl From<serde_yaml::Error> for GasmonError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl GasmonErrorTrait for GasmonError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::InvalidConfig { .. } => ErrorCategory::Configuration,

            Self::Database(_) | Self::Sqlite(_) => ErrorCategory::Database,

            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => ErrorCategory::Internal,

            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}

// ============================================================================
// Error trait - Architectural layer
// ============================================================================

/// Error category enum - used for classification and log routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Database,
    Timeout,

    // Serial line / protocol layer
    Connection,
    Protocol,

    // Request layer
    Validation,

    // System level
    Internal,
    ResourceBusy,

    Unknown,
}

/// Error capability trait
///
/// Each crate keeps its own domain error type and gains a common interface by
/// implementing this trait. Only `error_code` and `category` are required.
pub trait GasmonErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs and operator display)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether a later attempt may succeed.
    ///
    /// Nothing in the acquisition path retries on its own; the flag only
    /// informs the caller.
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Timeout | ErrorCategory::Connection | ErrorCategory::ResourceBusy
        )
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Database => Level::ERROR,
            ErrorCategory::Timeout | ErrorCategory::Connection | ErrorCategory::Protocol => {
                Level::WARN
            },
            ErrorCategory::Validation => Level::INFO,
            _ => Level::WARN,
        }
    }
}

/// Emit `err` through `tracing` at the level its category asks for.
pub fn log_error<E: GasmonErrorTrait>(context: &str, err: &E) {
    match err.log_level() {
        tracing::Level::ERROR => tracing::error!("{}: [{}] {}", context, err.error_code(), err),
        tracing::Level::WARN => tracing::warn!("{}: [{}] {}", context, err.error_code(), err),
        tracing::Level::INFO => tracing::info!("{}: [{}] {}", context, err.error_code(), err),
        _ => tracing::debug!("{}: [{}] {}", context, err.error_code(), err),
    }
}

// Tests
#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(!GasmonError::Configuration("bad".into()).is_retryable());
        assert!(!GasmonError::Database("locked".into()).is_retryable());
    }

    #[test]
    fn test_error_categories() {
        let err = GasmonError::InvalidConfig {
            field: "modbus.slave".into(),
            reason: "must be in 1..=247".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.error_code(), "INVALID_CONFIG");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: modbus.slave: must be in 1..=247"
        );
        assert_eq!(err.log_level(), tracing::Level::WARN);
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: GasmonError = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");
        assert_eq!(err.log_level(), tracing::Level::ERROR);
    }
}
