//! RTU master error types
//!
//! `Display` of every variant is the status string shown to the operator.

use errors::{ErrorCategory, GasmonErrorTrait};
use thiserror::Error;

/// Result type for gasmon-rtu operations
pub type Result<T> = std::result::Result<T, RtuError>;

/// Transport and protocol failures of the RTU master
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RtuError {
    // ======================================
    // Transport
    // ======================================
    /// An operation was attempted while the port is closed
    #[error("Serial port not open")]
    PortNotOpen,

    #[error("{port} already opened")]
    AlreadyOpen { port: String },

    #[error("{port} is not open")]
    NotOpen { port: String },

    #[error("Error opening {port}: {reason}")]
    Open { port: String, reason: String },

    /// No byte arrived within the per-byte deadline
    #[error("Error in read event: timed out after {received} of {expected} bytes")]
    Timeout { received: usize, expected: usize },

    #[error("Error in write event: timed out")]
    WriteTimeout,

    /// The request could not be written to the line
    #[error("Error in write event: {0}")]
    WriteIo(String),

    #[error("Error in read event: {0}")]
    Io(String),

    // ======================================
    // Protocol
    // ======================================
    #[error("CRC error")]
    Crc,

    #[error("Byte count mismatch: expected {expected}, got {actual}")]
    ByteCount { expected: u8, actual: u8 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported function code: {0}")]
    UnsupportedFunction(u8),
}

impl RtuError {
    /// Operator-facing status line
    pub fn status(&self) -> String {
        self.to_string()
    }
}

impl From<std::io::Error> for RtuError {
    fn from(err: std::io::Error) -> Self {
        RtuError::Io(err.to_string())
    }
}

impl GasmonErrorTrait for RtuError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::PortNotOpen => "PORT_NOT_OPEN",
            Self::AlreadyOpen { .. } => "PORT_ALREADY_OPEN",
            Self::NotOpen { .. } => "PORT_NOT_OPEN",
            Self::Open { .. } => "PORT_OPEN_FAILED",
            Self::Timeout { .. } | Self::WriteTimeout => "RTU_TIMEOUT",
            Self::Io(_) | Self::WriteIo(_) => "RTU_IO_ERROR",
            Self::Crc => "RTU_CRC_ERROR",
            Self::ByteCount { .. } => "RTU_BYTE_COUNT_MISMATCH",
            Self::InvalidRequest(_) => "RTU_INVALID_REQUEST",
            Self::UnsupportedFunction(_) => "RTU_UNSUPPORTED_FUNCTION",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout { .. } | Self::WriteTimeout => ErrorCategory::Timeout,
            Self::PortNotOpen
            | Self::NotOpen { .. }
            | Self::Open { .. }
            | Self::Io(_)
            | Self::WriteIo(_) => ErrorCategory::Connection,
            Self::AlreadyOpen { .. } => ErrorCategory::ResourceBusy,
            Self::Crc | Self::ByteCount { .. } => ErrorCategory::Protocol,
            Self::InvalidRequest(_) | Self::UnsupportedFunction(_) => ErrorCategory::Validation,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(RtuError::PortNotOpen.status(), "Serial port not open");
        assert_eq!(RtuError::Crc.status(), "CRC error");
        assert_eq!(
            RtuError::AlreadyOpen {
                port: "/dev/ttyUSB0".into()
            }
            .status(),
            "/dev/ttyUSB0 already opened"
        );
        assert_eq!(
            RtuError::Io("broken pipe".into()).status(),
            "Error in read event: broken pipe"
        );
    }

    #[test]
    fn test_write_side_status_strings() {
        assert_eq!(
            RtuError::WriteIo("broken pipe".into()).status(),
            "Error in write event: broken pipe"
        );
        assert_eq!(
            RtuError::WriteTimeout.status(),
            "Error in write event: timed out"
        );
        assert_eq!(
            RtuError::WriteIo("broken pipe".into()).category(),
            ErrorCategory::Connection
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            RtuError::Timeout {
                received: 3,
                expected: 9
            }
            .category(),
            ErrorCategory::Timeout
        );
        assert_eq!(RtuError::Crc.category(), ErrorCategory::Protocol);
        assert!(!RtuError::Crc.is_retryable());
    }
}
