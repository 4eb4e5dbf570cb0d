//! Modbus RTU master for a single slave on a half-duplex serial line
//!
//! ```text
//! gasmon-rtu
//!     ├── frame      (request encoding, CRC16, response checks)
//!     ├── link       (SerialLink / LinkFactory seam, tokio-serial backend)
//!     ├── transport  (open/close lifecycle, one fixed-timeout exchange)
//!     ├── master     (FC02, FC03, FC04, FC08, FC16)
//!     └── simulator  (in-memory slave used by tests and bench setups)
//! ```
//!
//! The master never retries. Every failure is returned as an [`RtuError`]
//! whose `Display` text is the operator-facing status string.

pub mod constants;
pub mod error;
pub mod frame;
pub mod link;
pub mod master;
pub mod simulator;
pub mod transport;

pub use constants::FunctionCode;
pub use error::{Result, RtuError};
pub use frame::Frame;
pub use link::{LinkFactory, Parity, SerialLink, SerialPortFactory, SerialSettings};
pub use master::{ModbusMaster, Session};
pub use simulator::{Fault, RtuSlaveSimulator};
pub use transport::Transport;
