//! Shared service plumbing for gasmon
//!
//! - logging bootstrap
//! - layered configuration loading
//! - graceful shutdown
//! - SQLite connection handling

pub mod config_loader;
pub mod logging;
pub mod shutdown;
pub mod sqlite;

pub use config_loader::{load_layered, save_yaml};
pub use shutdown::{shutdown_token, wait_for_shutdown};
pub use sqlite::{SqliteClient, SqlitePool};
