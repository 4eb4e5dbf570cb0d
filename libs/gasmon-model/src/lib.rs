//! Measurement model for the two-channel gas analyzer
//!
//! Pure data and validation logic. No I/O.

pub mod measurement;
pub mod validation;

pub use measurement::{decode_register_f32, Measurement, RECORD_TIMESTAMP_FORMAT};
pub use validation::{ValidationState, Validator, Verdict, FORCED_ACCEPT_AFTER, MIN_THRESHOLD};
