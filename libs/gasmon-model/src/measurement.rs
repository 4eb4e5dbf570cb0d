//! Two-channel measurement (O2, CO2) with acquisition time

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Timestamp layout used by the data file, the outlier log and the store
pub const RECORD_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One reading. Zero on both channels is the "no reading" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub o2: f32,
    pub co2: f32,
    pub timestamp: DateTime<Local>,
}

impl Measurement {
    /// Reading taken now
    pub fn new(o2: f32, co2: f32) -> Self {
        Self::at(o2, co2, Local::now())
    }

    pub fn at(o2: f32, co2: f32, timestamp: DateTime<Local>) -> Self {
        Self { o2, co2, timestamp }
    }

    /// "No reading obtained" marker, stamped now
    pub fn sentinel() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn is_sentinel(&self) -> bool {
        self.o2 == 0.0 && self.co2 == 0.0
    }

    /// `yyyy-MM-dd HH:mm:ss`
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(RECORD_TIMESTAMP_FORMAT).to_string()
    }

    /// Text-file record: `yyyy-MM-dd HH:mm:ss, <co2>, <o2>` with three decimals
    pub fn record_line(&self) -> String {
        format!("{}, {:.3}, {:.3}", self.timestamp_text(), self.co2, self.o2)
    }
}

/// Interpret two consecutive registers as an IEEE-754 float, high word first.
///
/// Returns `None` unless exactly four bytes are given.
pub fn decode_register_f32(bytes: &[u8]) -> Option<f32> {
    let raw: [u8; 4] = bytes.try_into().ok()?;
    Some(f32::from_be_bytes(raw))
}
