//! Outlier classification against the last accepted reading

use serde::{Deserialize, Serialize};

use crate::measurement::Measurement;

/// Thresholds below this disable trimming
pub const MIN_THRESHOLD: f64 = 0.01;

/// Rejections tolerated before the pending reading is accepted anyway
pub const FORCED_ACCEPT_AFTER: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    Outlier,
}

/// Delta-threshold validator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validator {
    threshold: f64,
}

impl Validator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Trimming rate is a percentage; 30 means a delta of 0.3
    pub fn from_trim_rate(rate: u32) -> Self {
        Self::new(f64::from(rate) / 100.0)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_enabled(&self) -> bool {
        self.threshold >= MIN_THRESHOLD
    }

    /// Classify `current` against the last accepted reading.
    ///
    /// The sentinel is always an outlier. Otherwise a reading is valid when
    /// there is no history, trimming is disabled, or both channel deltas stay
    /// strictly below the threshold.
    pub fn evaluate(&self, current: &Measurement, last: Option<&Measurement>) -> Verdict {
        if current.is_sentinel() {
            return Verdict::Outlier;
        }
        let Some(last) = last else {
            return Verdict::Valid;
        };
        if !self.is_enabled() {
            return Verdict::Valid;
        }

        let d_o2 = (f64::from(current.o2) - f64::from(last.o2)).abs();
        let d_co2 = (f64::from(current.co2) - f64::from(last.co2)).abs();
        if d_o2 < self.threshold && d_co2 < self.threshold {
            Verdict::Valid
        } else {
            Verdict::Outlier
        }
    }
}

/// Rejection streak bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationState {
    pub last_accepted: Option<Measurement>,
    pub consecutive_rejections: u32,
}

impl ValidationState {
    pub fn accept(&mut self, measurement: Measurement) {
        self.last_accepted = Some(measurement);
        self.consecutive_rejections = 0;
    }

    pub fn reject(&mut self) {
        self.consecutive_rejections = self.consecutive_rejections.saturating_add(1);
    }

    /// True once the streak has gone past [`FORCED_ACCEPT_AFTER`]
    pub fn should_force(&self) -> bool {
        self.consecutive_rejections > FORCED_ACCEPT_AFTER
    }
}
