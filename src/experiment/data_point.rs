//! Data Point - one logged sample of a metric

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::run_record::epoch_seconds_to_utc;

/// Data Point represents a single logged metric value.
///
/// Within one (run, metric) series, steps are unique and non-decreasing in
/// storage order, and `wall_time` is non-decreasing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DataPoint {
    step: i64,
    wall_time: f64,
    value: f64,
}

impl DataPoint {
    /// Create a new data point.
    ///
    /// # Arguments
    ///
    /// * `step` - Training step
    /// * `wall_time` - Seconds since the Unix epoch when the value was logged
    /// * `value` - Metric value
    #[must_use]
    pub const fn new(step: i64, wall_time: f64, value: f64) -> Self {
        Self {
            step,
            wall_time,
            value,
        }
    }

    /// Get the step number.
    #[must_use]
    pub const fn step(&self) -> i64 {
        self.step
    }

    /// Get the wall-clock time in seconds since the Unix epoch.
    #[must_use]
    pub const fn wall_time(&self) -> f64 {
        self.wall_time
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the wall-clock time as a UTC timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        epoch_seconds_to_utc(self.wall_time)
    }
}
