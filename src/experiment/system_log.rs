//! System Log - one hardware sample of a run (CPU, memory, GPU, ...)

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::data_point::DataPoint;
use super::run_record::epoch_seconds_to_utc;

/// Keys of a logged sample that describe when it was taken, not what.
pub const SYSTEM_LOG_TIME_KEYS: [&str; 3] = ["timestamp", "step", "wall_time"];

/// One sample of system metrics, all taken at the same instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemLog {
    step: i64,
    wall_time: f64,
    values: BTreeMap<String, f64>,
}

impl SystemLog {
    /// Create an empty sample; `step` is 0 for loggers that do not track one.
    #[must_use]
    pub const fn new(step: i64, wall_time: f64) -> Self {
        Self {
            step,
            wall_time,
            values: BTreeMap::new(),
        }
    }

    /// Add one reading. Time keys are ignored.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        let name = name.into();
        if !SYSTEM_LOG_TIME_KEYS.contains(&name.as_str()) {
            self.values.insert(name, value);
        }
        self
    }

    /// Build a sample from a logged JSON object.
    ///
    /// Numeric entries become readings; other entries are skipped. Returns
    /// `None` when `payload` is not an object.
    #[must_use]
    pub fn from_json(step: i64, wall_time: f64, payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        Some(
            object
                .iter()
                .filter_map(|(name, value)| value.as_f64().map(|value| (name, value)))
                .fold(Self::new(step, wall_time), |log, (name, value)| {
                    log.with_value(name.as_str(), value)
                }),
        )
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

    /// Get the wall-clock time as a UTC timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        epoch_seconds_to_utc(self.wall_time)
    }

    /// Reading of `name`, if the sample has one.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// All readings by name.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    /// The reading of `name` as a metric point.
    #[must_use]
    pub fn point(&self, name: &str) -> Option<DataPoint> {
        self.value(name)
            .map(|value| DataPoint::new(self.step, self.wall_time, value))
    }
}

/// Names read by at least one sample.
pub fn system_metric_names<'a>(logs: impl IntoIterator<Item = &'a SystemLog>) -> BTreeSet<String> {
    logs.into_iter()
        .flat_map(|log| log.values.keys().cloned())
        .collect()
}

/// Time series of one system metric, in sample order.
#[must_use]
pub fn system_points(logs: &[SystemLog], name: &str) -> Vec<DataPoint> {
    logs.iter().filter_map(|log| log.point(name)).collect()
}
