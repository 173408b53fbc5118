//! Run Record - one experiment execution inside a project

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run Record represents a single experiment execution.
///
/// Each project database can hold many runs. The run's `start_time` is the
/// origin of the relative-time axis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    run_id: String,
    project: String,
    start_time: Option<f64>,
    config: Option<serde_json::Value>,
}

impl RunRecord {
    /// Create a new run record with no start time or config.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Unique identifier for the run within its project
    /// * `project` - Name of the owning project
    #[must_use]
    pub fn new(run_id: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            project: project.into(),
            start_time: None,
            config: None,
        }
    }

    /// Create a builder for constructing a run record with optional fields.
    #[must_use]
    pub fn builder(run_id: impl Into<String>, project: impl Into<String>) -> RunRecordBuilder {
        RunRecordBuilder::new(run_id, project)
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the owning project name.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Get the start time in seconds since the Unix epoch, if recorded.
    #[must_use]
    pub const fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// Get the start time as a UTC timestamp, if recorded and representable.
    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start_time.and_then(epoch_seconds_to_utc)
    }

    /// Get the run configuration (hyper-parameters), if any.
    #[must_use]
    pub const fn config(&self) -> Option<&serde_json::Value> {
        self.config.as_ref()
    }
}

/// Convert fractional seconds since the epoch into a UTC timestamp.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn epoch_seconds_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Builder for `RunRecord`.
#[derive(Debug)]
pub struct RunRecordBuilder {
    run_id: String,
    project: String,
    start_time: Option<f64>,
    config: Option<serde_json::Value>,
}

impl RunRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(run_id: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            project: project.into(),
            start_time: None,
            config: None,
        }
    }

    /// Set the start time in seconds since the Unix epoch.
    #[must_use]
    pub const fn start_time(mut self, seconds: f64) -> Self {
        self.start_time = Some(seconds);
        self
    }

    /// Set the run configuration.
    #[must_use]
    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the `RunRecord`.
    #[must_use]
    pub fn build(self) -> RunRecord {
        RunRecord {
            run_id: self.run_id,
            project: self.project,
            start_time: self.start_time,
            config: self.config,
        }
    }
}
