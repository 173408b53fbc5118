//! Query Facade: the single entry point of the presentation layer
//!
//! ## Flow
//!
//! ```text
//! QueryRequest ─→ metric names per run (cached) ─→ filter ─→ group
//!              ─→ per metric: Fingerprint ─→ SeriesCache ─┬─ hit ─→ bundle
//!                                                        └─ miss ─→ raw points (cached) ─→ transform
//!              ─→ QueryResult { groups, colors, warnings }
//! ```
//!
//! Store failures never fail a query. They become [`QueryWarning`]s and the
//! affected run or metric is left out of the result.
//!
//! [`Explorer::query_system`] answers the same request over the runs' system
//! samples, grouped by hardware category instead of metric prefix.

mod explorer;

pub use explorer::Explorer;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::grouping::{MetricGroup, SystemGroup};
use crate::transform::{Series, SeriesOptions};
use crate::Error;

/// Everything the presentation layer controls for one plot refresh.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Project name
    pub project: String,
    /// Selected runs, in selection order
    pub run_ids: Vec<String>,
    /// Case-insensitive substring filter on metric names
    pub metric_filter: String,
    /// Axis, smoothing and scale options
    pub options: SeriesOptions,
}

impl QueryRequest {
    /// Request every metric of `run_ids` with default options.
    #[must_use]
    pub fn new<S: AsRef<str>>(project: impl Into<String>, run_ids: &[S]) -> Self {
        Self {
            project: project.into(),
            run_ids: run_ids.iter().map(|id| id.as_ref().to_string()).collect(),
            metric_filter: String::new(),
            options: SeriesOptions::default(),
        }
    }

    /// Set the metric filter.
    #[must_use]
    pub fn metric_filter(mut self, pattern: impl Into<String>) -> Self {
        self.metric_filter = pattern.into();
        self
    }

    /// Set the series options.
    #[must_use]
    pub const fn options(mut self, options: SeriesOptions) -> Self {
        self.options = options;
        self
    }
}

/// Identity of one plotted line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Run id
    pub run_id: String,
    /// Metric name
    pub metric: String,
}

impl SeriesKey {
    /// Create a key.
    #[must_use]
    pub fn new(run_id: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            metric: metric.into(),
        }
    }
}

/// Category of a non-fatal query problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// Project database missing: show "no data"
    StoreNotFound,
    /// Rows could not be read: show an error state for the affected series
    StoreCorrupt,
    /// Anything else (lock contention, task failure)
    Internal,
}

/// A store error converted into a partial-result annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryWarning {
    /// Category
    pub kind: WarningKind,
    /// Project the failure happened in
    pub project: String,
    /// Run affected, if the failure was run-scoped
    pub run_id: Option<String>,
    /// Metric affected, if the failure was metric-scoped
    pub metric: Option<String>,
    /// Human-readable description
    pub message: String,
}

impl QueryWarning {
    /// Describe `err` in the context it occurred in.
    #[must_use]
    pub fn from_error(err: &Error, project: &str, run_id: Option<&str>, metric: Option<&str>) -> Self {
        let kind = match err {
            Error::StoreNotFound { .. } => WarningKind::StoreNotFound,
            Error::StoreCorrupt { .. } => WarningKind::StoreCorrupt,
            _ => WarningKind::Internal,
        };
        Self {
            kind,
            project: project.to_string(),
            run_id: run_id.map(str::to_string),
            metric: metric.map(str::to_string),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for QueryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.run_id, &self.metric) {
            (Some(run), Some(metric)) => write!(f, "[{run} / {metric}] {}", self.message),
            (Some(run), None) => write!(f, "[{run}] {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Plotted series by group.
pub type GroupedSeries<G = MetricGroup> = BTreeMap<G, BTreeMap<SeriesKey, Arc<Series>>>;

/// Render-ready answer to a [`QueryRequest`].
///
/// `G` is [`MetricGroup`] for training metrics and [`SystemGroup`] for
/// system metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<G = MetricGroup> {
    /// Series grouped by metric prefix or hardware category
    pub groups: GroupedSeries<G>,
    /// Color of every selected run
    pub colors: BTreeMap<String, Color>,
    /// Problems that removed runs or metrics from the result
    pub warnings: Vec<QueryWarning>,
}

/// Answer to [`Explorer::query_system`].
pub type SystemQueryResult = QueryResult<SystemGroup>;

impl<G> Default for QueryResult<G> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
            colors: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }
}

impl<G: Ord> QueryResult<G> {
    /// True when there is nothing to plot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(BTreeMap::is_empty)
    }

    /// Number of plotted series across all groups.
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    /// Series of one (run, metric), if present.
    #[must_use]
    pub fn get(&self, run_id: &str, metric: &str) -> Option<&Arc<Series>> {
        let key = SeriesKey::new(run_id, metric);
        self.groups.values().find_map(|series| series.get(&key))
    }

    /// Distinct metric names in the result, sorted.
    #[must_use]
    pub fn metric_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .groups
            .values()
            .flat_map(BTreeMap::keys)
            .map(|key| key.metric.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// True when the project database was missing.
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        self.warnings
            .iter()
            .any(|warning| warning.kind == WarningKind::StoreNotFound)
    }
}
