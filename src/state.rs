//! Presentation-layer view state.
//!
//! Selection and chart configuration that the presentation layer edits and
//! turns into a [`QueryRequest`]. Run selection keeps the order in which
//! runs were picked, which is the order colors are assigned in.

use serde::{Deserialize, Serialize};

use crate::experiment::RunRecord;
use crate::grouping::matches_filter;
use crate::query::QueryRequest;
use crate::transform::{AxisMode, SeriesOptions, SmoothingLevel};

/// Current project, run selection, filters and chart options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    project: Option<String>,
    selected_runs: Vec<String>,
    current_run: Option<String>,
    run_filter: String,
    metric_filter: String,
    options: SeriesOptions,
}

impl ViewState {
    /// Create an empty view with default chart options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty view starting from `options`.
    #[must_use]
    pub fn with_options(options: SeriesOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Get the current project.
    #[must_use]
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Switch project.
    ///
    /// Moving to a different project clears the run selection, the current
    /// run and both filters. Chart options are kept.
    pub fn set_project(&mut self, project: impl Into<String>) {
        let project = project.into();
        if self.project.as_deref() == Some(project.as_str()) {
            return;
        }
        self.project = Some(project);
        self.selected_runs.clear();
        self.current_run = None;
        self.run_filter.clear();
        self.metric_filter.clear();
    }

    /// Get the selected runs in selection order.
    #[must_use]
    pub fn selected_runs(&self) -> &[String] {
        &self.selected_runs
    }

    /// Check whether `run_id` is selected.
    #[must_use]
    pub fn is_selected(&self, run_id: &str) -> bool {
        self.selected_runs.iter().any(|id| id == run_id)
    }

    /// Select `run_id` if unselected, otherwise unselect it.
    ///
    /// Returns whether the run is selected afterwards.
    pub fn toggle_run(&mut self, run_id: &str) -> bool {
        if let Some(index) = self.selected_runs.iter().position(|id| id == run_id) {
            self.selected_runs.remove(index);
            false
        } else {
            self.selected_runs.push(run_id.to_string());
            true
        }
    }

    /// Select every run in `runs` not already selected, keeping existing order.
    pub fn select_all<S: AsRef<str>>(&mut self, runs: &[S]) {
        for run_id in runs {
            if !self.is_selected(run_id.as_ref()) {
                self.selected_runs.push(run_id.as_ref().to_string());
            }
        }
    }

    /// Unselect every run.
    pub fn clear_selection(&mut self) {
        self.selected_runs.clear();
    }

    /// Get the run focused for single-run views.
    #[must_use]
    pub fn current_run(&self) -> Option<&str> {
        self.current_run.as_deref()
    }

    /// Focus a run for single-run views.
    pub fn set_current_run(&mut self, run_id: Option<String>) {
        self.current_run = run_id;
    }

    /// Get the run list filter.
    #[must_use]
    pub fn run_filter(&self) -> &str {
        &self.run_filter
    }

    /// Set the run list filter.
    pub fn set_run_filter(&mut self, pattern: impl Into<String>) {
        self.run_filter = pattern.into();
    }

    /// Runs whose id matches the run filter, in their given order.
    #[must_use]
    pub fn visible_runs<'a>(&self, runs: &'a [RunRecord]) -> Vec<&'a RunRecord> {
        runs.iter()
            .filter(|run| matches_filter(run.run_id(), &self.run_filter))
            .collect()
    }

    /// Get the metric filter.
    #[must_use]
    pub fn metric_filter(&self) -> &str {
        &self.metric_filter
    }

    /// Set the metric filter.
    pub fn set_metric_filter(&mut self, pattern: impl Into<String>) {
        self.metric_filter = pattern.into();
    }

    /// Get the chart options.
    #[must_use]
    pub const fn options(&self) -> &SeriesOptions {
        &self.options
    }

    /// Set the x axis.
    pub fn set_axis(&mut self, axis: AxisMode) {
        self.options.axis = axis;
    }

    /// Set the smoothing level.
    pub fn set_smoothing(&mut self, level: SmoothingLevel) {
        self.options.smoothing = level;
    }

    /// Flip log scale on x; returns the new setting.
    pub fn toggle_log_x(&mut self) -> bool {
        self.options.log_x = !self.options.log_x;
        self.options.log_x
    }

    /// Flip log scale on y; returns the new setting.
    pub fn toggle_log_y(&mut self) -> bool {
        self.options.log_y = !self.options.log_y;
        self.options.log_y
    }

    /// Set the downsampling threshold.
    pub fn set_max_points(&mut self, max_points: Option<usize>) {
        self.options.max_points = max_points;
    }

    /// The query for the current view, or `None` without a project.
    #[must_use]
    pub fn to_request(&self) -> Option<QueryRequest> {
        let project = self.project.as_deref()?;
        Some(
            QueryRequest::new(project, &self.selected_runs)
                .metric_filter(self.metric_filter.as_str())
                .options(self.options),
        )
    }
}
