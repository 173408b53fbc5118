//! In-memory Store Reader using `DashMap`.
//!
//! Holds projects the way the SQLite layout does, without a file. Used by
//! tests, benchmarks and embedders that already have their data in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use dashmap::DashMap;

use super::StoreReader;
use crate::experiment::{DataPoint, RunRecord, SystemLog};
use crate::{Error, Result};

#[derive(Default)]
struct ProjectData {
    runs: BTreeMap<String, RunRecord>,
    metrics: BTreeMap<String, BTreeMap<String, Vec<DataPoint>>>,
    system: BTreeMap<String, Vec<SystemLog>>,
    corrupt: BTreeSet<String>,
}

/// Concurrent in-memory store.
///
/// # Example
///
/// ```rust
/// use trackio_metrics::experiment::{DataPoint, RunRecord};
/// use trackio_metrics::store::{MemoryStore, StoreReader};
///
/// # async fn example() -> trackio_metrics::Result<()> {
/// let store = MemoryStore::new();
/// store.insert_run(RunRecord::new("run-1", "mnist"));
/// store.push_point("mnist", "run-1", "train/loss", DataPoint::new(0, 0.0, 2.3));
///
/// assert_eq!(store.list_metric_names("mnist", "run-1").await?, vec!["train/loss"]);
/// # Ok(())
/// # }
/// ```
pub struct MemoryStore {
    projects: DashMap<String, ProjectData>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            projects: DashMap::new(),
        }
    }

    /// Number of projects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Check if the store has no projects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Create `project` with no runs if it does not exist.
    pub fn create_project(&self, project: &str) {
        self.projects.entry(project.to_string()).or_default();
    }

    /// Insert or replace a run record; creates its project.
    pub fn insert_run(&self, run: RunRecord) {
        let mut project = self.projects.entry(run.project().to_string()).or_default();
        project.runs.insert(run.run_id().to_string(), run);
    }

    /// Append one point; creates the project if needed.
    pub fn push_point(&self, project: &str, run_id: &str, metric: &str, point: DataPoint) {
        self.extend_points(project, run_id, metric, [point]);
    }

    /// Append points in order; creates the project if needed.
    pub fn extend_points(
        &self,
        project: &str,
        run_id: &str,
        metric: &str,
        points: impl IntoIterator<Item = DataPoint>,
    ) {
        let mut data = self.projects.entry(project.to_string()).or_default();
        data.metrics
            .entry(run_id.to_string())
            .or_default()
            .entry(metric.to_string())
            .or_default()
            .extend(points);
    }

    /// Append one system sample; creates the project if needed.
    pub fn push_system_log(&self, project: &str, run_id: &str, log: SystemLog) {
        let mut data = self.projects.entry(project.to_string()).or_default();
        data.system.entry(run_id.to_string()).or_default().push(log);
    }

    /// Make every read of `run_id` fail as corrupt.
    pub fn mark_corrupt(&self, project: &str, run_id: &str) {
        let mut data = self.projects.entry(project.to_string()).or_default();
        data.corrupt.insert(run_id.to_string());
    }

    /// Drop a project and everything in it.
    pub fn remove_project(&self, project: &str) {
        self.projects.remove(project);
    }

    fn with_project<T>(&self, project: &str, read: impl FnOnce(&ProjectData) -> Result<T>) -> Result<T> {
        let data = self.projects.get(project).ok_or_else(|| Error::StoreNotFound {
            project: project.to_string(),
            path: PathBuf::from(format!("memory://{project}")),
        })?;
        read(&data)
    }

    fn with_run<T>(&self, project: &str, run_id: &str, read: impl FnOnce(&ProjectData) -> T) -> Result<T> {
        self.with_project(project, |data| {
            if data.corrupt.contains(run_id) {
                return Err(Error::corrupt(project, format!("run '{run_id}' is unreadable")));
            }
            Ok(read(data))
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreReader for MemoryStore {
    async fn list_projects(&self) -> Result<Vec<String>> {
        let mut projects: Vec<String> = self.projects.iter().map(|entry| entry.key().clone()).collect();
        projects.sort();
        Ok(projects)
    }

    async fn list_runs(&self, project: &str) -> Result<Vec<RunRecord>> {
        self.with_project(project, |data| {
            let mut runs: Vec<RunRecord> = data.runs.values().cloned().collect();
            runs.sort_by(|a, b| {
                a.start_time()
                    .is_none()
                    .cmp(&b.start_time().is_none())
                    .then_with(|| {
                        a.start_time()
                            .unwrap_or_default()
                            .total_cmp(&b.start_time().unwrap_or_default())
                    })
                    .then_with(|| a.run_id().cmp(b.run_id()))
            });
            runs.extend(
                data.metrics
                    .keys()
                    .filter(|run_id| !data.runs.contains_key(*run_id))
                    .map(|run_id| RunRecord::new(run_id.as_str(), project)),
            );
            Ok(runs)
        })
    }

    async fn list_metric_names(&self, project: &str, run_id: &str) -> Result<Vec<String>> {
        self.with_run(project, run_id, |data| {
            data.metrics
                .get(run_id)
                .map(|metrics| metrics.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn load_points(&self, project: &str, run_id: &str, metric: &str) -> Result<Vec<DataPoint>> {
        self.with_run(project, run_id, |data| {
            data.metrics
                .get(run_id)
                .and_then(|metrics| metrics.get(metric))
                .cloned()
                .unwrap_or_default()
        })
    }

    async fn load_system_logs(&self, project: &str, run_id: &str) -> Result<Vec<SystemLog>> {
        self.with_run(project, run_id, |data| data.system.get(run_id).cloned().unwrap_or_default())
    }
}
