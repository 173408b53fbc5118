//! Store Reader: project databases → in-memory records
//!
//! Pure loaders with no caching. Every method is a suspension point of the
//! query pipeline; everything downstream is synchronous computation.
//!
//! # Example
//!
//! ```rust,no_run
//! use trackio_metrics::store::{SqliteStore, StoreReader};
//!
//! # async fn example() -> trackio_metrics::Result<()> {
//! let store = SqliteStore::new("/home/me/.cache/huggingface/trackio");
//!
//! for project in store.list_projects().await? {
//!     let runs = store.list_runs(&project).await?;
//!     println!("{project}: {} runs", runs.len());
//! }
//! # Ok(())
//! # }
//! ```

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;
use std::future::Future;

use crate::experiment::{DataPoint, RunRecord, SystemLog};
use crate::grouping::matches_filter;
use crate::Result;

/// Read-only access to experiment data.
///
/// Errors: [`Error::StoreNotFound`](crate::Error::StoreNotFound) when the
/// project has no database, [`Error::StoreCorrupt`](crate::Error::StoreCorrupt)
/// when rows cannot be parsed. An existing project or run without matching
/// data yields an empty result.
pub trait StoreReader: Send + Sync {
    /// Names of all projects, sorted.
    fn list_projects(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Runs of a project, ordered by start time then id.
    fn list_runs(&self, project: &str) -> impl Future<Output = Result<Vec<RunRecord>>> + Send;

    /// Distinct metric names logged by a run, sorted.
    fn list_metric_names(
        &self,
        project: &str,
        run_id: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Raw points of one metric in storage order.
    fn load_points(
        &self,
        project: &str,
        run_id: &str,
        metric: &str,
    ) -> impl Future<Output = Result<Vec<DataPoint>>> + Send;

    /// System samples of a run in logging order; empty when none were logged.
    fn load_system_logs(
        &self,
        project: &str,
        run_id: &str,
    ) -> impl Future<Output = Result<Vec<SystemLog>>> + Send;

    /// Raw points of every metric of a run whose name matches `metric_filter`.
    fn load_metrics(
        &self,
        project: &str,
        run_id: &str,
        metric_filter: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, Vec<DataPoint>>>> + Send {
        async move {
            let mut metrics = BTreeMap::new();
            for name in self.list_metric_names(project, run_id).await? {
                if matches_filter(&name, metric_filter) {
                    let points = self.load_points(project, run_id, &name).await?;
                    metrics.insert(name, points);
                }
            }
            Ok(metrics)
        }
    }
}
