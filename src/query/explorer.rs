//! The query facade over a [`StoreReader`] and a [`SeriesCache`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::{QueryRequest, QueryResult, QueryWarning, SeriesKey, SystemQueryResult};
use crate::cache::{Fingerprint, Loaded, Pinned, SeriesBundle, SeriesCache};
use crate::color::{Color, ColorAssigner};
use crate::experiment::{system_metric_names, system_points, DataPoint, RunRecord, SystemLog};
use crate::grouping::{group_metrics, group_system_metrics, matches_filter};
use crate::store::StoreReader;
use crate::transform::{transform, AxisMode, SeriesOptions};

/// Session entry point: listings, plot queries and refresh.
///
/// Retrieval goes through the shared cache; store errors surface as
/// [`QueryWarning`]s instead of failing the query.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use trackio_metrics::cache::SeriesCache;
/// use trackio_metrics::experiment::{DataPoint, RunRecord};
/// use trackio_metrics::query::{Explorer, QueryRequest};
/// use trackio_metrics::store::MemoryStore;
///
/// # async fn example() {
/// let store = MemoryStore::new();
/// store.insert_run(RunRecord::new("run-1", "mnist"));
/// store.push_point("mnist", "run-1", "train/loss", DataPoint::new(0, 0.0, 2.3));
///
/// let explorer = Explorer::new(store, Arc::new(SeriesCache::new()));
/// let result = explorer.query(&QueryRequest::new("mnist", &["run-1"])).await;
/// assert_eq!(result.series_count(), 1);
/// # }
/// ```
pub struct Explorer<S> {
    store: S,
    cache: Arc<SeriesCache>,
    colors: Mutex<ColorAssigner>,
    last_request: Mutex<Option<QueryRequest>>,
}

impl<S: StoreReader> Explorer<S> {
    /// Create a facade over `store` sharing `cache`.
    #[must_use]
    pub fn new(store: S, cache: Arc<SeriesCache>) -> Self {
        Self {
            store,
            cache,
            colors: Mutex::new(ColorAssigner::new()),
            last_request: Mutex::new(None),
        }
    }

    /// Get the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Get the shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<SeriesCache> {
        &self.cache
    }

    /// The most recent request passed to [`Explorer::query`].
    #[must_use]
    pub fn last_request(&self) -> Option<QueryRequest> {
        lock(&self.last_request).clone()
    }

    /// Current color of a run, if it has been assigned one.
    #[must_use]
    pub fn color_of(&self, run_id: &str) -> Option<Color> {
        lock(&self.colors).color_of(run_id)
    }

    /// All projects, sorted.
    ///
    /// # Errors
    ///
    /// Returns the (cached) store error when the storage root is unreadable.
    pub async fn list_projects(&self) -> Loaded<Arc<[String]>> {
        let store = &self.store;
        self.cache.projects(move || store.list_projects()).await
    }

    /// Runs of `project`, ordered by start time then id.
    ///
    /// # Errors
    ///
    /// [`Error::StoreNotFound`](crate::Error::StoreNotFound) for an unknown
    /// project, [`Error::StoreCorrupt`](crate::Error::StoreCorrupt) for an
    /// unreadable run table.
    pub async fn list_runs(&self, project: &str) -> Loaded<Arc<[RunRecord]>> {
        let store = &self.store;
        self.cache
            .runs(project, move || store.list_runs(project))
            .await
    }

    /// Config of every run in `project` that logged one.
    ///
    /// # Errors
    ///
    /// Same as [`Explorer::list_runs`].
    pub async fn run_configs(&self, project: &str) -> Loaded<BTreeMap<String, serde_json::Value>> {
        let runs = self.list_runs(project).await?;
        Ok(runs
            .iter()
            .filter_map(|run| {
                run.config()
                    .map(|config| (run.run_id().to_string(), config.clone()))
            })
            .collect())
    }

    /// Union of the metric names of `run_ids`, sorted.
    ///
    /// # Errors
    ///
    /// The first run whose metric names cannot be read fails the listing.
    pub async fn list_metric_names<R: AsRef<str>>(
        &self,
        project: &str,
        run_ids: &[R],
    ) -> Loaded<Vec<String>> {
        let cache = self.cache.pin();
        let mut names = BTreeSet::new();
        for run_id in run_ids {
            let run_names = self.metric_names_of(cache, project, run_id.as_ref()).await?;
            names.extend(run_names.iter().cloned());
        }
        Ok(names.into_iter().collect())
    }

    /// Answer a plot query.
    ///
    /// Every selected run gets a color, including runs without data. Runs
    /// whose metric names cannot be read are reported and skipped; a missing
    /// project yields an empty result with one `StoreNotFound` warning.
    ///
    /// All cache reads of one query use the generation current when it
    /// started. A query overtaken by [`Explorer::refresh`] still answers, but
    /// stores nothing.
    pub async fn query(&self, request: &QueryRequest) -> QueryResult {
        *lock(&self.last_request) = Some(request.clone());
        let colors = lock(&self.colors).assign_colors(&request.run_ids);
        let cache = self.cache.pin();

        let mut result = QueryResult {
            colors,
            ..QueryResult::default()
        };
        let project = request.project.as_str();
        let selection = unique_in_order(&request.run_ids);
        if selection.is_empty() {
            return result;
        }

        let mut available: Vec<(&str, Arc<[String]>)> = Vec::with_capacity(selection.len());
        for run_id in selection {
            match self.metric_names_of(cache, project, run_id).await {
                Ok(names) => available.push((run_id, names)),
                Err(err) if err.is_not_found() => {
                    warn!(project, error = %err, "project has no data");
                    result
                        .warnings
                        .push(QueryWarning::from_error(&err, project, None, None));
                    return result;
                }
                Err(err) => {
                    warn!(project, run_id, error = %err, "skipping unreadable run");
                    result
                        .warnings
                        .push(QueryWarning::from_error(&err, project, Some(run_id), None));
                }
            }
        }

        let matching: BTreeSet<&str> = available
            .iter()
            .flat_map(|(_, names)| names.iter().map(String::as_str))
            .filter(|name| matches_filter(name, &request.metric_filter))
            .collect();

        let starts = self
            .starts_for(cache, project, &request.options, &mut result.warnings)
            .await;

        for (group, metrics) in group_metrics(matching) {
            let mut plotted = BTreeMap::new();
            for metric in &metrics {
                let runs: Vec<&str> = available
                    .iter()
                    .filter(|(_, names)| names.iter().any(|name| name == metric))
                    .map(|(run_id, _)| *run_id)
                    .collect();

                let fingerprint =
                    Fingerprint::new(project, &request.run_ids, metric.as_str(), request.options);
                let (runs, starts, options) = (runs.as_slice(), &starts, &request.options);
                let bundle = cache
                    .get_or_compute(fingerprint, move || {
                        self.derive(cache, project, runs, metric, options, starts)
                    })
                    .await;

                for (run_id, series) in &bundle.series {
                    plotted.insert(SeriesKey::new(run_id.as_str(), metric.as_str()), Arc::clone(series));
                }
                result.warnings.extend(bundle.warnings.iter().cloned());
            }
            if !plotted.is_empty() {
                result.groups.insert(group, plotted);
            }
        }

        debug!(
            project,
            series = result.series_count(),
            warnings = result.warnings.len(),
            stale = cache.is_stale(),
            "query answered"
        );
        result
    }

    /// Answer a query over the selected runs' system samples.
    ///
    /// Uses the run selection, metric filter and options of `request`, and
    /// the same session colors as [`Explorer::query`]. Every numeric reading
    /// becomes one series, grouped by hardware category. Runs without
    /// samples are left out silently; unreadable samples are reported.
    ///
    /// Does not change [`Explorer::last_request`].
    pub async fn query_system(&self, request: &QueryRequest) -> SystemQueryResult {
        let colors = lock(&self.colors).assign_colors(&request.run_ids);
        let cache = self.cache.pin();

        let mut result = SystemQueryResult {
            colors,
            ..SystemQueryResult::default()
        };
        let project = request.project.as_str();
        let selection = unique_in_order(&request.run_ids);
        if selection.is_empty() {
            return result;
        }

        let mut sampled: Vec<(&str, Arc<[SystemLog]>)> = Vec::with_capacity(selection.len());
        for run_id in selection {
            match self.system_logs_of(cache, project, run_id).await {
                Ok(logs) if logs.is_empty() => {}
                Ok(logs) => sampled.push((run_id, logs)),
                Err(err) if err.is_not_found() => {
                    warn!(project, error = %err, "project has no data");
                    result
                        .warnings
                        .push(QueryWarning::from_error(&err, project, None, None));
                    return result;
                }
                Err(err) => {
                    warn!(project, run_id, error = %err, "skipping unreadable system logs");
                    result
                        .warnings
                        .push(QueryWarning::from_error(&err, project, Some(run_id), None));
                }
            }
        }

        let matching: BTreeSet<String> = system_metric_names(sampled.iter().flat_map(|(_, logs)| logs.iter()))
            .into_iter()
            .filter(|name| matches_filter(name, &request.metric_filter))
            .collect();
        if matching.is_empty() {
            return result;
        }

        let starts = self
            .starts_for(cache, project, &request.options, &mut result.warnings)
            .await;

        for (group, metrics) in group_system_metrics(&matching) {
            let mut plotted = BTreeMap::new();
            for metric in &metrics {
                let fingerprint =
                    Fingerprint::system(project, &request.run_ids, metric.as_str(), request.options);
                let (sampled, starts, options) = (sampled.as_slice(), &starts, &request.options);
                let bundle = cache
                    .get_or_compute(fingerprint, move || async move {
                        derive_system(sampled, metric, options, starts)
                    })
                    .await;

                for (run_id, series) in &bundle.series {
                    plotted.insert(SeriesKey::new(run_id.as_str(), metric.as_str()), Arc::clone(series));
                }
            }
            if !plotted.is_empty() {
                result.groups.insert(group, plotted);
            }
        }

        debug!(
            project,
            series = result.series_count(),
            warnings = result.warnings.len(),
            "system query answered"
        );
        result
    }

    /// Drop every cached value and re-issue the last query.
    ///
    /// Returns `None` when no query has been made yet.
    pub async fn refresh(&self) -> Option<QueryResult> {
        self.cache.invalidate_all();
        let request = self.last_request()?;
        info!(project = %request.project, runs = request.run_ids.len(), "refreshing");
        Some(self.query(&request).await)
    }

    async fn metric_names_of(&self, cache: Pinned<'_>, project: &str, run_id: &str) -> Loaded<Arc<[String]>> {
        let store = &self.store;
        cache
            .metric_names(project, run_id, move || {
                store.list_metric_names(project, run_id)
            })
            .await
    }

    async fn points_of(
        &self,
        cache: Pinned<'_>,
        project: &str,
        run_id: &str,
        metric: &str,
    ) -> Loaded<Arc<[DataPoint]>> {
        let store = &self.store;
        cache
            .points(project, run_id, metric, move || {
                store.load_points(project, run_id, metric)
            })
            .await
    }

    async fn system_logs_of(&self, cache: Pinned<'_>, project: &str, run_id: &str) -> Loaded<Arc<[SystemLog]>> {
        let store = &self.store;
        cache
            .system_logs(project, run_id, move || {
                store.load_system_logs(project, run_id)
            })
            .await
    }

    /// Run start times, fetched only for the relative-time axis.
    async fn starts_for(
        &self,
        cache: Pinned<'_>,
        project: &str,
        options: &SeriesOptions,
        warnings: &mut Vec<QueryWarning>,
    ) -> BTreeMap<String, f64> {
        if options.axis == AxisMode::RelativeTime {
            self.run_starts(cache, project, warnings).await
        } else {
            BTreeMap::new()
        }
    }

    /// Start times by run id; an unreadable run list falls back to no origins.
    async fn run_starts(
        &self,
        cache: Pinned<'_>,
        project: &str,
        warnings: &mut Vec<QueryWarning>,
    ) -> BTreeMap<String, f64> {
        let store = &self.store;
        let runs = cache.runs(project, move || store.list_runs(project)).await;
        match runs {
            Ok(runs) => runs
                .iter()
                .filter_map(|run| run.start_time().map(|start| (run.run_id().to_string(), start)))
                .collect(),
            Err(err) => {
                warn!(project, error = %err, "run start times unavailable");
                warnings.push(QueryWarning::from_error(&err, project, None, None));
                BTreeMap::new()
            }
        }
    }

    async fn derive(
        &self,
        cache: Pinned<'_>,
        project: &str,
        run_ids: &[&str],
        metric: &str,
        options: &SeriesOptions,
        starts: &BTreeMap<String, f64>,
    ) -> SeriesBundle {
        let mut bundle = SeriesBundle::default();
        for &run_id in run_ids {
            match self.points_of(cache, project, run_id, metric).await {
                Ok(points) => {
                    let series = transform(&points, options, starts.get(run_id).copied());
                    bundle.series.insert(run_id.to_string(), Arc::new(series));
                }
                Err(err) => {
                    warn!(project, run_id, metric, error = %err, "skipping unreadable series");
                    bundle.warnings.push(QueryWarning::from_error(
                        &err,
                        project,
                        Some(run_id),
                        Some(metric),
                    ));
                }
            }
        }
        bundle
    }
}

/// Series of `metric` for every sampled run that read it.
fn derive_system(
    sampled: &[(&str, Arc<[SystemLog]>)],
    metric: &str,
    options: &SeriesOptions,
    starts: &BTreeMap<String, f64>,
) -> SeriesBundle {
    let mut bundle = SeriesBundle::default();
    for (run_id, logs) in sampled {
        let points = system_points(logs, metric);
        if !points.is_empty() {
            let series = transform(&points, options, starts.get(*run_id).copied());
            bundle.series.insert((*run_id).to_string(), Arc::new(series));
        }
    }
    bundle
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unique_in_order(run_ids: &[String]) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    run_ids
        .iter()
        .map(String::as_str)
        .filter(|run_id| seen.insert(*run_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::MetricGroup;
    use crate::store::MemoryStore;

    fn explorer() -> Explorer<MemoryStore> {
        let store = MemoryStore::new();
        store.insert_run(RunRecord::builder("a", "p").start_time(100.0).build());
        store.insert_run(RunRecord::new("b", "p"));
        for step in 0..4 {
            let point = DataPoint::new(step, 100.0 + step as f64 * 10.0, step as f64);
            store.push_point("p", "a", "train/loss", point);
            store.push_point("p", "a", "lr", point);
            store.push_point("p", "b", "train/loss", point);
            store.push_system_log(
                "p",
                "a",
                SystemLog::new(0, 100.0 + step as f64 * 10.0)
                    .with_value("cpu_percent", 10.0 * step as f64)
                    .with_value("gpu/0/util", 50.0),
            );
        }
        Explorer::new(store, Arc::new(SeriesCache::new()))
    }

    #[test]
    fn test_unique_in_order() {
        let ids = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(unique_in_order(&ids), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_query_groups_and_colors() {
        let explorer = explorer();
        let result = explorer.query(&QueryRequest::new("p", &["a", "b"])).await;

        assert!(result.warnings.is_empty());
        assert_eq!(result.series_count(), 3);
        let train = &result.groups[&MetricGroup::Prefix("train".into())];
        assert_eq!(train.len(), 2);
        assert_eq!(result.groups[&MetricGroup::Ungrouped].len(), 1);
        assert_eq!(result.colors.len(), 2);
        assert_ne!(result.colors["a"], result.colors["b"]);
    }

    #[tokio::test]
    async fn test_empty_selection() {
        let explorer = explorer();
        let result = explorer.query(&QueryRequest::new("p", &[] as &[&str])).await;
        assert!(result.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_filter_applies() {
        let explorer = explorer();
        let request = QueryRequest::new("p", &["a", "b"]).metric_filter("LR");
        let result = explorer.query(&request).await;
        assert_eq!(result.metric_names(), vec!["lr"]);
    }

    #[tokio::test]
    async fn test_relative_time_uses_run_start() {
        let explorer = explorer();
        let request = QueryRequest::new("p", &["a"]).options(SeriesOptions::with_axis(AxisMode::RelativeTime));
        let result = explorer.query(&request).await;
        let xs = result.get("a", "lr").unwrap().xs();
        assert_eq!(xs, vec![0.0, 10.0, 20.0, 30.0]);
    }

    #[tokio::test]
    async fn test_listing() {
        let explorer = explorer();
        assert_eq!(&*explorer.list_projects().await.unwrap(), &["p".to_string()]);
        assert_eq!(explorer.list_runs("p").await.unwrap().len(), 2);
        assert_eq!(
            explorer.list_metric_names("p", &["a", "b"]).await.unwrap(),
            vec!["lr", "train/loss"]
        );
        assert!(explorer.run_configs("p").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_system_groups_by_category() {
        use crate::grouping::SystemGroup;

        let explorer = explorer();
        let request = QueryRequest::new("p", &["a", "b"]).options(SeriesOptions::with_axis(AxisMode::RelativeTime));
        let result = explorer.query_system(&request).await;

        assert!(result.warnings.is_empty());
        assert_eq!(result.series_count(), 2);
        let groups: Vec<SystemGroup> = result.groups.keys().copied().collect();
        assert_eq!(groups, vec![SystemGroup::Cpu, SystemGroup::Gpu]);
        assert_eq!(result.get("a", "cpu_percent").unwrap().xs(), vec![0.0, 10.0, 20.0, 30.0]);
        assert!(result.get("b", "cpu_percent").is_none());
        assert_eq!(result.colors.len(), 2);
        assert!(explorer.last_request().is_none());
    }

    #[tokio::test]
    async fn test_query_system_shares_session_colors() {
        let explorer = explorer();
        let plots = explorer.query(&QueryRequest::new("p", &["b", "a"])).await;
        let system = explorer.query_system(&QueryRequest::new("p", &["b", "a"])).await;
        assert_eq!(plots.colors, system.colors);

        let filtered = explorer
            .query_system(&QueryRequest::new("p", &["a"]).metric_filter("GPU"))
            .await;
        assert_eq!(filtered.metric_names(), vec!["gpu/0/util"]);
    }

    #[tokio::test]
    async fn test_refresh_without_query() {
        let explorer = explorer();
        assert!(explorer.refresh().await.is_none());
        assert_eq!(explorer.cache().generation(), 1);
    }
}
