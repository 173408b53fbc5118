//! Integration tests for the query pipeline
//!
//! These tests validate the complete path:
//! QueryRequest → Explorer → SeriesCache → StoreReader → transform → QueryResult
//!
//! A counting wrapper around `MemoryStore` records every store call, so the
//! cache laws can be checked as exact I/O counts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use trackio_metrics::cache::SeriesCache;
use trackio_metrics::color::Color;
use trackio_metrics::experiment::{DataPoint, RunRecord, SystemLog};
use trackio_metrics::grouping::{MetricGroup, SystemGroup};
use trackio_metrics::query::{Explorer, QueryRequest, QueryResult, WarningKind};
use trackio_metrics::store::{MemoryStore, StoreReader};
use trackio_metrics::{AxisMode, Result, SeriesOptions, SmoothingLevel};

/// `MemoryStore` that counts calls and yields before answering.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    run_lists: AtomicUsize,
    name_lists: AtomicUsize,
    system_loads: AtomicUsize,
    point_loads: Mutex<BTreeMap<(String, String), usize>>,
}

impl CountingStore {
    fn point_loads(&self) -> usize {
        self.point_loads.lock().unwrap().values().sum()
    }

    fn loads_of(&self, run_id: &str, metric: &str) -> usize {
        self.point_loads
            .lock()
            .unwrap()
            .get(&(run_id.to_string(), metric.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn total_io(&self) -> usize {
        self.run_lists.load(Ordering::SeqCst)
            + self.name_lists.load(Ordering::SeqCst)
            + self.system_loads.load(Ordering::SeqCst)
            + self.point_loads()
    }
}

impl StoreReader for CountingStore {
    async fn list_projects(&self) -> Result<Vec<String>> {
        tokio::task::yield_now().await;
        self.inner.list_projects().await
    }

    async fn list_runs(&self, project: &str) -> Result<Vec<RunRecord>> {
        self.run_lists.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.list_runs(project).await
    }

    async fn list_metric_names(&self, project: &str, run_id: &str) -> Result<Vec<String>> {
        self.name_lists.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.list_metric_names(project, run_id).await
    }

    async fn load_points(&self, project: &str, run_id: &str, metric: &str) -> Result<Vec<DataPoint>> {
        *self
            .point_loads
            .lock()
            .unwrap()
            .entry((run_id.to_string(), metric.to_string()))
            .or_default() += 1;
        tokio::task::yield_now().await;
        self.inner.load_points(project, run_id, metric).await
    }

    async fn load_system_logs(&self, project: &str, run_id: &str) -> Result<Vec<SystemLog>> {
        self.system_loads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.load_system_logs(project, run_id).await
    }
}

/// Project `mnist`: run-a logs train/loss, train/acc, val/loss and lr;
/// run-b logs train/loss and val/loss.
fn create_explorer() -> Explorer<CountingStore> {
    let store = CountingStore::default();
    store
        .inner
        .insert_run(RunRecord::builder("run-a", "mnist").start_time(1000.0).build());
    store
        .inner
        .insert_run(RunRecord::builder("run-b", "mnist").start_time(2000.0).build());

    for step in 0..10_i64 {
        let t = step as f64;
        store
            .inner
            .push_point("mnist", "run-a", "train/loss", DataPoint::new(step, 1000.0 + t, 1.0 / (t + 1.0)));
        store
            .inner
            .push_point("mnist", "run-a", "train/acc", DataPoint::new(step, 1000.0 + t, t / 10.0));
        store
            .inner
            .push_point("mnist", "run-a", "val/loss", DataPoint::new(step, 1000.0 + t, 2.0 / (t + 1.0)));
        store
            .inner
            .push_point("mnist", "run-a", "lr", DataPoint::new(step, 1000.0 + t, 0.001));
        store
            .inner
            .push_point("mnist", "run-b", "train/loss", DataPoint::new(step, 2000.0 + t, 1.5 - t / 10.0));
        store
            .inner
            .push_point("mnist", "run-b", "val/loss", DataPoint::new(step, 2000.0 + t, 1.7 - t / 10.0));
    }

    Explorer::new(store, Arc::new(SeriesCache::new()))
}

/// run-a samples CPU, memory and GPU; run-b samples CPU only.
fn add_system_logs(explorer: &Explorer<CountingStore>) {
    for sample in 0..5_i64 {
        let t = sample as f64;
        explorer.store().inner.push_system_log(
            "mnist",
            "run-a",
            SystemLog::new(0, 1000.0 + t * 2.0)
                .with_value("cpu_percent", 20.0 + t)
                .with_value("memory_used_gb", 3.5)
                .with_value("gpu/0/util", 90.0 - t),
        );
        explorer.store().inner.push_system_log(
            "mnist",
            "run-b",
            SystemLog::new(0, 2000.0 + t * 2.0).with_value("cpu_percent", 55.0),
        );
    }
}

fn both_runs() -> QueryRequest {
    QueryRequest::new("mnist", &["run-a", "run-b"])
}

fn bits(result: &QueryResult) -> Vec<(String, String, Vec<u64>, Vec<u64>)> {
    result
        .groups
        .values()
        .flat_map(|series| series.iter())
        .map(|(key, line)| {
            (
                key.run_id.clone(),
                key.metric.clone(),
                line.xs().iter().map(|x| x.to_bits()).collect(),
                line.ys().iter().map(|y| y.to_bits()).collect(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_query_groups_by_prefix() {
    let explorer = create_explorer();
    let result = explorer.query(&both_runs()).await;

    let groups: Vec<&MetricGroup> = result.groups.keys().collect();
    assert_eq!(
        groups,
        vec![
            &MetricGroup::Prefix("train".into()),
            &MetricGroup::Prefix("val".into()),
            &MetricGroup::Ungrouped,
        ]
    );
    assert_eq!(result.groups[&MetricGroup::Prefix("train".into())].len(), 3);
    assert_eq!(result.groups[&MetricGroup::Prefix("val".into())].len(), 2);
    assert_eq!(result.groups[&MetricGroup::Ungrouped].len(), 1);
    assert_eq!(result.series_count(), 6);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_repeat_query_is_served_from_cache() {
    let explorer = create_explorer();
    let request = both_runs().options(SeriesOptions {
        smoothing: SmoothingLevel::new(3).unwrap(),
        ..SeriesOptions::default()
    });

    let first = explorer.query(&request).await;
    let io_after_first = explorer.store().total_io();
    let second = explorer.query(&request).await;

    assert_eq!(explorer.store().total_io(), io_after_first);
    assert_eq!(bits(&first), bits(&second));
    assert_eq!(first, second);

    let stats = explorer.cache().stats();
    assert_eq!(stats.series_entries, 4);
    assert!(stats.hits >= 4);
}

#[tokio::test]
async fn test_refresh_loads_each_pair_once() {
    let explorer = create_explorer();
    explorer.query(&both_runs()).await;
    assert_eq!(explorer.store().point_loads(), 6);

    explorer
        .store()
        .inner
        .push_point("mnist", "run-b", "train/loss", DataPoint::new(10, 2010.0, 0.4));

    // Appended rows stay invisible until refresh
    let stale = explorer.query(&both_runs()).await;
    assert_eq!(stale.get("run-b", "train/loss").unwrap().len(), 10);
    assert_eq!(explorer.store().point_loads(), 6);

    let fresh = explorer.refresh().await.unwrap();
    assert_eq!(fresh.get("run-b", "train/loss").unwrap().len(), 11);
    assert_eq!(explorer.store().point_loads(), 12);
    for (run_id, metric) in [
        ("run-a", "train/loss"),
        ("run-a", "train/acc"),
        ("run-a", "val/loss"),
        ("run-a", "lr"),
        ("run-b", "train/loss"),
        ("run-b", "val/loss"),
    ] {
        assert_eq!(explorer.store().loads_of(run_id, metric), 2, "{run_id}/{metric}");
    }
}

#[tokio::test]
async fn test_option_change_reuses_raw_points() {
    let explorer = create_explorer();
    explorer.query(&both_runs()).await;
    let loads = explorer.store().point_loads();

    let wall = both_runs().options(SeriesOptions::with_axis(AxisMode::WallTime));
    let result = explorer.query(&wall).await;

    assert_eq!(explorer.store().point_loads(), loads);
    assert_eq!(result.get("run-a", "lr").unwrap().xs()[0], 1000.0);
    assert_eq!(explorer.cache().stats().series_entries, 8);
}

#[tokio::test]
async fn test_concurrent_queries_share_loads() {
    let explorer = create_explorer();
    let request = both_runs();

    let (a, b) = tokio::join!(explorer.query(&request), explorer.query(&request));

    assert_eq!(a, b);
    assert_eq!(explorer.store().point_loads(), 6);
    assert_eq!(explorer.store().name_lists.load(Ordering::SeqCst), 2);
    assert!(explorer.cache().stats().joined > 0);
}

#[tokio::test]
async fn test_relative_time_axis() {
    let explorer = create_explorer();
    explorer
        .store()
        .inner
        .push_point("mnist", "run-c", "lr", DataPoint::new(0, 500.0, 0.1));
    explorer
        .store()
        .inner
        .push_point("mnist", "run-c", "lr", DataPoint::new(1, 530.0, 0.1));

    let request = QueryRequest::new("mnist", &["run-a", "run-c"])
        .metric_filter("lr")
        .options(SeriesOptions::with_axis(AxisMode::RelativeTime));
    let result = explorer.query(&request).await;

    // run-a starts at 1000.0; run-c has no runs row and falls back to its first point
    assert_eq!(result.get("run-a", "lr").unwrap().xs()[..3], [0.0, 1.0, 2.0]);
    assert_eq!(result.get("run-c", "lr").unwrap().xs(), vec![0.0, 30.0]);
}

#[tokio::test]
async fn test_log_y_excludes_non_positive() {
    let explorer = create_explorer();
    explorer
        .store()
        .inner
        .extend_points("mnist", "run-c", "signed", [DataPoint::new(0, 0.0, 1.0), DataPoint::new(1, 1.0, -1.0)]);

    let options = SeriesOptions {
        log_y: true,
        ..SeriesOptions::default()
    };
    let result = explorer
        .query(&QueryRequest::new("mnist", &["run-c"]).options(options))
        .await;

    let series = result.get("run-c", "signed").unwrap();
    assert_eq!(series.xs(), vec![0.0]);
    assert_eq!(series.ys(), vec![1.0]);
    assert_eq!(series.excluded_by_log(), 1);
}

#[tokio::test]
async fn test_metric_filter_before_grouping() {
    let explorer = create_explorer();
    let result = explorer.query(&both_runs().metric_filter("Loss")).await;

    assert_eq!(result.metric_names(), vec!["train/loss", "val/loss"]);
    assert!(!result.groups.contains_key(&MetricGroup::Ungrouped));
}

#[tokio::test]
async fn test_no_matching_metric_is_empty() {
    let explorer = create_explorer();
    let result = explorer.query(&both_runs().metric_filter("perplexity")).await;

    assert!(result.is_empty());
    assert!(result.warnings.is_empty());
    assert_eq!(result.colors.len(), 2);
}

#[tokio::test]
async fn test_empty_selection_does_no_io() {
    let explorer = create_explorer();
    let result = explorer.query(&QueryRequest::new("mnist", &[] as &[&str])).await;

    assert!(result.is_empty());
    assert!(result.colors.is_empty());
    assert_eq!(explorer.store().total_io(), 0);
}

#[tokio::test]
async fn test_missing_project_reports_no_data() {
    let explorer = create_explorer();
    let result = explorer.query(&QueryRequest::new("cifar", &["run-a", "run-b"])).await;

    assert!(result.is_empty());
    assert!(result.is_no_data());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].kind, WarningKind::StoreNotFound);
    assert_eq!(result.warnings[0].project, "cifar");
}

#[tokio::test]
async fn test_corrupt_run_is_isolated() {
    let explorer = create_explorer();
    explorer
        .store()
        .inner
        .push_point("mnist", "run-bad", "train/loss", DataPoint::new(0, 0.0, 1.0));
    explorer.store().inner.mark_corrupt("mnist", "run-bad");

    let result = explorer
        .query(&QueryRequest::new("mnist", &["run-a", "run-bad"]))
        .await;

    assert_eq!(result.series_count(), 4);
    assert!(result.get("run-a", "train/loss").is_some());
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].kind, WarningKind::StoreCorrupt);
    assert_eq!(result.warnings[0].run_id.as_deref(), Some("run-bad"));
    assert!(result.colors.contains_key("run-bad"));
}

#[tokio::test]
async fn test_failures_are_cached_until_refresh() {
    let explorer = create_explorer();
    let request = QueryRequest::new("cifar", &["run-a"]);

    explorer.query(&request).await;
    explorer.query(&request).await;
    assert_eq!(explorer.store().name_lists.load(Ordering::SeqCst), 1);

    explorer.store().inner.create_project("cifar");
    let result = explorer.refresh().await.unwrap();
    assert!(result.warnings.is_empty());
    assert!(result.is_empty());
    assert_eq!(explorer.store().name_lists.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_colors_stable_across_reselection() {
    let explorer = create_explorer();
    for run in ["run-c", "run-d"] {
        explorer
            .store()
            .inner
            .push_point("mnist", run, "lr", DataPoint::new(0, 0.0, 0.1));
    }

    let first = explorer
        .query(&QueryRequest::new("mnist", &["run-a", "run-b", "run-c"]))
        .await;
    assert_eq!(first.colors["run-a"], Color::Blue);
    assert_eq!(first.colors["run-b"], Color::Red);
    assert_eq!(first.colors["run-c"], Color::Green);

    let second = explorer
        .query(&QueryRequest::new("mnist", &["run-c", "run-a"]))
        .await;
    assert_eq!(second.colors["run-a"], Color::Blue);
    assert_eq!(second.colors["run-c"], Color::Green);
    assert!(!second.colors.contains_key("run-b"));

    let third = explorer
        .query(&QueryRequest::new("mnist", &["run-c", "run-a", "run-d"]))
        .await;
    assert_eq!(third.colors["run-d"], Color::Red);
    assert_eq!(explorer.color_of("run-a"), Some(Color::Blue));
}

#[tokio::test]
async fn test_listing_through_cache() {
    let explorer = create_explorer();

    let names = explorer.list_metric_names("mnist", &["run-a", "run-b"]).await.unwrap();
    assert_eq!(names, vec!["lr", "train/acc", "train/loss", "val/loss"]);

    let runs = explorer.list_runs("mnist").await.unwrap();
    let ids: Vec<&str> = runs.iter().map(RunRecord::run_id).collect();
    assert_eq!(ids, vec!["run-a", "run-b"]);

    explorer.list_runs("mnist").await.unwrap();
    assert_eq!(explorer.store().run_lists.load(Ordering::SeqCst), 1);

    let err = explorer.list_runs("cifar").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_run_configs() {
    let explorer = create_explorer();
    explorer.store().inner.insert_run(
        RunRecord::builder("run-c", "mnist")
            .config(serde_json::json!({"batch_size": 64}))
            .build(),
    );

    let configs = explorer.run_configs("mnist").await.unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs["run-c"]["batch_size"], 64);
}

#[tokio::test]
async fn test_refresh_reissues_last_request() {
    let explorer = create_explorer();
    assert!(explorer.refresh().await.is_none());

    let request = both_runs().metric_filter("val");
    let before = explorer.query(&request).await;
    let after = explorer.refresh().await.unwrap();

    assert_eq!(explorer.last_request(), Some(request));
    assert_eq!(before, after);
    assert_eq!(explorer.cache().generation(), 2);
}

#[tokio::test]
async fn test_refresh_mid_query_keeps_only_fresh_data() {
    let explorer = create_explorer();
    let request = both_runs();

    let refresh_mid_load = async {
        tokio::task::yield_now().await;
        explorer
            .store()
            .inner
            .push_point("mnist", "run-b", "train/loss", DataPoint::new(10, 2010.0, 0.4));
        explorer.refresh().await
    };
    let (overtaken, refreshed) = tokio::join!(explorer.query(&request), refresh_mid_load);

    let refreshed = refreshed.unwrap();
    assert_eq!(overtaken.series_count(), 6);
    assert_eq!(refreshed.get("run-b", "train/loss").unwrap().len(), 11);

    // Only the refreshed query's reads are kept
    let stats = explorer.cache().stats();
    assert_eq!(stats.generation, 1);
    assert_eq!(stats.series_entries, 4);
    assert_eq!(stats.raw_entries, 8);

    let io = explorer.store().total_io();
    let again = explorer.query(&request).await;
    assert_eq!(explorer.store().total_io(), io);
    assert_eq!(again.get("run-b", "train/loss").unwrap().len(), 11);
    assert_eq!(bits(&again), bits(&refreshed));

    for (run_id, metric) in [("run-a", "train/loss"), ("run-a", "lr"), ("run-b", "val/loss")] {
        let loads = explorer.store().loads_of(run_id, metric);
        assert!((1..=2).contains(&loads), "{run_id}/{metric}: {loads}");
    }
}

#[tokio::test]
async fn test_superseded_query_still_populates_cache() {
    let explorer = create_explorer();
    let step = both_runs();
    let wall = both_runs().options(SeriesOptions::with_axis(AxisMode::WallTime));

    tokio::join!(explorer.query(&step), explorer.query(&wall));
    assert_eq!(explorer.store().point_loads(), 6);
    assert_eq!(explorer.cache().stats().series_entries, 8);

    let io = explorer.store().total_io();
    explorer.query(&step).await;
    explorer.query(&wall).await;
    assert_eq!(explorer.store().total_io(), io);
}

#[tokio::test]
async fn test_system_query_through_cache() {
    let explorer = create_explorer();
    add_system_logs(&explorer);

    let result = explorer.query_system(&both_runs()).await;
    let groups: Vec<SystemGroup> = result.groups.keys().copied().collect();
    assert_eq!(groups, vec![SystemGroup::Cpu, SystemGroup::Gpu, SystemGroup::Memory]);
    assert_eq!(result.groups[&SystemGroup::Cpu].len(), 2);
    assert_eq!(result.series_count(), 4);
    assert_eq!(result.get("run-a", "gpu/0/util").unwrap().ys(), vec![90.0, 89.0, 88.0, 87.0, 86.0]);
    assert_eq!(result.colors["run-a"], explorer.color_of("run-a").unwrap());
    assert_eq!(explorer.store().system_loads.load(Ordering::SeqCst), 2);
    assert_eq!(explorer.store().point_loads(), 0);

    let io = explorer.store().total_io();
    let again = explorer.query_system(&both_runs()).await;
    assert_eq!(explorer.store().total_io(), io);
    assert_eq!(again, result);

    let smoothed = both_runs().options(SeriesOptions {
        axis: AxisMode::WallTime,
        smoothing: SmoothingLevel::new(2).unwrap(),
        ..SeriesOptions::default()
    });
    let wall = explorer.query_system(&smoothed).await;
    assert_eq!(explorer.store().total_io(), io);
    assert_eq!(wall.get("run-b", "cpu_percent").unwrap().xs()[0], 2000.0);

    explorer.refresh().await;
    explorer.query_system(&both_runs()).await;
    assert_eq!(explorer.store().system_loads.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_system_query_failures() {
    let explorer = create_explorer();
    add_system_logs(&explorer);
    explorer.store().inner.mark_corrupt("mnist", "run-b");

    let result = explorer.query_system(&both_runs()).await;
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].kind, WarningKind::StoreCorrupt);
    assert_eq!(result.warnings[0].run_id.as_deref(), Some("run-b"));
    assert_eq!(result.series_count(), 3);

    let missing = explorer
        .query_system(&QueryRequest::new("cifar", &["run-a", "run-b"]))
        .await;
    assert!(missing.is_empty());
    assert!(missing.is_no_data());
    assert_eq!(missing.warnings.len(), 1);
}

#[tokio::test]
async fn test_system_query_without_samples_is_empty() {
    let explorer = create_explorer();
    let result = explorer.query_system(&both_runs()).await;

    assert!(result.is_empty());
    assert!(result.warnings.is_empty());
    assert_eq!(result.colors.len(), 2);
}
