//! Query cache (Phase 1: unbounded, explicit invalidation only)
//!
//! Memoizes Store Reader payloads and derived series bundles. One global
//! generation counter backs every table: [`SeriesCache::invalidate_all`]
//! bumps it, after which every lookup misses until the value is recomputed.
//! Concurrent lookups of the same key share a single computation.
//!
//! A query reads through a [`Pinned`] view fixed at the generation current
//! when it started. If a refresh lands mid-query, the rest of that query
//! still completes and is delivered, but nothing it loads is stored: values
//! read before an invalidation never answer lookups made after it. A query
//! that is merely superseded by another query, without a refresh, stores its
//! results as usual.
//!
//! # Example
//!
//! ```rust
//! use trackio_metrics::cache::{Fingerprint, SeriesBundle, SeriesCache};
//! use trackio_metrics::transform::SeriesOptions;
//!
//! let cache = SeriesCache::new();
//! let fp = Fingerprint::new("mnist", &["run-1"], "train/loss", SeriesOptions::default());
//!
//! cache.put(fp.clone(), SeriesBundle::default());
//! assert!(cache.get(&fp).is_some());
//!
//! cache.invalidate_all();
//! assert!(cache.get(&fp).is_none());
//! ```

mod memo;

pub use memo::{Lookup, MemoTable};

use std::collections::BTreeMap;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHasher;
use tracing::{debug, info};

use crate::experiment::{DataPoint, RunRecord, SystemLog};
use crate::query::QueryWarning;
use crate::transform::{Series, SeriesOptions};
use crate::Error;

/// Memoized store result; failures are cached too, until invalidation.
pub type Loaded<T> = std::result::Result<T, Arc<Error>>;

/// Which kind of series a fingerprint names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// Logged training metrics
    #[default]
    Metrics,
    /// System (hardware) samples
    System,
}

/// Deterministic key for one metric's derived series across a run selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    scope: Scope,
    project: String,
    run_ids: Vec<String>,
    metric: String,
    options: SeriesOptions,
}

impl Fingerprint {
    /// Build a fingerprint for a training metric; run ids are sorted and
    /// deduplicated.
    #[must_use]
    pub fn new<S: AsRef<str>>(
        project: impl Into<String>,
        run_ids: &[S],
        metric: impl Into<String>,
        options: SeriesOptions,
    ) -> Self {
        let mut run_ids: Vec<String> = run_ids.iter().map(|id| id.as_ref().to_string()).collect();
        run_ids.sort();
        run_ids.dedup();
        Self {
            scope: Scope::Metrics,
            project: project.into(),
            run_ids,
            metric: metric.into(),
            options,
        }
    }

    /// Build a fingerprint for a system metric.
    #[must_use]
    pub fn system<S: AsRef<str>>(
        project: impl Into<String>,
        run_ids: &[S],
        metric: impl Into<String>,
        options: SeriesOptions,
    ) -> Self {
        Self {
            scope: Scope::System,
            ..Self::new(project, run_ids, metric, options)
        }
    }

    /// Get the scope.
    #[must_use]
    pub const fn scope(&self) -> Scope {
        self.scope
    }

    /// Get the project name.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Get the sorted run ids.
    #[must_use]
    pub fn run_ids(&self) -> &[String] {
        &self.run_ids
    }

    /// Get the metric name.
    #[must_use]
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Get the series options.
    #[must_use]
    pub const fn options(&self) -> &SeriesOptions {
        &self.options
    }

    /// Stable 64-bit digest, used in logs.
    #[must_use]
    pub fn digest(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Cached result for one fingerprint: a series per run that has the metric,
/// plus the warnings raised while deriving them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesBundle {
    /// Series keyed by run id
    pub series: BTreeMap<String, Arc<Series>>,
    /// Runs skipped and why
    pub warnings: Vec<QueryWarning>,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Current generation
    pub generation: u64,
    /// Lookups served from a current entry
    pub hits: u64,
    /// Lookups that ran a computation
    pub misses: u64,
    /// Lookups that waited on a concurrent computation
    pub joined: u64,
    /// Stored series bundles
    pub series_entries: usize,
    /// Stored raw payloads (run lists, metric names, points, system logs)
    pub raw_entries: usize,
}

type RunsKey = String;
type MetricNamesKey = (String, String);
type PointsKey = (String, String, String);
type SystemLogsKey = (String, String);

/// Session cache shared by the query facade.
///
/// Construct once per session and hand it to
/// [`Explorer`](crate::query::Explorer); nothing else holds its internals.
pub struct SeriesCache {
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    joined: AtomicU64,
    projects: MemoTable<(), Loaded<Arc<[String]>>>,
    runs: MemoTable<RunsKey, Loaded<Arc<[RunRecord]>>>,
    metric_names: MemoTable<MetricNamesKey, Loaded<Arc<[String]>>>,
    points: MemoTable<PointsKey, Loaded<Arc<[DataPoint]>>>,
    system_logs: MemoTable<SystemLogsKey, Loaded<Arc<[SystemLog]>>>,
    series: MemoTable<Fingerprint, Arc<SeriesBundle>>,
}

impl SeriesCache {
    /// Create an empty cache at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            joined: AtomicU64::new(0),
            projects: MemoTable::new(),
            runs: MemoTable::new(),
            metric_names: MemoTable::new(),
            points: MemoTable::new(),
            system_logs: MemoTable::new(),
            series: MemoTable::new(),
        }
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Cached bundle for `fingerprint`, if computed in the current generation.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<SeriesBundle>> {
        let bundle = self.series.get(fingerprint, self.generation());
        if bundle.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        bundle
    }

    /// Store `bundle` under `fingerprint` in the current generation.
    pub fn put(&self, fingerprint: Fingerprint, bundle: SeriesBundle) -> Arc<SeriesBundle> {
        let bundle = Arc::new(bundle);
        self.series
            .put(fingerprint, self.generation(), Arc::clone(&bundle));
        bundle
    }

    /// Make every current entry stale.
    ///
    /// Computations already in flight still complete for their waiters but
    /// their results are not kept.
    pub fn invalidate_all(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.projects.purge_before(generation);
        self.runs.purge_before(generation);
        self.metric_names.purge_before(generation);
        self.points.purge_before(generation);
        self.system_logs.purge_before(generation);
        self.series.purge_before(generation);
        info!(generation, "cache invalidated");
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            generation: self.generation(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            series_entries: self.series.len(),
            raw_entries: self.projects.len()
                + self.runs.len()
                + self.metric_names.len()
                + self.points.len()
                + self.system_logs.len(),
        }
    }

    /// A view fixed at the current generation.
    #[must_use]
    pub fn pin(&self) -> Pinned<'_> {
        Pinned {
            cache: self,
            generation: self.generation(),
        }
    }

    /// Bundle for `fingerprint`, computing it at most once per generation.
    pub async fn get_or_compute<F, Fut>(&self, fingerprint: Fingerprint, compute: F) -> Arc<SeriesBundle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SeriesBundle>,
    {
        self.pin().get_or_compute(fingerprint, compute).await
    }

    /// Memoized project listing.
    pub async fn projects<F, Fut>(&self, load: F) -> Loaded<Arc<[String]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<Vec<String>>>,
    {
        self.pin().projects(load).await
    }

    /// Memoized run listing of `project`.
    pub async fn runs<F, Fut>(&self, project: &str, load: F) -> Loaded<Arc<[RunRecord]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<Vec<RunRecord>>>,
    {
        self.pin().runs(project, load).await
    }

    fn record(&self, lookup: Lookup) {
        let counter = match lookup {
            Lookup::Hit => &self.hits,
            Lookup::Computed => &self.misses,
            Lookup::Joined => &self.joined,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A [`SeriesCache`] view whose lookups all use one generation.
///
/// Obtained from [`SeriesCache::pin`]. Once the cache is invalidated the
/// view keeps answering, but it only reads and stores entries of its own
/// generation, which no later lookup sees.
#[derive(Clone, Copy)]
pub struct Pinned<'a> {
    cache: &'a SeriesCache,
    generation: u64,
}

impl Pinned<'_> {
    /// Generation this view reads and writes.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// True once the cache has been invalidated after this view was taken.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.cache.generation() != self.generation
    }

    /// Bundle for `fingerprint`, computing it at most once per generation.
    pub async fn get_or_compute<F, Fut>(&self, fingerprint: Fingerprint, compute: F) -> Arc<SeriesBundle>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SeriesBundle>,
    {
        let digest = fingerprint.digest();
        let (bundle, lookup) = self
            .cache
            .series
            .get_or_compute(fingerprint, self.generation, &self.cache.generation, move || async move {
                Arc::new(compute().await)
            })
            .await;
        self.cache.record(lookup);
        debug!(digest, ?lookup, runs = bundle.series.len(), "series lookup");
        bundle
    }

    /// Memoized project listing.
    pub async fn projects<F, Fut>(&self, load: F) -> Loaded<Arc<[String]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<Vec<String>>>,
    {
        self.load(&self.cache.projects, (), load).await
    }

    /// Memoized run listing of `project`.
    pub async fn runs<F, Fut>(&self, project: &str, load: F) -> Loaded<Arc<[RunRecord]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<Vec<RunRecord>>>,
    {
        self.load(&self.cache.runs, project.to_string(), load).await
    }

    /// Memoized metric names of one run.
    pub async fn metric_names<F, Fut>(&self, project: &str, run_id: &str, load: F) -> Loaded<Arc<[String]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<Vec<String>>>,
    {
        let key = (project.to_string(), run_id.to_string());
        self.load(&self.cache.metric_names, key, load).await
    }

    /// Memoized raw points of one (run, metric).
    pub async fn points<F, Fut>(
        &self,
        project: &str,
        run_id: &str,
        metric: &str,
        load: F,
    ) -> Loaded<Arc<[DataPoint]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<Vec<DataPoint>>>,
    {
        let key = (project.to_string(), run_id.to_string(), metric.to_string());
        self.load(&self.cache.points, key, load).await
    }

    /// Memoized system samples of one run.
    pub async fn system_logs<F, Fut>(&self, project: &str, run_id: &str, load: F) -> Loaded<Arc<[SystemLog]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<Vec<SystemLog>>>,
    {
        let key = (project.to_string(), run_id.to_string());
        self.load(&self.cache.system_logs, key, load).await
    }

    async fn load<K, T, F, Fut>(&self, table: &MemoTable<K, Loaded<Arc<[T]>>>, key: K, load: F) -> Loaded<Arc<[T]>>
    where
        K: Eq + Hash + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<Vec<T>>>,
    {
        let (value, lookup) = table
            .get_or_compute(key, self.generation, &self.cache.generation, move || async move {
                load().await.map(Arc::from).map_err(Arc::new)
            })
            .await;
        self.cache.record(lookup);
        value
    }
}

impl Default for SeriesCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SeriesCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeriesCache")
            .field("stats", &self.stats())
            .finish()
    }
}
