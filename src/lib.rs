//! # trackio-metrics: Metric Retrieval & Transformation Pipeline
//!
//! **Version**: 0.1.0
//!
//! Loads machine-learning experiment metrics from per-project SQLite files,
//! caches them, and derives the exact series (axis, smoothing, log scale,
//! downsampling) a terminal plot renders.
//!
//! ## Pipeline
//!
//! ```text
//! ViewState ─→ QueryRequest ─→ Explorer ─→ SeriesCache ─┬─ hit
//!                                                       └─ miss ─→ StoreReader ─→ transform
//!                               QueryResult ←─ grouping + colors ←─┘
//! ```
//!
//! ## Design Principles
//!
//! - **Read-only store**: databases are written by the logging side; this
//!   crate never opens them for writing
//! - **Explicit invalidation**: nothing is re-read until
//!   [`Explorer::refresh`](query::Explorer::refresh) bumps the cache
//!   generation
//! - **Partial results**: a missing project or a corrupt run becomes a
//!   warning, never a failed query
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trackio_metrics::cache::SeriesCache;
//! use trackio_metrics::query::{Explorer, QueryRequest};
//! use trackio_metrics::store::SqliteStore;
//! use trackio_metrics::{AxisMode, Config, SeriesOptions};
//!
//! # async fn example() -> trackio_metrics::Result<()> {
//! let config = Config::from_env()?;
//! let explorer = Explorer::new(SqliteStore::from_config(&config), Arc::new(SeriesCache::new()));
//!
//! let request = QueryRequest::new("mnist", &["run-1", "run-2"])
//!     .metric_filter("loss")
//!     .options(SeriesOptions::with_axis(AxisMode::RelativeTime));
//!
//! let result = explorer.query(&request).await;
//! for (group, series) in &result.groups {
//!     println!("{group}: {} series", series.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cache;
pub mod color;
pub mod config;
pub mod error;
pub mod experiment;
pub mod format;
pub mod grouping;
pub mod query;
pub mod state;
pub mod store;
pub mod transform;

pub use config::Config;
pub use error::{Error, Result};
pub use query::{Explorer, QueryRequest, QueryResult, SystemQueryResult};
pub use transform::{AxisMode, Series, SeriesOptions, SmoothingLevel};
