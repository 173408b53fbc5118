//! Experiment records read from project databases
//!
//! ## Schema Overview
//!
//! ```text
//! Project (<root>/<project>.db)
//!    └──< RunRecord (N)
//!              ├──< metric name ──< DataPoint (N) [time-series]
//!              └──< SystemLog (N) [hardware samples, many readings each]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use trackio_metrics::experiment::{DataPoint, RunRecord};
//!
//! let run = RunRecord::builder("run-001", "mnist")
//!     .start_time(1_700_000_000.0)
//!     .build();
//!
//! let point = DataPoint::new(0, 1_700_000_001.0, 0.5);
//! assert!(point.wall_time() > run.start_time().unwrap());
//! ```

mod data_point;
mod run_record;
mod system_log;

pub use data_point::DataPoint;
pub use run_record::{RunRecord, RunRecordBuilder};
pub use system_log::{system_metric_names, system_points, SystemLog, SYSTEM_LOG_TIME_KEYS};

pub(crate) use run_record::epoch_seconds_to_utc;
