//! Series derivation: axis selection, log-scale filtering, smoothing
//!
//! ## Pipeline
//!
//! ```text
//! raw DataPoints ─→ x per AxisMode ─→ drop non-finite ─→ drop ≤ 0 on log axes
//!                ─→ stable sort by x ─→ smooth y ─→ downsample ─→ Series
//! ```
//!
//! The transformer never moves x values and never reorders points with equal
//! x, so a smoothed series covers exactly the x-domain of its input.

mod smoothing;

pub use smoothing::{binomial_kernel, downsample_indices, passes, smooth_in_place, KERNEL_CUTOFF};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::MAX_SMOOTHING;
use crate::experiment::DataPoint;
use crate::{Error, Result};

/// X-axis semantics of a plotted series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum AxisMode {
    /// x = training step
    #[default]
    Step,
    /// x = seconds since the run started
    RelativeTime,
    /// x = absolute wall-clock seconds since the epoch
    WallTime,
}

impl AxisMode {
    /// All axis modes in control-panel order.
    pub const ALL: [Self; 3] = [Self::Step, Self::RelativeTime, Self::WallTime];

    /// Axis label for plot rendering.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Step => "Step",
            Self::RelativeTime => "Relative Time (s)",
            Self::WallTime => "Wall Time",
        }
    }

    /// Short identifier used on the command line and in config files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Step => "step",
            Self::RelativeTime => "relative",
            Self::WallTime => "wall",
        }
    }
}

impl fmt::Display for AxisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AxisMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "step" => Ok(Self::Step),
            "relative" | "relative_time" | "relative-time" => Ok(Self::RelativeTime),
            "wall" | "wall_time" | "wall-time" => Ok(Self::WallTime),
            _ => Err(Error::UnknownAxisMode(s.to_string())),
        }
    }
}

/// Smoothing strength in `0..=20`; 0 is raw data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SmoothingLevel(u8);

impl SmoothingLevel {
    /// Raw data, no smoothing.
    pub const NONE: Self = Self(0);

    /// Strongest smoothing.
    pub const MAX: Self = Self(MAX_SMOOTHING);

    /// Validate a smoothing level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSmoothing`] when `level > 20`.
    pub const fn new(level: u8) -> Result<Self> {
        if level > MAX_SMOOTHING {
            Err(Error::InvalidSmoothing(level))
        } else {
            Ok(Self(level))
        }
    }

    /// Clamp any integer into the valid range.
    #[must_use]
    pub const fn saturating(level: u8) -> Self {
        if level > MAX_SMOOTHING {
            Self::MAX
        } else {
            Self(level)
        }
    }

    /// Get the raw level.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// True for level 0.
    #[must_use]
    pub const fn is_identity(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u8> for SmoothingLevel {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self> {
        Self::new(level)
    }
}

impl FromStr for SmoothingLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim().parse::<u8>().map_or_else(
            |_| Err(Error::Config(format!("smoothing level '{s}' is not an integer in 0..={MAX_SMOOTHING}"))),
            Self::new,
        )
    }
}

impl From<SmoothingLevel> for u8 {
    fn from(level: SmoothingLevel) -> Self {
        level.0
    }
}

/// Everything that shapes a series besides its raw points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SeriesOptions {
    /// X-axis semantics
    pub axis: AxisMode,
    /// Smoothing strength
    pub smoothing: SmoothingLevel,
    /// Log-scale x axis (points with x ≤ 0 are excluded)
    pub log_x: bool,
    /// Log-scale y axis (points with y ≤ 0 are excluded)
    pub log_y: bool,
    /// Downsample to roughly this many points after smoothing
    pub max_points: Option<usize>,
}

impl SeriesOptions {
    /// Options with the given axis and defaults elsewhere.
    #[must_use]
    pub fn with_axis(axis: AxisMode) -> Self {
        Self {
            axis,
            ..Self::default()
        }
    }
}

/// One render-ready `(x, y)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Position on the selected axis
    pub x: f64,
    /// Value after smoothing
    pub y: f64,
}

/// Render-ready series for one (run, metric).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    axis: AxisMode,
    points: Vec<SeriesPoint>,
    excluded_by_log: usize,
}

impl Series {
    /// Get the axis mode the x values were derived with.
    #[must_use]
    pub const fn axis(&self) -> AxisMode {
        self.axis
    }

    /// Get the points, ordered by x ascending.
    #[must_use]
    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when no point survived the transform.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points removed because their value on a log-scaled axis was ≤ 0.
    #[must_use]
    pub const fn excluded_by_log(&self) -> usize {
        self.excluded_by_log
    }

    /// X values in order.
    #[must_use]
    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    /// Y values in order.
    #[must_use]
    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    /// Last point, the value shown next to a legend entry.
    #[must_use]
    pub fn last(&self) -> Option<SeriesPoint> {
        self.points.last().copied()
    }

    /// Smallest and largest x, if any.
    #[must_use]
    pub fn x_range(&self) -> Option<(f64, f64)> {
        Some((self.points.first()?.x, self.points.last()?.x))
    }
}

/// Derive a series from raw points.
///
/// `run_start` is the run's recorded start time; for
/// [`AxisMode::RelativeTime`] without one, the first point's wall time is
/// the origin.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn transform(raw: &[DataPoint], options: &SeriesOptions, run_start: Option<f64>) -> Series {
    let origin = match options.axis {
        AxisMode::RelativeTime => run_start
            .or_else(|| raw.first().map(DataPoint::wall_time))
            .unwrap_or(0.0),
        AxisMode::Step | AxisMode::WallTime => 0.0,
    };

    let mut excluded_by_log = 0;
    let mut points: Vec<SeriesPoint> = Vec::with_capacity(raw.len());
    for point in raw {
        let x = match options.axis {
            AxisMode::Step => point.step() as f64,
            AxisMode::RelativeTime => point.wall_time() - origin,
            AxisMode::WallTime => point.wall_time(),
        };
        let y = point.value();
        if !x.is_finite() || !y.is_finite() {
            continue;
        }
        if (options.log_x && x <= 0.0) || (options.log_y && y <= 0.0) {
            excluded_by_log += 1;
            continue;
        }
        points.push(SeriesPoint { x, y });
    }

    // Stable: equal x keeps storage order
    points.sort_by(|a, b| a.x.total_cmp(&b.x));

    if !options.smoothing.is_identity() {
        let mut ys: Vec<f64> = points.iter().map(|p| p.y).collect();
        smooth_in_place(&mut ys, options.smoothing);
        for (point, y) in points.iter_mut().zip(ys) {
            point.y = y;
        }
    }

    if let Some(max_points) = options.max_points {
        if points.len() > max_points {
            points = downsample_indices(points.len(), max_points)
                .into_iter()
                .map(|i| points[i])
                .collect();
        }
    }

    Series {
        axis: options.axis,
        points,
        excluded_by_log,
    }
}
