//! Display formatting for legends, axis labels and run tables.

use chrono::{Local, TimeZone};

use crate::experiment::epoch_seconds_to_utc;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const ELLIPSIS: &str = "...";

/// Format epoch seconds as `YYYY-MM-DD HH:MM:SS` in local time.
#[must_use]
pub fn format_timestamp(seconds: f64) -> String {
    format_timestamp_in(seconds, &Local)
}

/// Format epoch seconds as `YYYY-MM-DD HH:MM:SS` in `tz`.
///
/// Timestamps outside the representable range render as `-`.
#[must_use]
pub fn format_timestamp_in<Tz: TimeZone>(seconds: f64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    epoch_seconds_to_utc(seconds).map_or_else(
        || "-".to_string(),
        |utc| utc.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string(),
    )
}

/// Format a duration with one decimal in the largest fitting unit (`s`, `m`, `h`).
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else if seconds < 3600.0 {
        format!("{:.1}m", seconds / 60.0)
    } else {
        format!("{:.1}h", seconds / 3600.0)
    }
}

/// Format a metric value.
///
/// Very small (< 0.01) and very large (> 10000) magnitudes use scientific
/// notation with `precision` mantissa digits; everything else is fixed-point
/// with trailing zeros removed.
#[must_use]
pub fn format_number(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let magnitude = value.abs();
    if magnitude < 0.01 || magnitude > 10_000.0 {
        scientific(value, precision)
    } else {
        let fixed = format!("{value:.precision$}");
        if fixed.contains('.') {
            fixed.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            fixed
        }
    }
}

/// `1.2340e-03` style: signed exponent of at least two digits.
fn scientific(value: f64, precision: usize) -> String {
    let formatted = format!("{value:.precision$e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
        }
        None => formatted,
    }
}

/// Shorten `text` to at most `max_chars` characters, ending in `...` when cut.
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut shortened: String = text.chars().take(keep).collect();
    shortened.push_str(ELLIPSIS);
    shortened
}

/// Pretty-print a run config.
#[must_use]
pub fn format_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
