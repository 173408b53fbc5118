//! Metric grouping and filtering
//!
//! Metrics are grouped by the first `/`-separated segment of their name:
//! `train/loss` and `train/acc` share the `train` group, `lr` is ungrouped.
//! System metrics are grouped by hardware category instead, see
//! [`SystemGroup`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between a metric's group prefix and the rest of its name.
pub const GROUP_SEPARATOR: char = '/';

/// Display name of the ungrouped bucket.
pub const UNGROUPED_LABEL: &str = "other";

/// Group a metric belongs to.
///
/// Ordering puts every named prefix (alphabetically) before `Ungrouped`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricGroup {
    /// Metrics sharing a name prefix
    Prefix(String),
    /// Metrics without a prefix
    Ungrouped,
}

impl MetricGroup {
    /// Group of a single metric name.
    #[must_use]
    pub fn of(metric_name: &str) -> Self {
        match metric_name.split_once(GROUP_SEPARATOR) {
            Some((prefix, _)) if !prefix.is_empty() => Self::Prefix(prefix.to_string()),
            _ => Self::Ungrouped,
        }
    }

    /// Heading shown above the group's plots.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Prefix(prefix) => prefix,
            Self::Ungrouped => UNGROUPED_LABEL,
        }
    }
}

impl fmt::Display for MetricGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Group metric names by prefix.
pub fn group_metrics<I, S>(metric_names: I) -> BTreeMap<MetricGroup, BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut groups: BTreeMap<MetricGroup, BTreeSet<String>> = BTreeMap::new();
    for name in metric_names {
        let name = name.as_ref();
        groups
            .entry(MetricGroup::of(name))
            .or_default()
            .insert(name.to_string());
    }
    groups
}

/// Hardware category of a system metric.
///
/// Ordering follows the category labels alphabetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SystemGroup {
    /// Processor load and frequency
    Cpu,
    /// Disk usage and I/O
    Disk,
    /// Accelerator utilization and memory
    Gpu,
    /// Host memory
    Memory,
    /// Network throughput
    Network,
    /// Anything not recognised
    Other,
    /// Sensor temperatures
    Temperature,
}

/// Name fragments per category, checked in this order; the first hit wins.
const SYSTEM_CATEGORIES: [(SystemGroup, &[&str]); 6] = [
    (SystemGroup::Cpu, &["cpu", "processor"]),
    (SystemGroup::Memory, &["memory", "ram", "mem"]),
    (SystemGroup::Gpu, &["gpu", "cuda", "nvidia"]),
    (SystemGroup::Disk, &["disk", "io", "storage"]),
    (SystemGroup::Network, &["network", "net", "bandwidth"]),
    (SystemGroup::Temperature, &["temp", "temperature"]),
];

impl SystemGroup {
    /// Every category, in display order.
    pub const ALL: [Self; 7] = [
        Self::Cpu,
        Self::Disk,
        Self::Gpu,
        Self::Memory,
        Self::Network,
        Self::Other,
        Self::Temperature,
    ];

    /// Category of a system metric name, by case-insensitive substring.
    ///
    /// `gpu/0/memory` lands in [`SystemGroup::Memory`]: memory is checked
    /// before GPU.
    #[must_use]
    pub fn of(metric_name: &str) -> Self {
        let name = metric_name.to_lowercase();
        SYSTEM_CATEGORIES
            .iter()
            .find(|(_, fragments)| fragments.iter().any(|fragment| name.contains(fragment)))
            .map_or(Self::Other, |(group, _)| *group)
    }

    /// Heading shown above the category's plots.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::Disk => "Disk",
            Self::Gpu => "GPU",
            Self::Memory => "Memory",
            Self::Network => "Network",
            Self::Other => "Other",
            Self::Temperature => "Temperature",
        }
    }
}

impl fmt::Display for SystemGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Group system metric names by hardware category; empty categories are absent.
pub fn group_system_metrics<I, S>(metric_names: I) -> BTreeMap<SystemGroup, BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut groups: BTreeMap<SystemGroup, BTreeSet<String>> = BTreeMap::new();
    for name in metric_names {
        let name = name.as_ref();
        groups
            .entry(SystemGroup::of(name))
            .or_default()
            .insert(name.to_string());
    }
    groups
}

/// Case-insensitive substring match; an empty pattern matches everything.
#[must_use]
pub fn matches_filter(metric_name: &str, pattern: &str) -> bool {
    let pattern = pattern.trim();
    pattern.is_empty() || metric_name.to_lowercase().contains(&pattern.to_lowercase())
}

/// Keep the metric names matching `pattern`, preserving input order.
#[must_use]
pub fn filter_metrics<'a>(metric_names: &'a [String], pattern: &str) -> Vec<&'a str> {
    metric_names
        .iter()
        .map(String::as_str)
        .filter(|name| matches_filter(name, pattern))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_group_by_first_segment() {
        let groups = group_metrics(["train/loss", "train/acc", "val/loss", "lr"]);

        assert_eq!(groups.len(), 3);
        assert_eq!(
            groups[&MetricGroup::Prefix("train".into())],
            set(&["train/loss", "train/acc"])
        );
        assert_eq!(groups[&MetricGroup::Prefix("val".into())], set(&["val/loss"]));
        assert_eq!(groups[&MetricGroup::Ungrouped], set(&["lr"]));
    }

    #[test]
    fn test_only_first_separator_counts() {
        assert_eq!(
            MetricGroup::of("optimization/grad/norm"),
            MetricGroup::Prefix("optimization".into())
        );
    }

    #[test]
    fn test_empty_prefix_is_ungrouped() {
        assert_eq!(MetricGroup::of("/loss"), MetricGroup::Ungrouped);
        assert_eq!(MetricGroup::of("loss"), MetricGroup::Ungrouped);
        assert_eq!(MetricGroup::of("train/"), MetricGroup::Prefix("train".into()));
    }

    #[test]
    fn test_ungrouped_sorts_last() {
        let groups = group_metrics(["lr", "val/loss", "train/loss"]);
        let order: Vec<&str> = groups.keys().map(MetricGroup::label).collect();
        assert_eq!(order, vec!["train", "val", "other"]);
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let names: Vec<String> = ["train/loss", "train/Accuracy", "val/loss"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();

        assert_eq!(filter_metrics(&names, "LOSS"), vec!["train/loss", "val/loss"]);
        assert_eq!(filter_metrics(&names, "acc"), vec!["train/Accuracy"]);
        assert_eq!(filter_metrics(&names, "").len(), 3);
        assert!(filter_metrics(&names, "gradient").is_empty());
    }

    #[test]
    fn test_system_categories() {
        assert_eq!(SystemGroup::of("cpu_percent"), SystemGroup::Cpu);
        assert_eq!(SystemGroup::of("Processor/freq"), SystemGroup::Cpu);
        assert_eq!(SystemGroup::of("ram_used"), SystemGroup::Memory);
        assert_eq!(SystemGroup::of("gpu/0/util"), SystemGroup::Gpu);
        assert_eq!(SystemGroup::of("NVIDIA_power"), SystemGroup::Gpu);
        assert_eq!(SystemGroup::of("disk_read"), SystemGroup::Disk);
        assert_eq!(SystemGroup::of("bandwidth_tx"), SystemGroup::Network);
        assert_eq!(SystemGroup::of("sensor_temp"), SystemGroup::Temperature);
        assert_eq!(SystemGroup::of("uptime"), SystemGroup::Other);
    }

    #[test]
    fn test_system_category_precedence() {
        assert_eq!(SystemGroup::of("gpu/0/memory"), SystemGroup::Memory);
        assert_eq!(SystemGroup::of("cpu_temp"), SystemGroup::Cpu);
        assert_eq!(SystemGroup::of("network_io"), SystemGroup::Disk);
    }

    #[test]
    fn test_group_system_metrics_sorted_by_label() {
        let groups = group_system_metrics(["uptime", "gpu/0/util", "cpu", "ram", "gpu/1/util"]);
        let order: Vec<&str> = groups.keys().map(|group| group.label()).collect();
        assert_eq!(order, vec!["CPU", "GPU", "Memory", "Other"]);
        assert_eq!(groups[&SystemGroup::Gpu], set(&["gpu/0/util", "gpu/1/util"]));

        let mut labels: Vec<&str> = SystemGroup::ALL.iter().map(|group| group.label()).collect();
        let declared = labels.clone();
        labels.sort_unstable();
        assert_eq!(labels, declared);
    }
}
