// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Prometheus Metrics Exposition
//!
//! Renders scrape results in the Prometheus text exposition format with
//! `# HELP` and `# TYPE` annotations. The descriptor set is fixed for the
//! lifetime of the process: label *values* come from each scrape, label
//! *names* never change.
//!
//! # Examples
//!
//! ```no_run
//! use avexlib::prometheus::{Exposition, MetricFamily, SERVERS_TOTAL};
//!
//! let mut exposition = Exposition::new();
//! exposition.add(MetricFamily::gauge(&SERVERS_TOTAL, 3.0));
//! println!("{}", exposition.export());
//! // # HELP avigilon_servers_total Number of servers detected.
//! // # TYPE avigilon_servers_total gauge
//! // avigilon_servers_total 3
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prometheus metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    /// A gauge is a metric that represents a single numerical value that can go up and down
    Gauge,
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gauge => write!(f, "gauge"),
        }
    }
}

/// Static description of one exported metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub metric_type: MetricType,
    /// Label dimensions, in the order values are supplied
    pub labels: &'static [&'static str],
}

pub static UP: MetricDescriptor = MetricDescriptor {
    name: "avigilon_up",
    help: "Was the last scrape successful.",
    metric_type: MetricType::Gauge,
    labels: &[],
};

pub static SCRAPE_DURATION: MetricDescriptor = MetricDescriptor {
    name: "avigilon_scrape_duration_seconds",
    help: "Time taken to scrape API.",
    metric_type: MetricType::Gauge,
    labels: &[],
};

pub static SYSTEM_HEALTH: MetricDescriptor = MetricDescriptor {
    name: "avigilon_system_health",
    help: "VMS Health Status (1.0=GOOD, 0.5=WARN, 0.0=BAD).",
    metric_type: MetricType::Gauge,
    labels: &[],
};

pub static SERVERS_TOTAL: MetricDescriptor = MetricDescriptor {
    name: "avigilon_servers_total",
    help: "Number of servers detected.",
    metric_type: MetricType::Gauge,
    labels: &[],
};

pub static CAMERA_UP: MetricDescriptor = MetricDescriptor {
    name: "avigilon_camera_up",
    help: "Connection status.",
    metric_type: MetricType::Gauge,
    labels: &["id", "name", "model", "ip"],
};

pub static CAMERA_HAS_RECORDED_DATA: MetricDescriptor = MetricDescriptor {
    name: "avigilon_camera_has_recorded_data",
    help: "Has recorded data.",
    metric_type: MetricType::Gauge,
    labels: &["id", "name"],
};

pub static CAMERAS_TOTAL: MetricDescriptor = MetricDescriptor {
    name: "avigilon_cameras_total",
    help: "Total cameras grouped by state.",
    metric_type: MetricType::Gauge,
    labels: &["state"],
};

pub static ALARMS_TOTAL: MetricDescriptor = MetricDescriptor {
    name: "avigilon_alarms_total",
    help: "Total alarms grouped by state.",
    metric_type: MetricType::Gauge,
    labels: &["state"],
};

/// Every metric the exporter can emit
pub static DESCRIPTORS: [&MetricDescriptor; 8] = [
    &UP,
    &SCRAPE_DURATION,
    &SYSTEM_HEALTH,
    &SERVERS_TOTAL,
    &CAMERA_UP,
    &CAMERA_HAS_RECORDED_DATA,
    &CAMERAS_TOTAL,
    &ALARMS_TOTAL,
];

/// A single metric sample with optional labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Label key-value pairs
    pub labels: BTreeMap<String, String>,
    /// Metric value
    pub value: f64,
}

/// A complete metric family with metadata and samples
#[derive(Debug, Clone)]
pub struct MetricFamily {
    pub descriptor: &'static MetricDescriptor,
    pub samples: Vec<MetricSample>,
}

impl MetricFamily {
    /// Create an empty family for `descriptor`
    pub fn new(descriptor: &'static MetricDescriptor) -> Self {
        Self {
            descriptor,
            samples: Vec::new(),
        }
    }

    /// Create an unlabeled gauge holding a single value
    pub fn gauge(descriptor: &'static MetricDescriptor, value: f64) -> Self {
        let mut family = Self::new(descriptor);
        family.add_sample(value, &[]);
        family
    }

    /// Add a sample; `label_values` pairs positionally with the descriptor's labels
    pub fn add_sample(&mut self, value: f64, label_values: &[&str]) {
        debug_assert_eq!(
            label_values.len(),
            self.descriptor.labels.len(),
            "label values for {} do not match its dimensions",
            self.descriptor.name
        );
        let labels = self
            .descriptor
            .labels
            .iter()
            .zip(label_values)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.samples.push(MetricSample { labels, value });
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Value of the first sample whose labels contain all of `labels`
    pub fn value_with(&self, labels: &[(&str, &str)]) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| {
                labels
                    .iter()
                    .all(|(k, v)| s.labels.get(*k).map(|x| x.as_str()) == Some(*v))
            })
            .map(|s| s.value)
    }

    /// Format this metric family in Prometheus exposition format
    pub fn format(&self) -> String {
        let name = self.descriptor.name;
        let mut out = String::new();
        out.push_str(&format!("# HELP {} {}\n", name, self.descriptor.help));
        out.push_str(&format!("# TYPE {} {}\n", name, self.descriptor.metric_type));

        for sample in &self.samples {
            if sample.labels.is_empty() {
                out.push_str(&format!("{} {}\n", name, format_value(sample.value)));
            } else {
                let label_str: Vec<String> = sample
                    .labels
                    .iter()
                    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
                    .collect();
                out.push_str(&format!(
                    "{}{{{}}} {}\n",
                    name,
                    label_str.join(","),
                    format_value(sample.value)
                ));
            }
        }

        out
    }
}

/// Ordered collection of metric families produced by one scrape
#[derive(Debug, Clone, Default)]
pub struct Exposition {
    families: Vec<MetricFamily>,
}

impl Exposition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metric family
    pub fn add(&mut self, family: MetricFamily) {
        self.families.push(family);
    }

    /// Look up a family by metric name
    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name() == name)
    }

    /// Export all metrics in Prometheus text exposition format
    ///
    /// Families without samples are skipped entirely.
    pub fn export(&self) -> String {
        let mut output = String::with_capacity(4096);

        output.push_str(&format!(
            "# Avigilon Exporter v{} Prometheus Metrics\n",
            crate::VERSION
        ));

        for family in self.families.iter().filter(|f| !f.samples.is_empty()) {
            output.push_str(&family.format());
        }

        output
    }

    /// Get the content type for Prometheus exposition format
    pub fn content_type() -> &'static str {
        "text/plain; version=0.0.4; charset=utf-8"
    }
}

/// Escape a label value for Prometheus format
fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Format a float value for Prometheus (special handling for NaN, Inf)
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value == value.floor() && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_format() {
        let family = MetricFamily::gauge(&SYSTEM_HEALTH, 0.5);
        let output = family.format();
        assert!(output.contains("# HELP avigilon_system_health VMS Health Status"));
        assert!(output.contains("# TYPE avigilon_system_health gauge"));
        assert!(output.contains("avigilon_system_health 0.5\n"));
    }

    #[test]
    fn test_labeled_metric() {
        let mut family = MetricFamily::new(&CAMERA_UP);
        family.add_sample(1.0, &["cam-1", "Lobby \"East\"", "H5A", "10.0.0.5"]);
        let output = family.format();
        assert!(output.contains(
            "avigilon_camera_up{id=\"cam-1\",ip=\"10.0.0.5\",model=\"H5A\",name=\"Lobby \\\"East\\\"\"} 1\n"
        ));
    }

    #[test]
    fn test_value_with() {
        let mut family = MetricFamily::new(&CAMERAS_TOTAL);
        family.add_sample(3.0, &["CONNECTED"]);
        family.add_sample(1.0, &["DISCONNECTED"]);
        assert_eq!(family.value_with(&[("state", "DISCONNECTED")]), Some(1.0));
        assert_eq!(family.value_with(&[("state", "UNKNOWN")]), None);
    }

    #[test]
    fn test_descriptor_names_unique() {
        let mut names: Vec<&str> = DESCRIPTORS.iter().map(|d| d.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), DESCRIPTORS.len());
        assert!(names.iter().all(|n| n.starts_with("avigilon_")));
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("hello"), "hello");
        assert_eq!(escape_label_value("hello\"world"), "hello\\\"world");
        assert_eq!(escape_label_value("line\nnewline"), "line\\nnewline");
        assert_eq!(escape_label_value("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(0.25), "0.25");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn test_export_skips_empty_families() {
        let mut exposition = Exposition::new();
        exposition.add(MetricFamily::gauge(&UP, 1.0));
        exposition.add(MetricFamily::new(&ALARMS_TOTAL));
        let output = exposition.export();
        assert!(output.contains("avigilon_up 1\n"));
        assert!(!output.contains("avigilon_alarms_total"));
        assert!(exposition.family("avigilon_alarms_total").is_some());
    }
}
