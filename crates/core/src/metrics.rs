//! Prometheus metrics for the scheduling and processing tiers.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};
use serde::Serialize;
use std::path::Path;

/// Products processed by result.
pub static PRODUCTS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("espa_products_processed_total", "Total products processed"),
        &["result"], // "success", "failed"
    )
    .unwrap()
});

/// Per-phase processing duration in seconds.
pub static PROCESSING_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "espa_processing_duration_seconds",
            "Duration of processing phases",
        )
        .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["phase"], // "stage", "science", "customize", "format", "distribute"
    )
    .unwrap()
});

/// Packaging attempts total.
pub static PACKAGING_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("espa_packaging_attempts_total", "Total packaging attempts").unwrap()
});

/// Distribution attempts total.
pub static DISTRIBUTION_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "espa_distribution_attempts_total",
        "Total distribution attempts",
    )
    .unwrap()
});

/// Production API requests by operation and status.
pub static API_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "espa_api_requests_total",
            "Total production API requests",
        ),
        &["operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Products selected per scheduling pass.
pub static PRODUCTS_SELECTED: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "espa_products_selected",
            "Number of products selected per pass",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 100.0, 250.0, 500.0]),
        &[],
    )
    .unwrap()
});

/// Scheduling pass duration in seconds.
pub static PASS_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "espa_pass_duration_seconds",
            "Duration of a full scheduling pass",
        )
        .buckets(vec![1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        &[],
    )
    .unwrap()
});

/// Get all metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(PRODUCTS_PROCESSED.clone()),
        Box::new(PROCESSING_DURATION.clone()),
        Box::new(PACKAGING_ATTEMPTS.clone()),
        Box::new(DISTRIBUTION_ATTEMPTS.clone()),
        Box::new(API_REQUESTS.clone()),
        Box::new(PRODUCTS_SELECTED.clone()),
        Box::new(PASS_DURATION.clone()),
    ]
}

/// Point-in-time resource usage for one product, logged as JSON when
/// resource reporting is enabled.
#[derive(Debug, Serialize)]
pub struct ResourceSnapshot {
    pub current_workdir_size: u64,
    pub peak_memory_usage_kb: Option<u64>,
    pub orderid: String,
    pub product_id: String,
}

impl ResourceSnapshot {
    pub fn capture(work_dir: &Path, order_id: &str, product_id: &str) -> Self {
        Self {
            current_workdir_size: directory_size(work_dir),
            peak_memory_usage_kb: peak_rss_kb(),
            orderid: order_id.to_string(),
            product_id: product_id.to_string(),
        }
    }
}

fn directory_size(path: &Path) -> u64 {
    let mut total = 0;
    let mut stack = vec![path.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.is_dir() {
                stack.push(entry.path());
            } else {
                total += metadata.len();
            }
        }
    }

    total
}

/// Peak resident set size in kB, from /proc on Linux.
fn peak_rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|line| line.starts_with("VmHWM:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register_cleanly() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
    }

    #[test]
    fn test_directory_size_counts_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b"), vec![0u8; 50]).unwrap();

        assert_eq!(directory_size(dir.path()), 150);
    }

    #[test]
    fn test_snapshot_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = ResourceSnapshot::capture(dir.path(), "o1", "p1");
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("current_workdir_size"));
        assert!(json.contains("\"orderid\":\"o1\""));
    }
}
