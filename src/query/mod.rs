//! Query execution
//!
//! Templates come from the on-disk query library, bindings from the
//! parameter generator. Each query runs warmup and measurement rounds per
//! variant; its record concatenates the measured latencies of all variants.

pub mod executor;
pub mod library;
pub mod stats;

use serde::{Deserialize, Serialize};

pub use executor::QueryExecutor;
pub use library::{QueryLibrary, QueryTemplate};
pub use stats::{percentile, LatencyStats};

/// Measurements of one query across all of its variants
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: String,
    pub name: String,
    pub hybrid: bool,
    pub variants: usize,
    /// Every measured latency, variant after variant
    pub latencies_ms: Vec<f64>,
    /// Row count of each measured execution, parallel to `latencies_ms`
    pub rows: Vec<u64>,
    pub errors: Vec<String>,
    pub stats: LatencyStats,
}

impl QueryRecord {
    pub fn new(template: &QueryTemplate) -> Self {
        Self {
            query_id: template.id.clone(),
            name: template.name.clone(),
            hybrid: template.is_hybrid(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, latency_ms: f64, rows: u64) {
        self.latencies_ms.push(latency_ms);
        self.rows.push(rows);
    }

    pub fn finish(&mut self) {
        self.stats = LatencyStats::from_samples(&self.latencies_ms);
    }

    /// Rows returned by the first measured execution
    pub fn row_count(&self) -> Option<u64> {
        self.rows.first().copied()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// p95 over every measured latency of every query
pub fn global_p95(records: &[QueryRecord]) -> f64 {
    let mut all: Vec<f64> = records.iter().flat_map(|r| r.latencies_ms.iter().copied()).collect();
    all.sort_by(|a, b| a.total_cmp(b));
    percentile(&all, 95.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_p95_spans_queries() {
        let mut a = QueryRecord::default();
        let mut b = QueryRecord::default();
        for v in 1..=10 {
            a.record(v as f64, 1);
        }
        for v in 11..=20 {
            b.record(v as f64, 1);
        }
        let p95 = global_p95(&[a, b]);
        assert!((p95 - 19.05).abs() < 1e-9);
    }

    #[test]
    fn test_record_keeps_rows_parallel() {
        let mut r = QueryRecord::default();
        r.record(2.0, 7);
        r.record(4.0, 7);
        r.finish();
        assert_eq!(r.row_count(), Some(7));
        assert_eq!(r.stats.mean_ms, 3.0);
        assert!(!r.has_errors());
    }
}
