//! Latency statistics

use serde::{Deserialize, Serialize};

/// Linear-interpolated percentile of an ascending slice
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let idx = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = idx - lower as f64;
        (1.0 - frac) * sorted[lower] + frac * sorted[upper]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl LatencyStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Self {
            count: sorted.len(),
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            mean_ms: sorted.iter().sum::<f64>() / sorted.len() as f64,
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles_interpolate() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 10.0);
        assert!((percentile(&sorted, 50.0) - 5.5).abs() < 1e-9);
        assert!((percentile(&sorted, 95.0) - 9.55).abs() < 1e-9);
    }

    #[test]
    fn test_stats_from_unsorted_samples() {
        let stats = LatencyStats::from_samples(&[30.0, 10.0, 20.0]);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.p50_ms, 20.0);
        assert_eq!(stats.mean_ms, 20.0);
        assert_eq!((stats.min_ms, stats.max_ms), (10.0, 30.0));
    }

    #[test]
    fn test_empty_samples() {
        assert_eq!(LatencyStats::from_samples(&[]), LatencyStats::default());
        assert_eq!(percentile(&[], 95.0), 0.0);
    }
}
