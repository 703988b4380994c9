//! Adaptive batch sizing with stall detection
//!
//! Keeps the latencies of the last `window` batches. A batch slower than
//! `stall_factor` × the window mean is a stall: the batch size halves (never
//! below the floor) and the window restarts. While the window is empty after
//! a stall, batches are compared against the mean that was in force when the
//! stall happened, so a run of slow batches keeps counting. More than
//! `max_stalls` consecutive stalls aborts the load.

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::BatchConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchOutcome {
    Normal,
    /// Stall handled; continue with the new size
    Stalled { new_size: usize },
    /// Too many consecutive stalls
    Abort,
}

#[derive(Debug, Clone)]
pub struct AdaptiveBatcher {
    size: usize,
    min_size: usize,
    capacity: usize,
    stall_factor: f64,
    max_stalls: usize,
    window: VecDeque<f64>,
    reference_mean: Option<f64>,
    consecutive_stalls: usize,
    total_stalls: usize,
}

impl AdaptiveBatcher {
    pub fn new(config: &BatchConfig) -> Self {
        let min_size = config.min_size.max(1);
        Self {
            size: config.initial_size.max(min_size),
            min_size,
            capacity: config.window.max(1),
            stall_factor: config.stall_factor,
            max_stalls: config.max_stalls,
            window: VecDeque::with_capacity(config.window.max(1)),
            reference_mean: None,
            consecutive_stalls: 0,
            total_stalls: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn total_stalls(&self) -> usize {
        self.total_stalls
    }

    fn mean(&self) -> Option<f64> {
        if self.window.is_empty() {
            self.reference_mean
        } else {
            Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
        }
    }

    /// Record the latency of the batch just executed.
    pub fn record(&mut self, latency: Duration) -> BatchOutcome {
        let ms = latency.as_secs_f64() * 1000.0;
        let stalled = match self.mean() {
            Some(mean) => mean > 0.0 && ms >= self.stall_factor * mean,
            None => false,
        };

        if !stalled {
            self.consecutive_stalls = 0;
            if self.window.len() == self.capacity {
                self.window.pop_front();
            }
            self.window.push_back(ms);
            return BatchOutcome::Normal;
        }

        self.total_stalls += 1;
        self.consecutive_stalls += 1;
        if self.consecutive_stalls > self.max_stalls {
            return BatchOutcome::Abort;
        }
        self.reference_mean = self.mean();
        self.window.clear();
        self.size = (self.size / 2).max(self.min_size);
        BatchOutcome::Stalled { new_size: self.size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_steady_batches_keep_size() {
        let mut b = AdaptiveBatcher::new(&BatchConfig::default());
        for _ in 0..50 {
            assert_eq!(b.record(ms(10)), BatchOutcome::Normal);
        }
        assert_eq!(b.size(), 1000);
        assert_eq!(b.total_stalls(), 0);
    }

    #[test]
    fn test_slow_batch_halves_size() {
        let mut b = AdaptiveBatcher::new(&BatchConfig::default());
        for _ in 0..5 {
            b.record(ms(10));
        }
        assert_eq!(b.record(ms(60)), BatchOutcome::Stalled { new_size: 500 });
        // recovery resets the consecutive count
        assert_eq!(b.record(ms(10)), BatchOutcome::Normal);
        assert_eq!(b.record(ms(12)), BatchOutcome::Normal);
        assert_eq!(b.size(), 500);
    }

    #[test]
    fn test_size_never_below_floor() {
        let config = BatchConfig {
            initial_size: 150,
            max_stalls: 10,
            ..BatchConfig::default()
        };
        let mut b = AdaptiveBatcher::new(&config);
        b.record(ms(10));
        assert_eq!(b.record(ms(100)), BatchOutcome::Stalled { new_size: 100 });
        assert_eq!(b.record(ms(1000)), BatchOutcome::Stalled { new_size: 100 });
    }

    #[test]
    fn test_consecutive_stalls_abort() {
        let mut b = AdaptiveBatcher::new(&BatchConfig::default());
        b.record(ms(10));
        assert!(matches!(b.record(ms(100)), BatchOutcome::Stalled { .. }));
        assert!(matches!(b.record(ms(100)), BatchOutcome::Stalled { .. }));
        assert!(matches!(b.record(ms(100)), BatchOutcome::Stalled { .. }));
        assert_eq!(b.record(ms(100)), BatchOutcome::Abort);
        assert_eq!(b.size(), 125);
    }

    #[test]
    fn test_first_batch_is_never_a_stall() {
        let mut b = AdaptiveBatcher::new(&BatchConfig::default());
        assert_eq!(b.record(ms(10_000)), BatchOutcome::Normal);
    }
}
