//! Sample emission filters
//!
//! A trajectory row becomes a sparse list of samples. The deadband filter
//! always emits the first step, then emits a step only when it moves more than
//! `delta` away from the last emitted value. Interval sampling keeps every
//! `n`-th step regardless of value.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// One emitted sample: point position, base step and value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmittedSample {
    pub point: usize,
    pub step: u32,
    pub value: f64,
}

/// Apply the deadband filter to one row, appending samples to `out`.
pub fn deadband_row(point: usize, row: ArrayView1<f64>, delta: f64, out: &mut Vec<EmittedSample>) {
    let mut last: Option<f64> = None;
    for (step, &value) in row.iter().enumerate() {
        let emit = match last {
            None => true,
            Some(prev) => (value - prev).abs() > delta,
        };
        if emit {
            out.push(EmittedSample {
                point,
                step: step as u32,
                value,
            });
            last = Some(value);
        }
    }
}

/// Keep every `interval`-th step of a row.
pub fn interval_row(point: usize, row: ArrayView1<f64>, interval: u32, out: &mut Vec<EmittedSample>) {
    let interval = interval.max(1) as usize;
    out.extend(
        row.iter()
            .enumerate()
            .step_by(interval)
            .map(|(step, &value)| EmittedSample {
                point,
                step: step as u32,
                value,
            }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_deadband_emits_first_and_large_moves() {
        let row = array![20.0, 20.1, 20.15, 20.5, 20.4, 19.9];
        let mut out = Vec::new();
        deadband_row(3, row.view(), 0.2, &mut out);
        let steps: Vec<u32> = out.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![0, 3, 5]);
        assert!(out.iter().all(|s| s.point == 3));
    }

    #[test]
    fn test_deadband_on_binary_signal_emits_transitions() {
        let row = array![0.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        let mut out = Vec::new();
        deadband_row(0, row.view(), 0.5, &mut out);
        let steps: Vec<u32> = out.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![0, 2, 5]);
    }

    #[test]
    fn test_deadband_is_strict() {
        let row = array![1.0, 1.5, 2.0];
        let mut out = Vec::new();
        deadband_row(0, row.view(), 0.5, &mut out);
        // 1.5 is exactly delta away and is dropped; 2.0 exceeds it
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].step, 2);
    }

    #[test]
    fn test_interval_sampling() {
        let row = ndarray::Array1::from_iter((0..40).map(|v| v as f64));
        let mut out = Vec::new();
        interval_row(1, row.view(), 15, &mut out);
        let steps: Vec<u32> = out.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![0, 15, 30]);
    }
}
