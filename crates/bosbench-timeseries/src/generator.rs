//! Partitioned trajectory generation
//!
//! Points are processed in the order given, in contiguous partitions sized to
//! fit the memory budget. Each point draws from its own stream in a fixed
//! order (Gaussian row, mean offset, meter base rate, then the uniform row for
//! alarms), so the samples of a point never depend on its neighbours.

use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use rand_distr::StandardNormal;
use tracing::debug;

use crate::deadband::{deadband_row, interval_row, EmittedSample};
use crate::error::{TimeseriesError, TimeseriesResult};
use crate::point_type::{Emission, PointType, METER_BASE_RATE, STATUS_MIN_DWELL_STEPS};
use crate::process::{alarm_states, meter_registers, ou_trajectories, status_states, OuCoefficients, STEP_HOURS};
use crate::rng::point_stream;

/// Deadband applied to two-state signals so that every transition is emitted.
const TRANSITION_DELTA: f64 = 0.5;

/// `f64` buffers of `n_steps` one row holds at peak: the Gaussian matrix, the
/// OU trajectory, the status copy of it and the status states. Alarm rows peak
/// at the Gaussian matrix, their uniform draws, the uniform matrix and the
/// states. Row selections are dropped before the next matrix is built.
pub const PEAK_F64_BUFFERS: usize = 4;

/// Upper bound on the bytes one point holds per base step while its
/// partition is generated: the live `f64` buffers plus one emitted sample per
/// step, counted twice for the per-row lists and the merged output.
pub const BYTES_PER_STEP: usize =
    PEAK_F64_BUFFERS * std::mem::size_of::<f64>() + 2 * std::mem::size_of::<EmittedSample>();

#[derive(Debug, Clone)]
pub struct TimeseriesConfig {
    pub seed: u64,
    /// Number of base steps (minutes) per point.
    pub n_steps: usize,
    /// Upper bound on trajectory memory per partition.
    pub memory_budget_bytes: usize,
}

impl Default for TimeseriesConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_steps: 0,
            memory_budget_bytes: 512 * 1024 * 1024,
        }
    }
}

/// How a row is turned into a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Continuous,
    Status,
    Energy,
    Alarm,
}

impl Class {
    fn of(t: PointType) -> Self {
        match t {
            PointType::Energy => Class::Energy,
            PointType::Status => Class::Status,
            PointType::Alarm => Class::Alarm,
            _ => Class::Continuous,
        }
    }
}

/// Per-point draws that are not part of the Gaussian matrix.
struct PointDraws {
    offset: f64,
    base_rate: f64,
    uniform: Option<Vec<f64>>,
}

pub struct TimeseriesGenerator {
    config: TimeseriesConfig,
    types: Vec<PointType>,
}

impl TimeseriesGenerator {
    pub fn new(config: TimeseriesConfig, types: Vec<PointType>) -> TimeseriesResult<Self> {
        if config.memory_budget_bytes == 0 {
            return Err(TimeseriesError::InvalidConfig(
                "memory budget must be positive".to_string(),
            ));
        }
        Ok(Self { config, types })
    }

    pub fn config(&self) -> &TimeseriesConfig {
        &self.config
    }

    /// Rows that fit in one partition. Always at least one.
    pub fn rows_per_partition(&self) -> usize {
        let per_point = self
            .config
            .n_steps
            .saturating_mul(BYTES_PER_STEP)
            .max(1);
        (self.config.memory_budget_bytes / per_point).max(1)
    }

    /// Contiguous point ranges, in point order.
    pub fn partitions(&self) -> Vec<Range<usize>> {
        let n = self.types.len();
        let size = self.rows_per_partition();
        (0..n)
            .step_by(size)
            .map(|start| start..(start + size).min(n))
            .collect()
    }

    /// Generate the samples of one point range, sorted by `(point, step)`.
    pub fn generate_partition(&self, range: Range<usize>) -> TimeseriesResult<Vec<EmittedSample>> {
        let len = self.types.len();
        if range.end > len {
            return Err(TimeseriesError::PointOutOfRange {
                index: range.end - 1,
                len,
            });
        }
        let n_steps = self.config.n_steps;
        let rows = range.len();
        if rows == 0 || n_steps == 0 {
            return Ok(Vec::new());
        }

        let mut gaussian = Array2::<f64>::zeros((rows, n_steps));
        let mut draws: Vec<PointDraws> = Vec::with_capacity(rows);
        for (local, index) in range.clone().enumerate() {
            let mut rng = point_stream(self.config.seed, index);
            for z in gaussian.row_mut(local).iter_mut() {
                *z = rng.sample(StandardNormal);
            }
            let offset = rng.gen_range(-1.0..=1.0);
            let base_rate = rng.gen_range(METER_BASE_RATE.0..=METER_BASE_RATE.1);
            let uniform = match self.types[index] {
                PointType::Alarm => Some((0..n_steps).map(|_| rng.gen::<f64>()).collect()),
                _ => None,
            };
            draws.push(PointDraws {
                offset,
                base_rate,
                uniform,
            });
        }

        let classes: Vec<Class> = range.clone().map(|i| Class::of(self.types[i])).collect();
        let rows_of = |class: Class| -> Vec<usize> {
            classes
                .iter()
                .enumerate()
                .filter(|(_, c)| **c == class)
                .map(|(i, _)| i)
                .collect()
        };

        let mut per_row: Vec<Vec<EmittedSample>> = vec![Vec::new(); rows];

        // OU-driven rows: continuous signals and the latent signal of status points
        let ou_rows: Vec<usize> = classes
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Class::Continuous | Class::Status))
            .map(|(i, _)| i)
            .collect();
        if !ou_rows.is_empty() {
            let params: Vec<_> = ou_rows
                .iter()
                .map(|&r| self.types[range.start + r].params())
                .collect();
            let offsets: Vec<f64> = ou_rows.iter().map(|&r| draws[r].offset).collect();
            let coeffs = OuCoefficients::new(&params, &offsets, STEP_HOURS);
            let x = {
                let z = gaussian.select(Axis(0), &ou_rows);
                ou_trajectories(z.view(), &coeffs)
            };

            let status_local: Vec<usize> = ou_rows
                .iter()
                .enumerate()
                .filter(|&(_, &r)| classes[r] == Class::Status)
                .map(|(k, _)| k)
                .collect();
            let states = if status_local.is_empty() {
                None
            } else {
                Some(status_states(
                    x.select(Axis(0), &status_local).view(),
                    STATUS_MIN_DWELL_STEPS,
                ))
            };

            let mut status_cursor = 0;
            for (k, &r) in ou_rows.iter().enumerate() {
                let point = range.start + r;
                match (classes[r], states.as_ref()) {
                    (Class::Status, Some(states)) => {
                        deadband_row(point, states.row(status_cursor), TRANSITION_DELTA, &mut per_row[r]);
                        status_cursor += 1;
                    }
                    _ => {
                        let delta = self.types[point].deadband();
                        deadband_row(point, x.row(k), delta, &mut per_row[r]);
                    }
                }
            }
        }

        let energy_rows = rows_of(Class::Energy);
        if !energy_rows.is_empty() {
            let rates = Array1::from_iter(energy_rows.iter().map(|&r| draws[r].base_rate));
            let z = gaussian.select(Axis(0), &energy_rows);
            let registers = meter_registers(z.view(), &rates);
            for (k, &r) in energy_rows.iter().enumerate() {
                let point = range.start + r;
                let interval = match self.types[point].emission() {
                    Emission::Interval(n) => n,
                    _ => 1,
                };
                interval_row(point, registers.row(k), interval, &mut per_row[r]);
            }
        }

        let alarm_rows = rows_of(Class::Alarm);
        if !alarm_rows.is_empty() {
            let mut uniform = Array2::<f64>::zeros((alarm_rows.len(), n_steps));
            for (k, &r) in alarm_rows.iter().enumerate() {
                if let Some(u) = draws[r].uniform.take() {
                    uniform.row_mut(k).assign(&ArrayView1::from(u.as_slice()));
                }
            }
            let states = alarm_states(uniform.view());
            for (k, &r) in alarm_rows.iter().enumerate() {
                deadband_row(range.start + r, states.row(k), TRANSITION_DELTA, &mut per_row[r]);
            }
        }

        let mut samples = Vec::with_capacity(per_row.iter().map(Vec::len).sum());
        for row in per_row {
            samples.extend(row);
        }
        debug!(
            start = range.start,
            end = range.end,
            steps = n_steps,
            samples = samples.len(),
            "generated partition"
        );
        Ok(samples)
    }

    /// Generate every partition in order and hand each batch of samples to `sink`.
    pub fn generate<E, F>(&self, mut sink: F) -> Result<(), E>
    where
        F: FnMut(Vec<EmittedSample>) -> Result<(), E>,
        E: From<TimeseriesError>,
    {
        for range in self.partitions() {
            let samples = self.generate_partition(range)?;
            sink(samples)?;
        }
        Ok(())
    }

    /// Generate all samples into one vector.
    pub fn generate_all(&self) -> TimeseriesResult<Vec<EmittedSample>> {
        let mut all = Vec::new();
        self.generate(|mut batch: Vec<EmittedSample>| -> TimeseriesResult<()> {
            all.append(&mut batch);
            Ok(())
        })?;
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_types(n: usize) -> Vec<PointType> {
        (0..n).map(|i| PointType::ALL[i % PointType::ALL.len()]).collect()
    }

    fn generator(types: Vec<PointType>, n_steps: usize, budget: usize) -> TimeseriesGenerator {
        TimeseriesGenerator::new(
            TimeseriesConfig {
                seed: 42,
                n_steps,
                memory_budget_bytes: budget,
            },
            types,
        )
        .unwrap()
    }

    #[test]
    fn test_partitions_cover_points_contiguously() {
        let g = generator(mixed_types(10), 100, 100 * BYTES_PER_STEP * 3);
        let parts = g.partitions();
        assert_eq!(parts, vec![0..3, 3..6, 6..9, 9..10]);
    }

    #[test]
    fn test_partitioning_does_not_change_output() {
        let whole = generator(mixed_types(23), 300, usize::MAX).generate_all().unwrap();
        let split = generator(mixed_types(23), 300, 300 * BYTES_PER_STEP * 4).generate_all().unwrap();
        assert_eq!(whole, split);
    }

    #[test]
    fn test_output_sorted_by_point_then_step() {
        let samples = generator(mixed_types(15), 200, usize::MAX).generate_all().unwrap();
        for w in samples.windows(2) {
            assert!((w[0].point, w[0].step) < (w[1].point, w[1].step));
        }
    }

    #[test]
    fn test_every_point_emits_its_first_step() {
        let samples = generator(mixed_types(11), 60, usize::MAX).generate_all().unwrap();
        for p in 0..11 {
            assert!(samples.iter().any(|s| s.point == p && s.step == 0), "point {p}");
        }
    }

    #[test]
    fn test_zero_steps_and_zero_points() {
        assert!(generator(mixed_types(5), 0, 1024).generate_all().unwrap().is_empty());
        assert!(generator(Vec::new(), 100, 1024).generate_all().unwrap().is_empty());
    }

    #[test]
    fn test_row_estimate_counts_every_live_buffer() {
        // Gaussian, trajectory, status copy and states, plus the sample lists
        assert_eq!(BYTES_PER_STEP, 4 * 8 + 2 * std::mem::size_of::<EmittedSample>());
        let budget = 512 * 1024 * 1024;
        let g = generator(mixed_types(100_000), 1440, budget);
        let rows = g.rows_per_partition();
        assert_eq!(rows, budget / (1440 * BYTES_PER_STEP));
        assert!(rows * 1440 * BYTES_PER_STEP <= budget);
        assert!((rows + 1) * 1440 * BYTES_PER_STEP > budget);
    }

    #[test]
    fn test_rejects_zero_budget() {
        let err = TimeseriesGenerator::new(
            TimeseriesConfig {
                seed: 1,
                n_steps: 10,
                memory_budget_bytes: 0,
            },
            vec![PointType::Temperature],
        );
        assert!(matches!(err, Err(TimeseriesError::InvalidConfig(_))));
    }

    #[test]
    fn test_out_of_range_partition() {
        let g = generator(mixed_types(3), 10, 1024);
        assert_eq!(
            g.generate_partition(0..4).unwrap_err(),
            TimeseriesError::PointOutOfRange { index: 3, len: 3 }
        );
    }
}
