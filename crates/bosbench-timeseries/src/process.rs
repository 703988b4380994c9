//! Vectorised stochastic processes
//!
//! Every function here advances all rows of a matrix together: the time loop
//! is the only loop, and each step is a set of array-wide operations over the
//! point axis. Matrices have shape `(n_points, n_steps)`.

use ndarray::{Array1, Array2, ArrayView2, Axis, Zip};

use crate::point_type::{TypeParams, ALARM_CLEAR_PROBABILITY, ALARM_RAISE_PROBABILITY, METER_NOISE};

/// Length of one base step in hours.
pub const STEP_HOURS: f64 = 1.0 / 60.0;

/// Per-point coefficients of the exact OU update.
#[derive(Debug, Clone)]
pub struct OuCoefficients {
    pub mean: Array1<f64>,
    pub decay: Array1<f64>,
    pub noise: Array1<f64>,
    pub lower: Array1<f64>,
    pub upper: Array1<f64>,
}

impl OuCoefficients {
    /// Build coefficients for a batch of points.
    ///
    /// `offsets` are unit-interval draws in `[-1, 1]` that shift each point's
    /// mean by up to its type's spread.
    pub fn new(params: &[TypeParams], offsets: &[f64], dt_hours: f64) -> Self {
        let n = params.len();
        let mut mean = Array1::zeros(n);
        let mut decay = Array1::zeros(n);
        let mut noise = Array1::zeros(n);
        let mut lower = Array1::zeros(n);
        let mut upper = Array1::zeros(n);

        for (i, p) in params.iter().enumerate() {
            let offset = offsets.get(i).copied().unwrap_or(0.0) * p.spread;
            mean[i] = (p.mean + offset).clamp(p.lower, p.upper);
            lower[i] = p.lower;
            upper[i] = p.upper;
            if p.theta > 0.0 {
                decay[i] = (-p.theta * dt_hours).exp();
                noise[i] = ((1.0 - (-2.0 * p.theta * dt_hours).exp()) / (2.0 * p.theta)).sqrt() * p.sigma;
            } else {
                decay[i] = 1.0;
                noise[i] = p.sigma * dt_hours.sqrt();
            }
        }

        Self { mean, decay, noise, lower, upper }
    }
}

/// Exact-step Ornstein–Uhlenbeck trajectories, clamped to bounds after every step.
///
/// `X[n+1] = μ + (X[n] − μ)·e^(−θΔt) + √((1 − e^(−2θΔt))/(2θ))·σ·Z`
pub fn ou_trajectories(gaussian: ArrayView2<f64>, coeffs: &OuCoefficients) -> Array2<f64> {
    let (n_points, n_steps) = gaussian.dim();
    let mut x = Array2::zeros((n_points, n_steps));
    if n_steps == 0 {
        return x;
    }
    x.column_mut(0).assign(&coeffs.mean);

    for t in 1..n_steps {
        let (done, mut rest) = x.view_mut().split_at(Axis(1), t);
        let prev = done.column(t - 1);
        let mut next = rest.column_mut(0);
        Zip::from(&mut next)
            .and(&prev)
            .and(&coeffs.mean)
            .and(&coeffs.decay)
            .and(&coeffs.noise)
            .and(gaussian.column(t))
            .for_each(|out, &p, &mu, &decay, &noise, &z| {
                *out = mu + (p - mu) * decay + noise * z;
            });
        Zip::from(&mut next)
            .and(&coeffs.lower)
            .and(&coeffs.upper)
            .for_each(|out, &lo, &hi| *out = out.clamp(lo, hi));
    }
    x
}

/// Cumulative energy registers.
///
/// Each step consumes `base_rate · max(0, 1 + noise·Z)`, and the register is
/// the running sum, so every row is monotone non-decreasing.
pub fn meter_registers(gaussian: ArrayView2<f64>, base_rates: &Array1<f64>) -> Array2<f64> {
    let mut x = gaussian.mapv(|z| (1.0 + METER_NOISE * z).max(0.0));
    x *= &base_rates.view().insert_axis(Axis(1));
    x.accumulate_axis_inplace(Axis(1), |&prev, curr| *curr += prev);
    x
}

/// Two-state signal from a continuous 0–1 signal thresholded at 0.5.
///
/// A state change is accepted only once the current state has been held for
/// `min_dwell` steps; until then the previous state persists.
pub fn status_states(signal: ArrayView2<f64>, min_dwell: u32) -> Array2<f64> {
    let (n_points, n_steps) = signal.dim();
    let mut out = Array2::zeros((n_points, n_steps));
    if n_steps == 0 {
        return out;
    }

    let mut state: Array1<f64> = signal.column(0).mapv(|v| if v > 0.5 { 1.0 } else { 0.0 });
    let mut held: Array1<u32> = Array1::zeros(n_points);
    out.column_mut(0).assign(&state);

    for t in 1..n_steps {
        Zip::from(&mut state)
            .and(&mut held)
            .and(signal.column(t))
            .for_each(|s, h, &v| {
                let candidate = if v > 0.5 { 1.0 } else { 0.0 };
                *h = h.saturating_add(1);
                if candidate != *s && *h >= min_dwell {
                    *s = candidate;
                    *h = 0;
                }
            });
        out.column_mut(t).assign(&state);
    }
    out
}

/// Bernoulli alarm process driven by a matrix of uniform draws.
pub fn alarm_states(uniform: ArrayView2<f64>) -> Array2<f64> {
    let (n_points, n_steps) = uniform.dim();
    let mut out = Array2::zeros((n_points, n_steps));
    if n_steps == 0 {
        return out;
    }

    let mut state: Array1<f64> = Array1::zeros(n_points);
    for t in 1..n_steps {
        Zip::from(&mut state).and(uniform.column(t)).for_each(|s, &u| {
            if *s == 0.0 && u < ALARM_RAISE_PROBABILITY {
                *s = 1.0;
            } else if *s == 1.0 && u < ALARM_CLEAR_PROBABILITY {
                *s = 0.0;
            }
        });
        out.column_mut(t).assign(&state);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point_type::PointType;
    use ndarray::array;

    #[test]
    fn test_ou_without_noise_stays_at_mean() {
        let params = vec![PointType::Temperature.params(); 3];
        let coeffs = OuCoefficients::new(&params, &[0.0, 0.5, -0.5], STEP_HOURS);
        let z = Array2::<f64>::zeros((3, 50));
        let x = ou_trajectories(z.view(), &coeffs);
        for i in 0..3 {
            for t in 0..50 {
                assert!((x[[i, t]] - coeffs.mean[i]).abs() < 1e-12);
            }
        }
        assert!((coeffs.mean[1] - 22.5).abs() < 1e-12);
    }

    #[test]
    fn test_ou_reverts_towards_mean() {
        let params = vec![PointType::Temperature.params()];
        let coeffs = OuCoefficients::new(&params, &[0.0], 1.0);
        let mut z = Array2::<f64>::zeros((1, 20));
        z[[0, 1]] = 10.0;
        let x = ou_trajectories(z.view(), &coeffs);
        let kick = (x[[0, 1]] - coeffs.mean[0]).abs();
        let later = (x[[0, 19]] - coeffs.mean[0]).abs();
        assert!(kick > 0.0);
        assert!(later < kick);
    }

    #[test]
    fn test_ou_clamps_to_bounds() {
        let params = vec![PointType::Position.params()];
        let coeffs = OuCoefficients::new(&params, &[0.0], STEP_HOURS);
        let z = Array2::from_elem((1, 10), 1e6);
        let x = ou_trajectories(z.view(), &coeffs);
        assert!(x.iter().all(|v| (0.0..=100.0).contains(v)));
        assert_eq!(x[[0, 9]], 100.0);
    }

    #[test]
    fn test_meter_registers_are_monotone() {
        let z = array![[0.0, -20.0, 3.0, 0.5], [1.0, 1.0, -1.0, 0.0]];
        let rates = array![1.0, 2.0];
        let x = meter_registers(z.view(), &rates);
        for row in x.rows() {
            for w in row.as_slice().unwrap().windows(2) {
                assert!(w[1] >= w[0]);
            }
        }
        assert!((x[[0, 0]] - 1.0).abs() < 1e-12);
        // A strongly negative draw consumes nothing
        assert!((x[[0, 1]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_status_respects_dwell() {
        let signal = array![[0.9, 0.1, 0.1, 0.9, 0.1, 0.1, 0.1]];
        let s = status_states(signal.view(), 3);
        assert_eq!(s.row(0).to_vec(), vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);

        let s = status_states(signal.view(), 1);
        assert_eq!(s.row(0).to_vec(), vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_alarm_transitions() {
        let u = array![[0.5, 0.0001, 0.9, 0.01, 0.9]];
        let a = alarm_states(u.view());
        assert_eq!(a.row(0).to_vec(), vec![0.0, 1.0, 1.0, 0.0, 0.0]);
    }
}
