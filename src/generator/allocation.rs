//! Weighted allocation of a total count to buckets

use rand::Rng;
use rand_distr::StandardNormal;

/// Relative spread of bucket weights
const WEIGHT_SIGMA: f64 = 0.35;

/// Weights never drop below this, so every bucket can still receive items
const WEIGHT_FLOOR: f64 = 0.05;

/// Split `total` items over `buckets` buckets with Gaussian weights.
///
/// Counts start as rounded weighted shares and are then rebalanced one unit
/// at a time (largest deficit first, lowest index on ties) until they sum to
/// `total`, or to `buckets * cap` when a cap makes `total` unreachable.
pub fn allocate<R: Rng>(rng: &mut R, total: usize, buckets: usize, cap: Option<usize>) -> Vec<usize> {
    if buckets == 0 {
        return Vec::new();
    }
    let cap = cap.unwrap_or(usize::MAX);
    let total = total.min(cap.saturating_mul(buckets));

    let weights: Vec<f64> = (0..buckets)
        .map(|_| {
            let z: f64 = rng.sample(StandardNormal);
            (1.0 + WEIGHT_SIGMA * z).max(WEIGHT_FLOOR)
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    let raw: Vec<f64> = weights.iter().map(|w| total as f64 * w / sum).collect();
    let mut counts: Vec<usize> = raw.iter().map(|r| (r.round() as usize).min(cap)).collect();

    let mut assigned: usize = counts.iter().sum();
    while assigned < total {
        let i = pick(&raw, &counts, |c| c < cap, |r, c| r - c as f64);
        counts[i] += 1;
        assigned += 1;
    }
    while assigned > total {
        let i = pick(&raw, &counts, |c| c > 0, |r, c| c as f64 - r);
        counts[i] -= 1;
        assigned -= 1;
    }
    counts
}

fn pick<E, S>(raw: &[f64], counts: &[usize], eligible: E, score: S) -> usize
where
    E: Fn(usize) -> bool,
    S: Fn(f64, usize) -> f64,
{
    let mut best = None;
    let mut best_score = f64::NEG_INFINITY;
    for (i, (&r, &c)) in raw.iter().zip(counts).enumerate() {
        if !eligible(c) {
            continue;
        }
        let s = score(r, c);
        if s > best_score {
            best_score = s;
            best = Some(i);
        }
    }
    // The caller only asks while an eligible bucket exists
    best.unwrap_or(0)
}
