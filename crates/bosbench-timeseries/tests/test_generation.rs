use bosbench_timeseries::*;

fn run(types: Vec<PointType>, n_steps: usize, budget: usize) -> Vec<EmittedSample> {
    let config = TimeseriesConfig { seed: 42, n_steps, memory_budget_bytes: budget };
    TimeseriesGenerator::new(config, types).unwrap().generate_all().unwrap()
}

fn samples_of(samples: &[EmittedSample], point: usize) -> Vec<EmittedSample> {
    samples.iter().filter(|s| s.point == point).copied().collect()
}

#[test]
fn test_same_seed_same_samples() {
    let types = PointType::ALL.to_vec();
    assert_eq!(run(types.clone(), 2880, usize::MAX), run(types, 2880, usize::MAX));
}

#[test]
fn test_tiny_budget_matches_single_partition() {
    let types: Vec<PointType> = PointType::ALL.iter().cycle().take(30).copied().collect();
    let whole = run(types.clone(), 1440, usize::MAX);
    let one_by_one = run(types, 1440, 1);
    assert_eq!(whole, one_by_one);
}

#[test]
fn test_consecutive_samples_exceed_deadband() {
    let types = vec![PointType::Temperature, PointType::Co2, PointType::Flow, PointType::Pressure];
    let samples = run(types.clone(), 2880, usize::MAX);
    for (i, t) in types.iter().enumerate() {
        let delta = t.deadband();
        let series = samples_of(&samples, i);
        assert!(series.len() > 1, "{t} emitted a single sample");
        for w in series.windows(2) {
            assert!((w[1].value - w[0].value).abs() > delta, "{t}");
        }
    }
}

#[test]
fn test_deadband_reduces_volume() {
    let types = vec![PointType::Temperature; 20];
    let n_steps = 2880;
    let samples = run(types, n_steps, usize::MAX);
    assert!(samples.len() < 20 * n_steps / 2);
}

#[test]
fn test_meters_are_monotone_on_fixed_interval() {
    let types = vec![PointType::Energy; 5];
    let samples = run(types, 1440, usize::MAX);
    for p in 0..5 {
        let series = samples_of(&samples, p);
        assert_eq!(series.len(), 1440 / 15);
        for w in series.windows(2) {
            assert_eq!(w[1].step - w[0].step, 15);
            assert!(w[1].value >= w[0].value);
        }
    }
}

#[test]
fn test_two_state_points_emit_binary_transitions() {
    let types = vec![PointType::Status, PointType::Alarm];
    let samples = run(types, 10_080, usize::MAX);
    for p in 0..2 {
        let series = samples_of(&samples, p);
        assert!(series.iter().all(|s| s.value == 0.0 || s.value == 1.0));
        for w in series.windows(2) {
            assert_ne!(w[0].value, w[1].value);
        }
    }
    let status = samples_of(&samples, 0);
    for w in status.windows(2) {
        assert!(w[1].step - w[0].step >= 15);
    }
}

#[test]
fn test_values_respect_bounds() {
    let types: Vec<PointType> = PointType::ALL.to_vec();
    let samples = run(types.clone(), 4320, usize::MAX);
    for s in &samples {
        let p = types[s.point].params();
        assert!(s.value >= p.lower && s.value <= p.upper, "{:?}", s);
    }
}
