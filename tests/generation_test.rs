use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use bosbench::export::manifest::sha256_file;
use bosbench::export::pivot;
use bosbench::generator::{generate_structure, PointSeries};
use bosbench::model::{Dataset, Duration, NodeKind, Profile, Relation, Scale};
use tempfile::tempdir;

fn small() -> Profile {
    Profile::new(Scale::Small, Duration::TwoDays)
}

fn sorted_dataset(seed: u64) -> Dataset {
    let mut dataset = generate_structure(&small().counts(), seed).dataset;
    dataset.sort();
    dataset
}

/// Write the three pivot files for `dataset` with a short series; returns digests.
fn write_pivot(dir: &Path, dataset: &Dataset, seed: u64) -> BTreeMap<String, String> {
    pivot::write_nodes(&dir.join("nodes.parquet"), &dataset.nodes).unwrap();
    pivot::write_edges(&dir.join("edges.parquet"), &dataset.edges).unwrap();

    let series = PointSeries::from_dataset(dataset);
    let generator = series.generator(seed, 180, 64 * 1024 * 1024).unwrap();
    let emitted = generator.generate_all().unwrap();
    let mut writer = pivot::TimeseriesWriter::create(&dir.join("timeseries.parquet")).unwrap();
    writer.write(&series.resolve(&emitted)).unwrap();
    writer.finish().unwrap();

    ["nodes.parquet", "edges.parquet", "timeseries.parquet"]
        .iter()
        .map(|name| (name.to_string(), sha256_file(&dir.join(name)).unwrap()))
        .collect()
}

#[test]
fn test_same_seed_gives_identical_pivot() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();

    let first = write_pivot(a.path(), &sorted_dataset(42), 42);
    let second = write_pivot(b.path(), &sorted_dataset(42), 42);
    assert_eq!(first, second);
}

#[test]
fn test_different_seed_changes_the_graph() {
    assert_ne!(sorted_dataset(42), sorted_dataset(43));
}

#[test]
fn test_every_edge_respects_the_schema() {
    let dataset = sorted_dataset(7);
    let kinds: BTreeMap<&str, NodeKind> = dataset.nodes.iter().map(|n| (n.id.as_str(), n.kind)).collect();
    assert_eq!(kinds.len(), dataset.nodes.len(), "node ids must be unique");

    for edge in &dataset.edges {
        let source = kinds[edge.source_id.as_str()];
        let target = kinds[edge.target_id.as_str()];
        assert!(
            edge.relation.allows(source, target),
            "{} -[{}]-> {} is not allowed",
            edge.source_id,
            edge.relation,
            edge.target_id
        );
        assert_ne!(edge.relation, Relation::Measures);
    }
}

#[test]
fn test_counts_follow_the_profile() {
    let counts = small().counts();
    let dataset = sorted_dataset(42);
    let by_kind = dataset.node_counts();
    assert_eq!(by_kind["Site"], 1);
    assert_eq!(by_kind["Building"], counts.buildings);
    assert_eq!(by_kind["Floor"], counts.floors);
    assert_eq!(by_kind["Space"], counts.spaces);
    assert_eq!(by_kind["Equipment"], counts.equipment);
    assert_eq!(by_kind["Meter"], counts.meters);
    assert_eq!(by_kind["Tenant"], counts.tenants);
    assert!(by_kind["Point"] <= counts.points);
}

#[test]
fn test_every_space_is_reachable_from_the_site() {
    let dataset = sorted_dataset(42);
    let mut reached: BTreeSet<&str> = dataset.nodes_of(NodeKind::Site).map(|n| n.id.as_str()).collect();
    loop {
        let before = reached.len();
        for edge in dataset.edges.iter().filter(|e| e.relation == Relation::Contains) {
            if reached.contains(edge.source_id.as_str()) {
                reached.insert(edge.target_id.as_str());
            }
        }
        if reached.len() == before {
            break;
        }
    }
    for space in dataset.nodes_of(NodeKind::Space) {
        assert!(reached.contains(space.id.as_str()), "{} is orphaned", space.id);
    }
}

#[test]
fn test_series_samples_are_ordered_per_point() {
    let dataset = sorted_dataset(42);
    let series = PointSeries::from_dataset(&dataset);
    let generator = series.generator(42, 120, 64 * 1024 * 1024).unwrap();
    let samples = series.resolve(&generator.generate_all().unwrap());
    assert!(!samples.is_empty());
    assert!(samples
        .windows(2)
        .all(|w| (w[0].point_id.as_str(), w[0].time_micros) < (w[1].point_id.as_str(), w[1].time_micros)));
}
