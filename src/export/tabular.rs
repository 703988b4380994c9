//! CSV serialisers for the relational and property-graph scenarios

use std::path::Path;

use chrono::{DateTime, SecondsFormat};

use crate::error::{BenchError, BenchResult};
use crate::export::pivot;
use crate::model::property::properties_to_json;
use crate::model::{Edge, Node, Sample};

pub const PG_NODE_COLUMNS: [&str; 11] = [
    "id",
    "type",
    "name",
    "domain",
    "equipment_type",
    "space_type",
    "building_id",
    "floor_id",
    "space_id",
    "quantity",
    "properties",
];

pub const JSONB_NODE_COLUMNS: [&str; 5] = ["id", "type", "name", "building_id", "properties"];

pub const MG_NODE_COLUMNS: [&str; 5] = ["id", "label", "name", "building_id", "properties"];

pub const EDGE_COLUMNS: [&str; 3] = ["source_id", "target_id", "relation"];

pub const TIMESERIES_COLUMNS: [&str; 4] = ["point_id", "time", "building_id", "value"];

/// Flat relational rows: well-known properties get their own column and the
/// full map is kept as JSON.
pub fn write_pg_nodes(path: &Path, nodes: &[Node]) -> BenchResult<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(PG_NODE_COLUMNS)?;
    for n in nodes {
        let column = |key: &str| n.property_str(key).unwrap_or("").to_string();
        writer.write_record([
            n.id.clone(),
            n.kind.as_str().to_string(),
            n.name.clone(),
            column("domain"),
            column("equipment_type"),
            column("space_type"),
            n.building_id.clone().unwrap_or_default(),
            column("floor_id"),
            column("space_id"),
            column("quantity"),
            properties_to_json(&n.properties)?,
        ])?;
    }
    writer.flush()?;
    Ok(nodes.len())
}

fn write_document_nodes(path: &Path, header: [&str; 5], nodes: &[Node]) -> BenchResult<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    for n in nodes {
        writer.write_record([
            n.id.as_str(),
            n.kind.as_str(),
            n.name.as_str(),
            n.building_id.as_deref().unwrap_or(""),
            properties_to_json(&n.properties)?.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(nodes.len())
}

pub fn write_jsonb_nodes(path: &Path, nodes: &[Node]) -> BenchResult<usize> {
    write_document_nodes(path, JSONB_NODE_COLUMNS, nodes)
}

pub fn write_mg_nodes(path: &Path, nodes: &[Node]) -> BenchResult<usize> {
    write_document_nodes(path, MG_NODE_COLUMNS, nodes)
}

pub fn write_edges(path: &Path, edges: &[Edge]) -> BenchResult<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(EDGE_COLUMNS)?;
    for e in edges {
        writer.write_record([e.source_id.as_str(), e.target_id.as_str(), e.relation.as_str()])?;
    }
    writer.flush()?;
    Ok(edges.len())
}

/// RFC-3339 UTC with second precision, e.g. `2024-01-01T00:00:00Z`
pub fn format_rfc3339(time_micros: i64) -> BenchResult<String> {
    DateTime::from_timestamp_micros(time_micros)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| BenchError::Export(format!("timestamp out of range: {}", time_micros)))
}

fn sample_record(sample: &Sample) -> BenchResult<[String; 4]> {
    Ok([
        sample.point_id.clone(),
        format_rfc3339(sample.time_micros)?,
        sample.building_id.clone(),
        sample.value.to_string(),
    ])
}

/// Stream the time-series pivot into the shared CSV.
pub fn write_timeseries_csv(path: &Path, timeseries_parquet: &Path) -> BenchResult<usize> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(TIMESERIES_COLUMNS)?;
    let mut rows = 0;
    pivot::for_each_sample_batch(timeseries_parquet, |batch| {
        for sample in &batch {
            writer.write_record(sample_record(sample)?)?;
        }
        rows += batch.len();
        Ok(())
    })?;
    writer.flush()?;
    Ok(rows)
}

/// Read the `(id, kind)` columns of any of the node CSVs.
pub fn read_node_kinds(path: &Path) -> BenchResult<Vec<(String, String)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut out = Vec::new();
    for record in reader.records() {
        let record = record?;
        match (record.get(0), record.get(1)) {
            (Some(id), Some(kind)) => out.push((id.to_string(), kind.to_string())),
            _ => return Err(BenchError::Export(format!("short node row in {}", path.display()))),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeKind, Relation};
    use tempfile::tempdir;

    fn nodes() -> Vec<Node> {
        vec![
            Node::new("equip-000000", NodeKind::Equipment, "AHU 1")
                .with_building("building-0000")
                .with_property("domain", "HVAC")
                .with_property("equipment_type", "AHU")
                .with_property("space_id", "space-000000"),
            Node::new("site-0000", NodeKind::Site, "Campus"),
        ]
    }

    #[test]
    fn test_pg_nodes_lift_known_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pg_nodes.csv");
        write_pg_nodes(&path, &nodes()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], PG_NODE_COLUMNS.join(","));
        assert!(lines[1].starts_with("equip-000000,Equipment,AHU 1,HVAC,AHU,,building-0000,,space-000000,,"));
        assert!(lines[2].starts_with("site-0000,Site,Campus,,,,,,,,"));
    }

    #[test]
    fn test_edges_and_node_kinds() {
        let dir = tempdir().unwrap();
        let edges = dir.path().join("edges.csv");
        write_edges(&edges, &[Edge::new("site-0000", "building-0000", Relation::Contains)]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&edges).unwrap(),
            "source_id,target_id,relation\nsite-0000,building-0000,CONTAINS\n"
        );

        let mg = dir.path().join("mg_nodes.csv");
        write_mg_nodes(&mg, &nodes()).unwrap();
        assert_eq!(
            read_node_kinds(&mg).unwrap(),
            vec![
                ("equip-000000".to_string(), "Equipment".to_string()),
                ("site-0000".to_string(), "Site".to_string()),
            ]
        );
    }

    #[test]
    fn test_rfc3339_epoch() {
        assert_eq!(format_rfc3339(1_704_067_200_000_000).unwrap(), "2024-01-01T00:00:00Z");
    }
}
