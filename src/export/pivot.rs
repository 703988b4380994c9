//! Canonical Parquet pivot
//!
//! Three files hold the whole dataset: `nodes.parquet`, `edges.parquet` and
//! `timeseries.parquet`. Column statistics are written for every row group so
//! that the time range can be read from the footer alone.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::file::statistics::Statistics;
use tracing::debug;

use crate::error::{BenchError, BenchResult};
use crate::model::property::{properties_from_json, properties_to_json};
use crate::model::{Edge, Node, Sample};

const READ_BATCH_ROWS: usize = 64 * 1024;
const ROW_GROUP_ROWS: usize = 1024 * 1024;

pub fn nodes_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("building_id", DataType::Utf8, true),
        Field::new("properties", DataType::Utf8, false),
    ]))
}

pub fn edges_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("source_id", DataType::Utf8, false),
        Field::new("target_id", DataType::Utf8, false),
        Field::new("relation", DataType::Utf8, false),
    ]))
}

pub fn timeseries_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("point_id", DataType::Utf8, false),
        Field::new(
            "time",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new("value", DataType::Float64, false),
        Field::new("building_id", DataType::Utf8, false),
    ]))
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_statistics_enabled(EnabledStatistics::Chunk)
        .set_max_row_group_size(ROW_GROUP_ROWS)
        .set_created_by("bosbench".to_string())
        .build()
}

fn open_writer(path: &Path, schema: SchemaRef) -> BenchResult<ArrowWriter<File>> {
    let file = File::create(path)?;
    Ok(ArrowWriter::try_new(file, schema, Some(writer_properties()))?)
}

/// Write nodes, already in id order.
pub fn write_nodes(path: &Path, nodes: &[Node]) -> BenchResult<()> {
    let mut properties = Vec::with_capacity(nodes.len());
    for n in nodes {
        properties.push(properties_to_json(&n.properties)?);
    }
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(nodes.iter().map(|n| n.id.as_str()))),
        Arc::new(StringArray::from_iter_values(nodes.iter().map(|n| n.kind.as_str()))),
        Arc::new(StringArray::from_iter_values(nodes.iter().map(|n| n.name.as_str()))),
        Arc::new(StringArray::from_iter(nodes.iter().map(|n| n.building_id.as_deref()))),
        Arc::new(StringArray::from_iter_values(properties.iter())),
    ];
    let batch = RecordBatch::try_new(nodes_schema(), columns)?;
    let mut writer = open_writer(path, nodes_schema())?;
    writer.write(&batch)?;
    writer.close()?;
    debug!(path = %path.display(), rows = nodes.len(), "Wrote nodes pivot");
    Ok(())
}

/// Write edges, already in `(source, relation, target)` order.
pub fn write_edges(path: &Path, edges: &[Edge]) -> BenchResult<()> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(edges.iter().map(|e| e.source_id.as_str()))),
        Arc::new(StringArray::from_iter_values(edges.iter().map(|e| e.target_id.as_str()))),
        Arc::new(StringArray::from_iter_values(edges.iter().map(|e| e.relation.as_str()))),
    ];
    let batch = RecordBatch::try_new(edges_schema(), columns)?;
    let mut writer = open_writer(path, edges_schema())?;
    writer.write(&batch)?;
    writer.close()?;
    debug!(path = %path.display(), rows = edges.len(), "Wrote edges pivot");
    Ok(())
}

/// Streaming writer for the time-series pivot
pub struct TimeseriesWriter {
    writer: ArrowWriter<File>,
    rows: usize,
}

impl TimeseriesWriter {
    pub fn create(path: &Path) -> BenchResult<Self> {
        Ok(Self {
            writer: open_writer(path, timeseries_schema())?,
            rows: 0,
        })
    }

    /// Append samples; callers supply them in `(point_id, time)` order.
    pub fn write(&mut self, samples: &[Sample]) -> BenchResult<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(samples.iter().map(|s| s.point_id.as_str()))),
            Arc::new(
                TimestampMicrosecondArray::from_iter_values(samples.iter().map(|s| s.time_micros))
                    .with_timezone("UTC"),
            ),
            Arc::new(Float64Array::from_iter_values(samples.iter().map(|s| s.value))),
            Arc::new(StringArray::from_iter_values(samples.iter().map(|s| s.building_id.as_str()))),
        ];
        let batch = RecordBatch::try_new(timeseries_schema(), columns)?;
        self.writer.write(&batch)?;
        self.rows += samples.len();
        Ok(())
    }

    pub fn finish(self) -> BenchResult<usize> {
        self.writer.close()?;
        Ok(self.rows)
    }
}

fn reader(path: &Path) -> BenchResult<ParquetRecordBatchReader> {
    let file = File::open(path)?;
    Ok(ParquetRecordBatchReaderBuilder::try_new(file)?
        .with_batch_size(READ_BATCH_ROWS)
        .build()?)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> BenchResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| BenchError::Export(format!("pivot column {} missing or not utf8", name)))
}

pub fn read_nodes(path: &Path) -> BenchResult<Vec<Node>> {
    let mut nodes = Vec::new();
    for batch in reader(path)? {
        let batch = batch?;
        let ids = string_column(&batch, "id")?;
        let kinds = string_column(&batch, "kind")?;
        let names = string_column(&batch, "name")?;
        let buildings = string_column(&batch, "building_id")?;
        let props = string_column(&batch, "properties")?;
        for i in 0..batch.num_rows() {
            nodes.push(Node {
                id: ids.value(i).to_string(),
                kind: kinds.value(i).parse()?,
                name: names.value(i).to_string(),
                building_id: (!buildings.is_null(i)).then(|| buildings.value(i).to_string()),
                properties: properties_from_json(props.value(i))?,
            });
        }
    }
    Ok(nodes)
}

pub fn read_edges(path: &Path) -> BenchResult<Vec<Edge>> {
    let mut edges = Vec::new();
    for batch in reader(path)? {
        let batch = batch?;
        let sources = string_column(&batch, "source_id")?;
        let targets = string_column(&batch, "target_id")?;
        let relations = string_column(&batch, "relation")?;
        for i in 0..batch.num_rows() {
            edges.push(Edge::new(sources.value(i), targets.value(i), relations.value(i).parse()?));
        }
    }
    Ok(edges)
}

/// Iterate the time-series pivot one record batch at a time.
pub fn for_each_sample_batch<F>(path: &Path, mut f: F) -> BenchResult<()>
where
    F: FnMut(Vec<Sample>) -> BenchResult<()>,
{
    for batch in reader(path)? {
        let batch = batch?;
        let points = string_column(&batch, "point_id")?;
        let buildings = string_column(&batch, "building_id")?;
        let times = batch
            .column_by_name("time")
            .and_then(|c| c.as_any().downcast_ref::<TimestampMicrosecondArray>())
            .ok_or_else(|| BenchError::Export("pivot column time missing".to_string()))?;
        let values = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .ok_or_else(|| BenchError::Export("pivot column value missing".to_string()))?;
        let samples = (0..batch.num_rows())
            .map(|i| Sample {
                point_id: points.value(i).to_string(),
                time_micros: times.value(i),
                value: values.value(i),
                building_id: buildings.value(i).to_string(),
            })
            .collect();
        f(samples)?;
    }
    Ok(())
}

/// `[t_min, t_max]` in microseconds from row-group statistics, without
/// reading any data page. `None` when the pivot holds no samples.
pub fn time_range(path: &Path) -> BenchResult<Option<(i64, i64)>> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let metadata = builder.metadata();
    let column = metadata
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .position(|c| c.name() == "time")
        .ok_or_else(|| BenchError::Export("pivot has no time column".to_string()))?;

    let mut range: Option<(i64, i64)> = None;
    for row_group in metadata.row_groups() {
        if row_group.num_rows() == 0 {
            continue;
        }
        let stats = row_group.column(column).statistics();
        let (min, max) = match stats {
            Some(Statistics::Int64(s)) => match (s.min_opt(), s.max_opt()) {
                (Some(min), Some(max)) => (*min, *max),
                _ => continue,
            },
            _ => {
                return Err(BenchError::Export(
                    "time column statistics missing from pivot".to_string(),
                ))
            }
        };
        range = Some(match range {
            Some((lo, hi)) => (lo.min(min), hi.max(max)),
            None => (min, max),
        });
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeKind, Relation};
    use tempfile::tempdir;

    fn sample(point: &str, t: i64, v: f64) -> Sample {
        Sample {
            point_id: point.to_string(),
            time_micros: t,
            value: v,
            building_id: "building-0000".to_string(),
        }
    }

    #[test]
    fn test_nodes_and_edges_survive_the_pivot() {
        let dir = tempdir().unwrap();
        let nodes = vec![
            Node::new("building-0000", NodeKind::Building, "B1").with_building("building-0000"),
            Node::new("site-0000", NodeKind::Site, "Campus").with_property("timezone", "UTC"),
        ];
        let edges = vec![Edge::new("site-0000", "building-0000", Relation::Contains)];
        write_nodes(&dir.path().join("nodes.parquet"), &nodes).unwrap();
        write_edges(&dir.path().join("edges.parquet"), &edges).unwrap();

        assert_eq!(read_nodes(&dir.path().join("nodes.parquet")).unwrap(), nodes);
        assert_eq!(read_edges(&dir.path().join("edges.parquet")).unwrap(), edges);
    }

    #[test]
    fn test_time_range_from_statistics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("timeseries.parquet");
        let mut writer = TimeseriesWriter::create(&path).unwrap();
        writer
            .write(&[sample("point-0000000", 500, 1.0), sample("point-0000000", 900, 2.0)])
            .unwrap();
        writer.write(&[sample("point-0000001", 100, 3.0)]).unwrap();
        assert_eq!(writer.finish().unwrap(), 3);

        assert_eq!(time_range(&path).unwrap(), Some((100, 900)));

        let mut seen = Vec::new();
        for_each_sample_batch(&path, |batch| {
            seen.extend(batch);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].point_id, "point-0000001");
    }

    #[test]
    fn test_empty_timeseries_has_no_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("timeseries.parquet");
        TimeseriesWriter::create(&path).unwrap().finish().unwrap();
        assert_eq!(time_range(&path).unwrap(), None);
    }
}
