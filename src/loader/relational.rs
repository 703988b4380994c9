//! Relational loader (P1, P2 and the time-series half of M2, O2)
//!
//! Every table is filled by a sequence of `COPY ... FROM STDIN` batches of
//! bounded row count, each under the batch timeout. The time series lands in
//! an unlogged table, is made logged, partitioned by time and indexed last.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate};
use csv::ByteRecord;
use tracing::{debug, info, warn};

use super::{check_count, timed, LoadReport};
use crate::config::BenchConfig;
use crate::engine::PostgresClient;
use crate::error::{BenchError, BenchResult};
use crate::export::{pivot, ExportLayout, Manifest};
use crate::model::{ExportFile, Scenario};

/// Batches carry no header row
const CSV_OPTIONS: &str = "WITH (FORMAT csv)";

const P1_NODES_DDL: &str = "CREATE TABLE nodes (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    name TEXT NOT NULL,
    domain TEXT,
    equipment_type TEXT,
    space_type TEXT,
    building_id TEXT,
    floor_id TEXT,
    space_id TEXT,
    quantity TEXT,
    properties JSONB NOT NULL
)";

const P2_NODES_DDL: &str = "CREATE TABLE nodes (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    name TEXT NOT NULL,
    building_id TEXT,
    properties JSONB NOT NULL
)";

const EDGES_DDL: &str = "CREATE TABLE edges (
    source_id TEXT NOT NULL,
    target_id TEXT NOT NULL,
    relation TEXT NOT NULL
)";

const TIMESERIES_DDL: &str = "CREATE UNLOGGED TABLE timeseries (
    point_id TEXT NOT NULL,
    time TIMESTAMPTZ NOT NULL,
    building_id TEXT NOT NULL,
    value DOUBLE PRECISION NOT NULL
)";

const P1_INDEXES: &[&str] = &[
    "CREATE INDEX nodes_type_idx ON nodes (type)",
    "CREATE INDEX nodes_building_idx ON nodes (building_id)",
    "CREATE INDEX nodes_equipment_type_idx ON nodes (equipment_type)",
    "CREATE INDEX nodes_space_idx ON nodes (space_id)",
];

const P2_INDEXES: &[&str] = &[
    "CREATE INDEX nodes_type_idx ON nodes (type)",
    "CREATE INDEX nodes_building_idx ON nodes (building_id)",
    "CREATE INDEX nodes_properties_idx ON nodes USING GIN (properties jsonb_path_ops)",
];

const EDGE_INDEXES: &[&str] = &[
    "CREATE INDEX edges_source_idx ON edges (source_id, relation)",
    "CREATE INDEX edges_target_idx ON edges (target_id, relation)",
];

const TIMESERIES_INDEXES: &[&str] = &[
    "CREATE INDEX timeseries_point_time_idx ON timeseries (point_id, time DESC)",
    "CREATE INDEX timeseries_building_time_idx ON timeseries (building_id, time DESC)",
];

/// Monthly range partitions covering `[t_min, t_max]` (µs), plus a default
/// partition, as DDL statements.
pub fn monthly_partitions(table: &str, t_min: i64, t_max: i64) -> BenchResult<Vec<String>> {
    let day = |t: i64| {
        DateTime::from_timestamp_micros(t)
            .map(|d| d.date_naive())
            .ok_or_else(|| BenchError::LoadError(format!("timestamp out of range: {}", t)))
    };
    let first = day(t_min)?;
    let last = day(t_max)?;
    let month_start = |d: NaiveDate| NaiveDate::from_ymd_opt(d.year(), d.month(), 1);
    let next_month = |d: NaiveDate| {
        if d.month() == 12 {
            NaiveDate::from_ymd_opt(d.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(d.year(), d.month() + 1, 1)
        }
    };

    let mut out = Vec::new();
    let mut cursor = month_start(first);
    while let Some(start) = cursor {
        if start > last {
            break;
        }
        let Some(end) = next_month(start) else { break };
        out.push(format!(
            "CREATE TABLE {table}_{} PARTITION OF {table} FOR VALUES FROM ('{}') TO ('{}')",
            start.format("%Y%m"),
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
        ));
        cursor = Some(end);
    }
    out.push(format!("CREATE TABLE {table}_default PARTITION OF {table} DEFAULT"));
    Ok(out)
}

/// Reads a CSV export with a header row as header-less payloads of at most
/// `rows` records each.
pub struct CsvBatches {
    reader: csv::Reader<File>,
    rows: usize,
    record: ByteRecord,
}

impl CsvBatches {
    pub fn open(path: &Path, rows: usize) -> BenchResult<Self> {
        Ok(Self {
            reader: csv::Reader::from_path(path)?,
            rows: rows.max(1),
            record: ByteRecord::new(),
        })
    }

    /// Next payload and its row count; `None` once the file is exhausted.
    pub fn next_batch(&mut self) -> BenchResult<Option<(Vec<u8>, u64)>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut rows = 0u64;
        while (rows as usize) < self.rows && self.reader.read_byte_record(&mut self.record)? {
            writer.write_byte_record(&self.record)?;
            rows += 1;
        }
        if rows == 0 {
            return Ok(None);
        }
        let payload = writer
            .into_inner()
            .map_err(|e| BenchError::LoadError(format!("cannot assemble COPY batch: {}", e)))?;
        Ok(Some((payload, rows)))
    }
}

pub struct RelationalLoader<'a> {
    client: &'a PostgresClient,
    layout: &'a ExportLayout,
    manifest: &'a Manifest,
    config: &'a BenchConfig,
}

impl<'a> RelationalLoader<'a> {
    pub fn new(
        client: &'a PostgresClient,
        layout: &'a ExportLayout,
        manifest: &'a Manifest,
        config: &'a BenchConfig,
    ) -> Self {
        Self {
            client,
            layout,
            manifest,
            config,
        }
    }

    async fn exec(&self, sql: &str) -> BenchResult<u64> {
        timed(self.config.timeouts.statement, "statement", self.client.execute_counted(sql)).await
    }

    async fn count(&self, table: &str) -> BenchResult<u64> {
        let n = timed(
            self.config.timeouts.statement,
            "count",
            self.client.scalar_i64(&format!("SELECT count(*) FROM {}", table)),
        )
        .await?;
        Ok(n.max(0) as u64)
    }

    pub async fn load(&self, scenario: Scenario) -> BenchResult<LoadReport> {
        let mut report = LoadReport::default();
        self.exec("DROP TABLE IF EXISTS timeseries, edges, nodes CASCADE").await?;

        let (nodes_file, nodes_ddl, node_indexes) = match scenario {
            Scenario::P1 => (Some(ExportFile::PgNodes), P1_NODES_DDL, P1_INDEXES),
            Scenario::P2 => (Some(ExportFile::PgJsonbNodes), P2_NODES_DDL, P2_INDEXES),
            _ => (None, "", &[][..]),
        };

        if let Some(nodes_file) = nodes_file {
            self.exec(nodes_ddl).await?;
            self.exec(EDGES_DDL).await?;
            report.nodes = self.copy_batches("nodes", nodes_file, &mut report).await?;
            report.edges = self.copy_batches("edges", ExportFile::PgEdges, &mut report).await?;
            check_count("nodes", self.manifest.node_total() as u64, report.nodes)?;
            check_count("edges", self.manifest.edge_total() as u64, report.edges)?;
            for ddl in node_indexes.iter().chain(EDGE_INDEXES) {
                self.exec(ddl).await?;
            }
        }

        self.exec(TIMESERIES_DDL).await?;
        report.samples = self
            .copy_batches("timeseries", ExportFile::TimeseriesCsv, &mut report)
            .await?;
        self.exec("ALTER TABLE timeseries SET LOGGED").await?;
        self.partition_timeseries(&mut report).await?;
        for ddl in TIMESERIES_INDEXES {
            self.exec(ddl).await?;
        }
        self.exec("ANALYZE").await?;

        check_count("samples", self.manifest.sample_count as u64, self.count("timeseries").await?)?;
        info!(
            nodes = report.nodes,
            edges = report.edges,
            samples = report.samples,
            "Relational load complete"
        );
        Ok(report)
    }

    /// Stream one export file into `table`; returns rows copied.
    async fn copy_batches(&self, table: &str, file: ExportFile, report: &mut LoadReport) -> BenchResult<u64> {
        let statement = format!("COPY {} FROM STDIN {}", table, CSV_OPTIONS);
        let mut batches = CsvBatches::open(&self.layout.file(file), self.config.batch.copy_rows)?;
        let mut total = 0;
        let mut count = 0u64;
        while let Some((payload, rows)) = batches.next_batch()? {
            let copied = timed(
                self.config.timeouts.batch,
                table,
                self.client.copy_from_bytes(&statement, payload),
            )
            .await?;
            check_count(table, rows, copied)?;
            debug!(table, batch = count, rows = copied, "COPY batch done");
            total += copied;
            count += 1;
        }
        report.batches += count;
        info!(table, rows = total, batches = count, "COPY complete");
        Ok(total)
    }

    /// Hypertable when the extension is there, declarative range
    /// partitioning otherwise.
    async fn partition_timeseries(&self, report: &mut LoadReport) -> BenchResult<()> {
        let hypertable = "CREATE EXTENSION IF NOT EXISTS timescaledb; \
             SELECT create_hypertable('timeseries', 'time', chunk_time_interval => INTERVAL '1 day', migrate_data => true)";
        match self.exec(hypertable).await {
            Ok(_) => return Ok(()),
            Err(BenchError::Engine(e)) => {
                warn!(error = %e, "Hypertable unavailable, falling back to range partitions");
                report.notes.push("range-partitioned instead of hypertable".to_string());
            }
            Err(e) => return Err(e),
        }

        let Some((t_min, t_max)) = pivot::time_range(&self.layout.timeseries_parquet())? else {
            return Ok(());
        };
        self.exec("CREATE TABLE timeseries_part (LIKE timeseries INCLUDING ALL) PARTITION BY RANGE (time)")
            .await?;
        for ddl in monthly_partitions("timeseries_part", t_min, t_max)? {
            self.exec(&ddl).await?;
        }
        self.exec(
            "INSERT INTO timeseries_part SELECT * FROM timeseries; \
             DROP TABLE timeseries; \
             ALTER TABLE timeseries_part RENAME TO timeseries",
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::step_to_micros;

    #[test]
    fn test_monthly_partitions_cover_range() {
        let ddl = monthly_partitions("ts", step_to_micros(0), step_to_micros(60 * 24 * 40)).unwrap();
        assert_eq!(ddl.len(), 3);
        assert_eq!(
            ddl[0],
            "CREATE TABLE ts_202401 PARTITION OF ts FOR VALUES FROM ('2024-01-01') TO ('2024-02-01')"
        );
        assert!(ddl[1].starts_with("CREATE TABLE ts_202402 "));
        assert_eq!(ddl[2], "CREATE TABLE ts_default PARTITION OF ts DEFAULT");
    }

    #[test]
    fn test_csv_batches_are_bounded_and_headerless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pg_nodes.csv");
        std::fs::write(
            &path,
            "id,type,building_id,properties\n\
             a,Site,,{}\n\
             b,Building,b,\"{\"\"floors\"\":3}\"\n\
             c,Floor,b,{}\n\
             d,Floor,b,{}\n\
             e,Space,b,\"{\"\"name\"\":\"\"Room, 1\"\"}\"\n",
        )
        .unwrap();

        let mut batches = CsvBatches::open(&path, 2).unwrap();
        let mut sizes = Vec::new();
        let mut all = Vec::new();
        while let Some((payload, rows)) = batches.next_batch().unwrap() {
            sizes.push(rows);
            let mut reader = csv::ReaderBuilder::new().has_headers(false).from_reader(payload.as_slice());
            let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
            assert_eq!(records.len() as u64, rows);
            all.extend(records);
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(&all[0][0], "a");
        assert_eq!(&all[0][2], "");
        assert_eq!(&all[1][3], "{\"floors\":3}");
        assert_eq!(&all[4][3], "{\"name\":\"Room, 1\"}");
        assert!(batches.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_empty_export_yields_no_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pg_edges.csv");
        std::fs::write(&path, "source_id,target_id,relation\n").unwrap();
        assert!(CsvBatches::open(&path, 100).unwrap().next_batch().unwrap().is_none());
    }

    #[test]
    fn test_december_rolls_over() {
        let dec = chrono::NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc()
            .timestamp_micros();
        let ddl = monthly_partitions("ts", dec, dec).unwrap();
        assert!(ddl[0].contains("FROM ('2024-12-01') TO ('2025-01-01')"));
    }
}
