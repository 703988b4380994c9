//! Property-graph loader (M1, M2)
//!
//! Index on `Node.id` first, then nodes per kind, edges per relation and, for
//! M1, one `ArchiveDay` node per chunk. Rows travel as literal `UNWIND` lists.
//! Only edge batches feed the adaptive batcher: node and chunk batches carry
//! payloads of a different weight and run at a fixed size, chunks at the size
//! the edge phase settled on.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::batcher::{AdaptiveBatcher, BatchOutcome};
use super::{check_count, timed, LoadReport};
use crate::config::BenchConfig;
use crate::engine::{quote_literal, BoltClient, EngineClient, EngineResult};
use crate::error::{BenchError, BenchResult};
use crate::export::{Chunk, ExportLayout, Manifest};
use crate::model::property::properties_from_json;
use crate::model::{ExportFile, NodeKind, PropertyMap, PropertyValue, Relation, Scenario};

/// One row of `mg_nodes.csv`
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub building_id: Option<String>,
    pub properties: PropertyMap,
}

fn cypher_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::String(s) => quote_literal(s),
        PropertyValue::Integer(i) => i.to_string(),
        PropertyValue::Float(f) => format!("{:?}", f),
        PropertyValue::Boolean(b) => b.to_string(),
        PropertyValue::Null => "null".to_string(),
    }
}

/// `{id: '…', name: '…', building_id: '…', key: value, …}`
pub fn node_map(row: &NodeRow) -> String {
    let mut out = format!("{{id: {}, name: {}", quote_literal(&row.id), quote_literal(&row.name));
    if let Some(b) = &row.building_id {
        let _ = write!(out, ", building_id: {}", quote_literal(b));
    }
    for (key, value) in &row.properties {
        if !value.is_null() {
            let _ = write!(out, ", {}: {}", key, cypher_value(value));
        }
    }
    out.push('}');
    out
}

pub fn nodes_statement(kind: NodeKind, rows: &[NodeRow]) -> String {
    let maps: Vec<String> = rows.iter().map(node_map).collect();
    format!("UNWIND [{}] AS row CREATE (n:Node:{}) SET n = row", maps.join(", "), kind.as_str())
}

pub fn edges_statement(relation: Relation, pairs: &[(String, String)]) -> String {
    let maps: Vec<String> = pairs
        .iter()
        .map(|(s, t)| format!("{{s: {}, t: {}}}", quote_literal(s), quote_literal(t)))
        .collect();
    format!(
        "UNWIND [{}] AS row MATCH (a:Node {{id: row.s}}) MATCH (b:Node {{id: row.t}}) CREATE (a)-[:{}]->(b)",
        maps.join(", "),
        relation.as_str()
    )
}

pub fn chunks_statement(chunks: &[Chunk]) -> BenchResult<String> {
    let mut maps = Vec::with_capacity(chunks.len());
    for c in chunks {
        maps.push(format!(
            "{{p: {}, day: {}, ts: {}, vs: {}, n: {}}}",
            quote_literal(&c.point_id),
            quote_literal(&c.day_string()),
            c.timestamps_json()?,
            c.values_json()?,
            c.len()
        ));
    }
    Ok(format!(
        "UNWIND [{}] AS row MATCH (p:Node {{id: row.p}}) \
         CREATE (p)-[:HAS_TIMESERIES]->(:ArchiveDay {{point_id: row.p, day: row.day, timestamps: row.ts, values: row.vs, sample_count: row.n}})",
        maps.join(", ")
    ))
}

pub fn read_node_rows(path: &std::path::Path) -> BenchResult<Vec<NodeRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("");
        let building = field(3);
        rows.push(NodeRow {
            id: field(0).to_string(),
            kind: field(1).parse()?,
            name: field(2).to_string(),
            building_id: (!building.is_empty()).then(|| building.to_string()),
            properties: properties_from_json(field(4))?,
        });
    }
    Ok(rows)
}

/// Edges of `mg_edges.csv` grouped by relation, in file order within a group
pub fn read_edge_groups(path: &std::path::Path) -> BenchResult<BTreeMap<Relation, Vec<(String, String)>>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut groups: BTreeMap<Relation, Vec<(String, String)>> = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        let relation: Relation = record.get(2).unwrap_or("").parse()?;
        groups.entry(relation).or_default().push((
            record.get(0).unwrap_or("").to_string(),
            record.get(1).unwrap_or("").to_string(),
        ));
    }
    Ok(groups)
}

/// What the loader needs from a property-graph engine
#[async_trait]
pub trait GraphSink: Send + Sync {
    async fn run(&self, statement: &str) -> EngineResult<()>;

    /// Value of the integer column `c` of a single-row aggregate
    async fn count(&self, query: &str) -> EngineResult<i64>;
}

#[async_trait]
impl GraphSink for BoltClient {
    async fn run(&self, statement: &str) -> EngineResult<()> {
        self.execute(statement).await
    }

    async fn count(&self, query: &str) -> EngineResult<i64> {
        self.scalar_i64(query, "c").await
    }
}

pub struct GraphLoader<'a> {
    client: &'a dyn GraphSink,
    layout: &'a ExportLayout,
    manifest: &'a Manifest,
    config: &'a BenchConfig,
}

impl<'a> GraphLoader<'a> {
    pub fn new(client: &'a dyn GraphSink, layout: &'a ExportLayout, manifest: &'a Manifest, config: &'a BenchConfig) -> Self {
        Self {
            client,
            layout,
            manifest,
            config,
        }
    }

    pub async fn load(&self, scenario: Scenario) -> BenchResult<LoadReport> {
        let mut report = LoadReport::default();
        let fixed_size = self.config.batch.initial_size.max(1);

        self.create_indexes(scenario).await?;

        let rows = read_node_rows(&self.layout.file(ExportFile::MgNodes))?;
        let mut start = 0;
        while start < rows.len() {
            // Node ids are kind-prefixed and sorted, so each kind is contiguous
            let kind = rows[start].kind;
            let end = rows[start..]
                .iter()
                .position(|r| r.kind != kind)
                .map_or(rows.len(), |p| start + p);
            let group = &rows[start..end];
            let mut offset = 0;
            while offset < group.len() {
                let stop = (offset + fixed_size).min(group.len());
                self.send(&nodes_statement(kind, &group[offset..stop]), "nodes", &mut report)
                    .await?;
                offset = stop;
            }
            start = end;
        }
        report.nodes = rows.len() as u64;
        info!(nodes = report.nodes, "Graph nodes loaded");

        let mut batcher = AdaptiveBatcher::new(&self.config.batch);
        let groups = read_edge_groups(&self.layout.file(ExportFile::MgEdges))?;
        for (relation, pairs) in &groups {
            let mut offset = 0;
            while offset < pairs.len() {
                let stop = (offset + batcher.size()).min(pairs.len());
                self.send_edges(&edges_statement(*relation, &pairs[offset..stop]), &mut batcher, &mut report)
                    .await?;
                offset = stop;
            }
            report.edges += pairs.len() as u64;
            debug!(relation = relation.as_str(), edges = pairs.len(), "Relation loaded");
        }
        info!(edges = report.edges, batch_size = batcher.size(), "Graph edges loaded");

        if scenario.export_files().contains(&ExportFile::MgChunks) {
            report.chunks = self.load_chunks(batcher.size(), &mut report).await?;
            info!(chunks = report.chunks, "Archive chunks loaded");
        }

        report.final_batch_size = Some(batcher.size());
        report.stalls = batcher.total_stalls();
        self.verify(&report).await?;
        Ok(report)
    }

    async fn create_indexes(&self, scenario: Scenario) -> BenchResult<()> {
        let mut statements = vec!["CREATE INDEX ON :Node(id)".to_string()];
        statements.extend(NodeKind::ALL.iter().map(|k| format!("CREATE INDEX ON :{}(id)", k.as_str())));
        if scenario.export_files().contains(&ExportFile::MgChunks) {
            statements.push("CREATE INDEX ON :ArchiveDay(point_id)".to_string());
        }
        for s in &statements {
            timed(self.config.timeouts.statement, "index", self.client.run(s)).await?;
        }
        Ok(())
    }

    async fn load_chunks(&self, batch_size: usize, report: &mut LoadReport) -> BenchResult<u64> {
        let mut reader = csv::Reader::from_path(self.layout.file(ExportFile::MgChunks))?;
        let mut pending: Vec<Chunk> = Vec::new();
        let mut total = 0u64;
        for record in reader.records() {
            pending.push(Chunk::from_record(&record?)?);
            if pending.len() >= batch_size {
                self.send(&chunks_statement(&pending)?, "chunks", report).await?;
                total += pending.len() as u64;
                pending.clear();
            }
        }
        if !pending.is_empty() {
            self.send(&chunks_statement(&pending)?, "chunks", report).await?;
            total += pending.len() as u64;
        }
        Ok(total)
    }

    /// Execute one batch under the batch timeout.
    async fn send(&self, statement: &str, what: &str, report: &mut LoadReport) -> BenchResult<()> {
        timed(self.config.timeouts.batch, what, self.client.run(statement)).await?;
        report.batches += 1;
        Ok(())
    }

    /// Execute one edge batch and feed its latency to the batcher.
    async fn send_edges(
        &self,
        statement: &str,
        batcher: &mut AdaptiveBatcher,
        report: &mut LoadReport,
    ) -> BenchResult<()> {
        let started = Instant::now();
        self.send(statement, "edges", report).await?;
        match batcher.record(started.elapsed()) {
            BatchOutcome::Normal => Ok(()),
            BatchOutcome::Stalled { new_size } => {
                warn!(new_size, "Edge batch stalled, halving batch size");
                Ok(())
            }
            BatchOutcome::Abort => Err(BenchError::Stalled(format!(
                "{} consecutive stalls while loading edges at batch size {}",
                self.config.batch.max_stalls + 1,
                batcher.size()
            ))),
        }
    }

    async fn verify(&self, report: &LoadReport) -> BenchResult<()> {
        let limit = self.config.timeouts.statement;
        let nodes = timed(limit, "count", self.client.count("MATCH (n:Node) RETURN count(n) AS c")).await?;
        let edges = timed(
            limit,
            "count",
            self.client
                .count("MATCH (:Node)-[r]->(:Node) WHERE type(r) <> 'HAS_TIMESERIES' RETURN count(r) AS c"),
        )
        .await?;
        check_count("nodes", self.manifest.node_total() as u64, nodes.max(0) as u64)?;
        check_count("edges", self.manifest.edge_total() as u64, edges.max(0) as u64)?;
        if report.chunks > 0 {
            let chunks = timed(limit, "count", self.client.count("MATCH (c:ArchiveDay) RETURN count(c) AS c")).await?;
            check_count("chunks", report.chunks, chunks.max(0) as u64)?;
        }
        Ok(())
    }
}
