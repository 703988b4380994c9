//! Scenario loaders
//!
//! Each loader takes the scenario's exported files into its engine through
//! the fastest bulk path the engine offers, under per-batch timeouts, and
//! reads back the row counts it can verify.

pub mod batcher;
pub mod graph;
pub mod rdf;
pub mod relational;

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::BenchConfig;
use crate::engine::{Connections, EngineResult};
use crate::error::{BenchError, BenchResult};
use crate::export::{ExportLayout, Manifest};
use crate::model::{Engine, Scenario};

pub use batcher::{AdaptiveBatcher, BatchOutcome};

/// What a load did, as recorded in the run result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub duration_ms: f64,
    pub nodes: u64,
    pub edges: u64,
    pub samples: u64,
    pub chunks: u64,
    pub triples: u64,
    /// Entities with an ontology class, RDF scenarios only
    pub entities: u64,
    pub batches: u64,
    /// Final adaptive batch size, graph loads only
    pub final_batch_size: Option<usize>,
    pub stalls: usize,
    /// Fallbacks taken during the load
    pub notes: Vec<String>,
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.nodes += other.nodes;
        self.edges += other.edges;
        self.samples += other.samples;
        self.chunks += other.chunks;
        self.triples += other.triples;
        self.entities += other.entities;
        self.batches += other.batches;
        self.final_batch_size = other.final_batch_size.or(self.final_batch_size);
        self.stalls += other.stalls;
        self.notes.extend(other.notes);
    }
}

/// Run one bulk operation under a timeout; expiry is a `load_timeout`.
pub(crate) async fn timed<T, F>(limit: Duration, what: &str, op: F) -> BenchResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(BenchError::LoadTimeout(format!("{} exceeded {}s", what, limit.as_secs()))),
    }
}

/// Counts read back from an engine must equal what was exported.
pub(crate) fn check_count(what: &str, expected: u64, actual: u64) -> BenchResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(BenchError::LoadError(format!(
            "{}: exported {} but engine holds {}",
            what, expected, actual
        )))
    }
}

/// Load every engine of the scenario.
pub async fn load(
    scenario: Scenario,
    conns: &Connections,
    layout: &ExportLayout,
    manifest: &Manifest,
    config: &BenchConfig,
) -> BenchResult<LoadReport> {
    let started = Instant::now();
    let mut report = LoadReport::default();

    for engine in scenario.engines() {
        let part = match engine {
            Engine::Relational => {
                let client = conns
                    .relational
                    .as_ref()
                    .ok_or_else(|| BenchError::LoadError("no relational connection".to_string()))?;
                relational::RelationalLoader::new(client, layout, manifest, config)
                    .load(scenario)
                    .await?
            }
            Engine::Graph => {
                let client = conns
                    .graph
                    .as_ref()
                    .ok_or_else(|| BenchError::LoadError("no graph connection".to_string()))?;
                graph::GraphLoader::new(client, layout, manifest, config)
                    .load(scenario)
                    .await?
            }
            Engine::Rdf => {
                let client = conns
                    .rdf
                    .as_ref()
                    .ok_or_else(|| BenchError::LoadError("no rdf connection".to_string()))?;
                rdf::RdfLoader::new(client, layout, manifest, &config.timeouts)
                    .load(scenario)
                    .await?
            }
        };
        report.merge(part);
    }

    report.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!(
        scenario = %scenario,
        nodes = report.nodes,
        edges = report.edges,
        samples = report.samples,
        chunks = report.chunks,
        triples = report.triples,
        duration_ms = report.duration_ms as u64,
        "Load complete"
    );
    Ok(report)
}
