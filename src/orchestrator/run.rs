//! One benchmark run: export, containers, load, queries, teardown

use std::time::Instant;

use tracing::{info, warn};

use crate::config::BenchConfig;
use crate::container::{ContainerHandle, ContainerManager};
use crate::engine::Connections;
use crate::error::{BenchError, BenchResult};
use crate::export::{ExportLayout, Exporter, Manifest};
use crate::loader;
use crate::monitor::ResourceMonitor;
use crate::params::ParamGenerator;
use crate::query::{QueryExecutor, QueryLibrary};
use crate::results::{RunKey, RunResult};

/// What a run leaves behind for teardown, whatever phase it reached
#[derive(Default)]
pub struct RunState {
    pub handles: Vec<ContainerHandle>,
    pub monitor: Option<ResourceMonitor>,
}

/// Run blocking export work off the async workers.
async fn blocking<T, F>(f: F) -> BenchResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> BenchResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BenchError::Export(format!("export task failed: {}", e)))?
}

pub struct RunContext<'a> {
    pub key: RunKey,
    pub seed: u64,
    pub exporter: &'a Exporter,
    pub containers: &'a ContainerManager,
    pub config: &'a BenchConfig,
}

impl RunContext<'_> {
    pub fn layout(&self) -> &ExportLayout {
        self.exporter.layout()
    }

    /// Everything up to and including the queries. Teardown is the caller's.
    pub async fn execute(&self, state: &mut RunState, result: &mut RunResult) -> BenchResult<()> {
        let scenario = self.key.scenario;

        let started = Instant::now();
        let exporter = self.exporter.clone();
        let manifest: Manifest = blocking(move || exporter.ensure_pivot()).await?;
        let exporter = self.exporter.clone();
        let files = blocking(move || exporter.ensure_scenario(scenario)).await?;
        println!(
            "  export     {} files ready in {:.1}s ({} nodes, {} edges, {} samples)",
            files.len(),
            started.elapsed().as_secs_f64(),
            manifest.node_total(),
            manifest.edge_total(),
            manifest.sample_count
        );

        let started = Instant::now();
        self.containers
            .start(scenario, self.key.ram_gb, self.layout().root(), &mut state.handles)
            .await?;
        println!(
            "  containers {} ready in {:.1}s",
            state.handles.iter().map(|h| h.name.as_str()).collect::<Vec<_>>().join(", "),
            started.elapsed().as_secs_f64()
        );

        let mut monitor = ResourceMonitor::start(&self.config.monitor, &state.handles).await;
        monitor.begin_phase("load");
        state.monitor = Some(monitor);

        let conns = Connections::open(scenario, &self.config.engines)
            .await
            .map_err(|e| BenchError::ContainerStart(format!("cannot connect: {}", e)))?;
        let outcome = self.load_and_query(&conns, &manifest, state, result).await;
        conns.close().await;
        outcome
    }

    async fn load_and_query(
        &self,
        conns: &Connections,
        manifest: &Manifest,
        state: &mut RunState,
        result: &mut RunResult,
    ) -> BenchResult<()> {
        let scenario = self.key.scenario;
        let profile = self.key.profile;

        let report = loader::load(scenario, conns, self.layout(), manifest, self.config).await?;
        println!(
            "  load       {:.1}s: {} nodes, {} edges, {} samples, {} chunks, {} triples",
            report.duration_ms / 1000.0,
            report.nodes,
            report.edges,
            report.samples,
            report.chunks,
            report.triples
        );
        result.load = Some(report);

        if let Some(monitor) = state.monitor.as_mut() {
            monitor.begin_phase("queries");
        }
        let protocol = profile.protocol();
        let params = ParamGenerator::for_scenario(scenario, self.layout(), self.seed, profile.scale, protocol.variants)?;
        let library = QueryLibrary::load(&self.config.query_root, scenario)?;
        let executor = QueryExecutor::for_scenario(conns, scenario, protocol, self.config.timeouts.query)?;

        let records = executor.run_all(&library, &params).await;
        for r in &records {
            let rows = r.row_count().map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
            if r.has_errors() {
                println!(
                    "  {:<4} {:<22} p95 {:>10.2} ms  rows {:>8}  errors {}",
                    r.query_id,
                    r.name,
                    r.stats.p95_ms,
                    rows,
                    r.errors.len()
                );
            } else {
                println!("  {:<4} {:<22} p95 {:>10.2} ms  rows {:>8}", r.query_id, r.name, r.stats.p95_ms, rows);
            }
        }
        let any_errors = records.iter().any(|r| r.has_errors());
        result.set_queries(records);

        // A query error may be the symptom of a killed engine
        if any_errors {
            if let Some(victim) = self.containers.oom_victim(&state.handles).await {
                return Err(BenchError::Oom(format!("{} killed during queries", victim)));
            }
        }
        info!(run = %self.key.file_stem(), global_p95_ms = result.global_p95_ms, "Queries complete");
        Ok(())
    }

    /// Reclassify a failure as OOM when one of the run's containers was killed.
    pub async fn classify(&self, error: BenchError, handles: &[ContainerHandle]) -> BenchError {
        if matches!(error, BenchError::Oom(_)) || handles.is_empty() {
            return error;
        }
        match self.containers.oom_victim(handles).await {
            Some(victim) => {
                warn!(container = %victim, error = %error, "Container was OOM-killed");
                BenchError::Oom(format!("{} killed: {}", victim, error))
            }
            None => error,
        }
    }
}
