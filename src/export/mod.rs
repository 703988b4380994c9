//! Exporter
//!
//! The pivot is generated once per `(profile, seed)` and reused while its
//! manifest still verifies. Scenario files are derived from the pivot alone,
//! only when a scenario is about to run, and pruned after it finishes.
//!
//! Every file is written under a `.partial` name and renamed into place, so a
//! file that exists is always complete.

pub mod chunks;
pub mod manifest;
pub mod ntriples;
pub mod pivot;
pub mod tabular;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::GeneratorConfig;
use crate::error::BenchResult;
use crate::generator::{generate_structure, PointSeries};
use crate::model::{Edge, ExportFile, Node, Profile, Scenario};

pub use chunks::Chunk;
pub use manifest::Manifest;

pub const PIVOT_DIR: &str = "pivot";
pub const NODES_PARQUET: &str = "nodes.parquet";
pub const EDGES_PARQUET: &str = "edges.parquet";
pub const TIMESERIES_PARQUET: &str = "timeseries.parquet";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Paths of every exported file. The root is what containers mount at `/data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    root: PathBuf,
}

impl ExportLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<base>/<profile>-seed<seed>`
    pub fn for_profile(base: &Path, profile: &Profile, seed: u64) -> Self {
        Self::new(base.join(format!("{}-seed{}", profile, seed)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pivot_dir(&self) -> PathBuf {
        self.root.join(PIVOT_DIR)
    }

    pub fn nodes_parquet(&self) -> PathBuf {
        self.pivot_dir().join(NODES_PARQUET)
    }

    pub fn edges_parquet(&self) -> PathBuf {
        self.pivot_dir().join(EDGES_PARQUET)
    }

    pub fn timeseries_parquet(&self) -> PathBuf {
        self.pivot_dir().join(TIMESERIES_PARQUET)
    }

    pub fn manifest(&self) -> PathBuf {
        self.pivot_dir().join(MANIFEST_FILE)
    }

    pub fn file(&self, file: ExportFile) -> PathBuf {
        self.root.join(file.file_name())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Run `write` against a temporary path and move the result into place.
fn write_atomically<T, F>(path: &Path, write: F) -> BenchResult<T>
where
    F: FnOnce(&Path) -> BenchResult<T>,
{
    let tmp = partial_path(path);
    match write(&tmp) {
        Ok(value) => {
            fs::rename(&tmp, path)?;
            Ok(value)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Files derived from nodes and edges rather than from the time series
fn reads_graph(file: ExportFile) -> bool {
    !matches!(file, ExportFile::TimeseriesCsv | ExportFile::MgChunks | ExportFile::ChunksNt)
}

#[derive(Debug, Clone)]
pub struct Exporter {
    layout: ExportLayout,
    profile: Profile,
    seed: u64,
    memory_budget_bytes: usize,
}

impl Exporter {
    pub fn new(layout: ExportLayout, profile: Profile, seed: u64, generator: &GeneratorConfig) -> Self {
        Self {
            layout,
            profile,
            seed,
            memory_budget_bytes: generator.memory_budget_bytes,
        }
    }

    pub fn layout(&self) -> &ExportLayout {
        &self.layout
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Reuse the pivot when its manifest matches and verifies; otherwise write it.
    pub fn ensure_pivot(&self) -> BenchResult<Manifest> {
        if let Some(manifest) = Manifest::load(&self.layout.manifest())? {
            if manifest.matches(&self.profile, self.seed) && manifest.verify(&self.layout.pivot_dir())? {
                info!(profile = %self.profile, seed = self.seed, "Reusing existing pivot");
                return Ok(manifest);
            }
            warn!(path = %self.layout.manifest().display(), "Pivot manifest is stale, regenerating");
        }
        self.write_pivot()
    }

    /// Generate the dataset and write the three pivot files and the manifest.
    pub fn write_pivot(&self) -> BenchResult<Manifest> {
        let started = Instant::now();
        let counts = self.profile.counts();
        fs::create_dir_all(self.layout.pivot_dir())?;
        // The manifest marks a complete pivot; drop any old one first
        let _ = fs::remove_file(self.layout.manifest());

        let generated = generate_structure(&counts, self.seed);
        for warning in &generated.report.warnings {
            warn!("{}", warning);
        }
        let mut dataset = generated.dataset;
        dataset.sort();

        write_atomically(&self.layout.nodes_parquet(), |p| pivot::write_nodes(p, &dataset.nodes))?;
        write_atomically(&self.layout.edges_parquet(), |p| pivot::write_edges(p, &dataset.edges))?;
        info!(
            nodes = dataset.nodes.len(),
            edges = dataset.edges.len(),
            "Wrote structural pivot"
        );

        let series = PointSeries::from_dataset(&dataset);
        let generator = series.generator(self.seed, counts.n_steps(), self.memory_budget_bytes)?;
        let sample_count = write_atomically(&self.layout.timeseries_parquet(), |p| {
            let mut writer = pivot::TimeseriesWriter::create(p)?;
            generator.generate(|emitted| {
                debug!(samples = emitted.len(), "Writing trajectory partition");
                writer.write(&series.resolve(&emitted))
            })?;
            writer.finish()
        })?;

        let mut files = std::collections::BTreeMap::new();
        for name in [NODES_PARQUET, EDGES_PARQUET, TIMESERIES_PARQUET] {
            files.insert(name.to_string(), manifest::sha256_file(&self.layout.pivot_dir().join(name))?);
        }
        let manifest = Manifest {
            seed: self.seed,
            profile: self.profile.to_string(),
            counts,
            node_counts: dataset.node_counts(),
            edge_counts: dataset.edge_counts(),
            sample_count,
            warnings: generated.report.warnings.clone(),
            files,
        };
        manifest.save(&self.layout.manifest())?;
        info!(
            samples = sample_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Wrote time-series pivot"
        );
        Ok(manifest)
    }

    fn read_graph(&self) -> BenchResult<(Vec<Node>, Vec<Edge>)> {
        Ok((
            pivot::read_nodes(&self.layout.nodes_parquet())?,
            pivot::read_edges(&self.layout.edges_parquet())?,
        ))
    }

    /// Write whichever of the scenario's files are missing; returns all of
    /// its file paths.
    pub fn ensure_scenario(&self, scenario: Scenario) -> BenchResult<Vec<PathBuf>> {
        let mut graph: Option<(Vec<Node>, Vec<Edge>)> = None;
        let mut paths = Vec::new();
        for &file in scenario.export_files() {
            let path = self.layout.file(file);
            if path.exists() {
                debug!(file = file.file_name(), "Export file present");
            } else {
                if graph.is_none() && reads_graph(file) {
                    graph = Some(self.read_graph()?);
                }
                let started = Instant::now();
                let rows = write_atomically(&path, |p| self.write_file(file, p, graph.as_ref()))?;
                info!(
                    scenario = %scenario,
                    file = file.file_name(),
                    rows,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Exported scenario file"
                );
            }
            paths.push(path);
        }
        Ok(paths)
    }

    fn write_file(&self, file: ExportFile, path: &Path, graph: Option<&(Vec<Node>, Vec<Edge>)>) -> BenchResult<usize> {
        let timeseries = self.layout.timeseries_parquet();
        let empty = (Vec::new(), Vec::new());
        let (nodes, edges) = graph.unwrap_or(&empty);
        match file {
            ExportFile::PgNodes => tabular::write_pg_nodes(path, nodes),
            ExportFile::PgJsonbNodes => tabular::write_jsonb_nodes(path, nodes),
            ExportFile::MgNodes => tabular::write_mg_nodes(path, nodes),
            ExportFile::PgEdges | ExportFile::MgEdges => tabular::write_edges(path, edges),
            ExportFile::MgChunks => chunks::write_mg_chunks(path, &timeseries),
            ExportFile::GraphNt => ntriples::write_graph_nt(path, nodes, edges),
            ExportFile::ChunksNt => ntriples::write_chunks_nt(path, &timeseries),
            ExportFile::TimeseriesCsv => tabular::write_timeseries_csv(path, &timeseries),
        }
    }

    /// Delete the finished scenario's files that no pending scenario of the
    /// same profile reads. The pivot is never pruned.
    pub fn prune(&self, finished: Scenario, pending: &[Scenario]) -> BenchResult<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for &file in finished.export_files() {
            if pending.iter().any(|s| s.export_files().contains(&file)) {
                debug!(file = file.file_name(), "Kept for a pending scenario");
                continue;
            }
            let path = self.layout.file(file);
            if path.exists() {
                fs::remove_file(&path)?;
                removed.push(path);
            }
        }
        if !removed.is_empty() {
            info!(scenario = %finished, files = removed.len(), "Pruned export files");
        }
        Ok(removed)
    }
}
