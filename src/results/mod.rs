//! Run results, session checkpoint and the results-directory lock

pub mod checkpoint;
pub mod lock;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult, ErrorKind};
use crate::loader::LoadReport;
use crate::model::{Profile, Protocol, Scenario};
use crate::monitor::{MonitorSource, ResourceSummary};
use crate::query::{global_p95, QueryRecord};

pub use checkpoint::{Checkpoint, RunEntry, RunStatus};
pub use lock::SessionLock;

/// One `(scenario, profile, RAM cap)` cell of the run matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey {
    pub scenario: Scenario,
    pub profile: Profile,
    pub ram_gb: u32,
}

impl RunKey {
    pub fn new(scenario: Scenario, profile: Profile, ram_gb: u32) -> Self {
        Self {
            scenario,
            profile,
            ram_gb,
        }
    }

    /// `<scenario>_<profile>_<RAM>GB`
    pub fn file_stem(&self) -> String {
        format!("{}_{}_{}GB", self.scenario, self.profile, self.ram_gb)
    }

    pub fn full_file_name(&self) -> String {
        format!("{}_full.json", self.file_stem())
    }

    pub fn summary_file_name(&self) -> String {
        format!("{}_summary.json", self.file_stem())
    }
}

/// Kind and message of the error that ended a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&BenchError> for RunError {
    fn from(e: &BenchError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Everything measured in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(flatten)]
    pub key: RunKey,
    pub seed: u64,
    pub timestamp: DateTime<Utc>,
    pub protocol: Protocol,
    /// Query texts always go through the simple protocol
    pub prepared_statements: bool,
    pub status: RunStatus,
    pub error: Option<RunError>,
    pub load: Option<LoadReport>,
    pub resources: Option<ResourceSummary>,
    pub queries: Vec<QueryRecord>,
    pub global_p95_ms: f64,
}

impl RunResult {
    pub fn new(key: RunKey, seed: u64) -> Self {
        Self {
            key,
            seed,
            timestamp: Utc::now(),
            protocol: key.profile.protocol(),
            prepared_statements: false,
            status: RunStatus::Running,
            error: None,
            load: None,
            resources: None,
            queries: Vec::new(),
            global_p95_ms: 0.0,
        }
    }

    pub fn set_queries(&mut self, queries: Vec<QueryRecord>) {
        self.global_p95_ms = global_p95(&queries);
        self.queries = queries;
    }

    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
    }

    pub fn fail(&mut self, error: &BenchError) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
    }

    pub fn summary(&self) -> RunSummary {
        let resources = self.resources.as_ref();
        RunSummary {
            key: self.key,
            seed: self.seed,
            timestamp: self.timestamp,
            status: self.status,
            error: self.error.clone(),
            load_duration_ms: self.load.as_ref().map(|l| l.duration_ms),
            nodes: self.load.as_ref().map(|l| l.nodes),
            edges: self.load.as_ref().map(|l| l.edges),
            peak_memory_bytes: resources.map(|r| r.peak_memory_bytes()),
            monitor_source: resources.and_then(|r| r.source),
            global_p95_ms: self.global_p95_ms,
            queries: self
                .queries
                .iter()
                .map(|q| QuerySummary {
                    query_id: q.query_id.clone(),
                    name: q.name.clone(),
                    p50_ms: q.stats.p50_ms,
                    p95_ms: q.stats.p95_ms,
                    mean_ms: q.stats.mean_ms,
                    count: q.stats.count,
                    rows: q.row_count(),
                    errors: q.errors.len(),
                })
                .collect(),
        }
    }

    /// Write the full and summary files into `dir`.
    pub fn write(&self, dir: &Path) -> BenchResult<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(dir)?;
        let full = dir.join(self.key.full_file_name());
        let summary = dir.join(self.key.summary_file_name());
        write_json_atomically(&full, self)?;
        write_json_atomically(&summary, &self.summary())?;
        Ok((full, summary))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySummary {
    pub query_id: String,
    pub name: String,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub mean_ms: f64,
    pub count: usize,
    pub rows: Option<u64>,
    pub errors: usize,
}

/// Percentiles and counts without the latency samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub key: RunKey,
    pub seed: u64,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub error: Option<RunError>,
    pub load_duration_ms: Option<f64>,
    pub nodes: Option<u64>,
    pub edges: Option<u64>,
    pub peak_memory_bytes: Option<u64>,
    pub monitor_source: Option<MonitorSource>,
    pub global_p95_ms: f64,
    pub queries: Vec<QuerySummary>,
}

/// Serialise to `<path>.tmp` and rename over `path`.
pub fn write_json_atomically<T: Serialize>(path: &Path, value: &T) -> BenchResult<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Duration, Scale};
    use crate::query::QueryRecord;
    use tempfile::tempdir;

    fn key() -> RunKey {
        RunKey::new(Scenario::P1, Profile::new(Scale::Small, Duration::TwoDays), 8)
    }

    #[test]
    fn test_file_names() {
        assert_eq!(key().full_file_name(), "P1_small-2d_8GB_full.json");
        assert_eq!(key().summary_file_name(), "P1_small-2d_8GB_summary.json");
    }

    #[test]
    fn test_failed_run_records_kind() {
        let mut result = RunResult::new(key(), 42);
        result.fail(&BenchError::Oom("bosbench-rdf".into()));
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::Oom);
        assert_eq!(result.protocol.measure, 10);
    }

    #[test]
    fn test_write_full_and_summary() {
        let dir = tempdir().unwrap();
        let mut result = RunResult::new(key(), 42);
        let mut q = QueryRecord {
            query_id: "Q1".into(),
            name: "building_inventory".into(),
            ..QueryRecord::default()
        };
        q.record(1.0, 5);
        q.record(3.0, 5);
        q.finish();
        result.set_queries(vec![q]);
        result.complete();

        let (full, summary) = result.write(dir.path()).unwrap();
        let full_json: serde_json::Value = serde_json::from_slice(&std::fs::read(&full).unwrap()).unwrap();
        assert_eq!(full_json["scenario"], "P1");
        assert_eq!(full_json["ram_gb"], 8);
        assert_eq!(full_json["queries"][0]["latencies_ms"].as_array().unwrap().len(), 2);

        let summary: RunSummary = serde_json::from_slice(&std::fs::read(&summary).unwrap()).unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.queries[0].rows, Some(5));
        assert_eq!(summary.queries[0].p50_ms, 2.0);
        assert!(!dir.path().join("P1_small-2d_8GB_full.json.tmp").exists());
    }
}
