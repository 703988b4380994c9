//! Session checkpoint
//!
//! Lists every run of the session's matrix with its status. The file is
//! rewritten atomically on every state transition so an interrupted session
//! resumes from the first pending run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use super::{write_json_atomically, RunError, RunKey};
use crate::error::BenchResult;

pub const CHECKPOINT_FILE: &str = "checkpoint.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    #[serde(flatten)]
    pub key: RunKey,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Full result file, relative to the session directory
    pub result_file: Option<String>,
    pub error: Option<RunError>,
}

impl RunEntry {
    pub fn pending(key: RunKey) -> Self {
        Self {
            key,
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
            result_file: None,
            error: None,
        }
    }
}

/// First 8 hex digits of the SHA-256 of the matrix and seed
pub fn matrix_hash(matrix: &[RunKey], seed: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    for key in matrix {
        hasher.update(key.file_stem().as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize()[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

/// `YYYYMMDD_HHMMSS_<hash>`
pub fn session_id(now: DateTime<Utc>, matrix: &[RunKey], seed: u64) -> String {
    format!("{}_{}", now.format("%Y%m%d_%H%M%S"), matrix_hash(matrix, seed))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub seed: u64,
    pub created_at: DateTime<Utc>,
    pub runs: Vec<RunEntry>,
    #[serde(skip)]
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(session_dir: &Path, session_id: String, seed: u64, matrix: &[RunKey]) -> Self {
        Self {
            session_id,
            seed,
            created_at: Utc::now(),
            runs: matrix.iter().copied().map(RunEntry::pending).collect(),
            path: session_dir.join(CHECKPOINT_FILE),
        }
    }

    pub fn load(session_dir: &Path) -> BenchResult<Option<Self>> {
        let path = session_dir.join(CHECKPOINT_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let mut checkpoint: Checkpoint = serde_json::from_slice(&std::fs::read(&path)?)?;
        checkpoint.path = path;
        Ok(Some(checkpoint))
    }

    pub fn save(&self) -> BenchResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_json_atomically(&self.path, self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn matrix(&self) -> Vec<RunKey> {
        self.runs.iter().map(|r| r.key).collect()
    }

    pub fn matches(&self, matrix: &[RunKey], seed: u64) -> bool {
        self.seed == seed && self.matrix() == matrix
    }

    /// Prepare for a resumed session: interrupted runs become pending again,
    /// failed runs too when `rerun_failed` is set. Returns how many changed.
    pub fn prepare_resume(&mut self, rerun_failed: bool) -> usize {
        let mut changed = 0;
        for run in &mut self.runs {
            let requeue = match run.status {
                RunStatus::Running => true,
                RunStatus::Failed => rerun_failed,
                _ => false,
            };
            if requeue {
                run.status = RunStatus::Pending;
                run.started_at = None;
                run.finished_at = None;
                run.error = None;
                changed += 1;
            }
        }
        if changed > 0 {
            info!(session = %self.session_id, runs = changed, "Re-queued runs");
        }
        changed
    }

    pub fn next_pending(&self) -> Option<usize> {
        self.runs.iter().position(|r| r.status == RunStatus::Pending)
    }

    /// Keys of pending runs after `index`
    pub fn pending_after(&self, index: usize) -> Vec<RunKey> {
        self.runs
            .iter()
            .skip(index + 1)
            .filter(|r| r.status == RunStatus::Pending)
            .map(|r| r.key)
            .collect()
    }

    pub fn mark_running(&mut self, index: usize) -> BenchResult<()> {
        let run = &mut self.runs[index];
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        self.save()
    }

    pub fn mark_finished(
        &mut self,
        index: usize,
        status: RunStatus,
        result_file: Option<String>,
        error: Option<RunError>,
    ) -> BenchResult<()> {
        let run = &mut self.runs[index];
        run.status = status;
        run.finished_at = Some(Utc::now());
        run.result_file = result_file;
        run.error = error;
        self.save()
    }

    pub fn count(&self, status: RunStatus) -> usize {
        self.runs.iter().filter(|r| r.status == status).count()
    }

    /// Whether every run completed
    pub fn all_completed(&self) -> bool {
        self.runs.iter().all(|r| r.status == RunStatus::Completed)
    }
}

/// Newest session directory under `root` whose checkpoint matches the matrix
pub fn find_resumable(root: &Path, matrix: &[RunKey], seed: u64) -> BenchResult<Option<Checkpoint>> {
    if !root.exists() {
        return Ok(None);
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    // Session ids start with the timestamp, so name order is age order
    dirs.sort();
    for dir in dirs.iter().rev() {
        if let Some(checkpoint) = Checkpoint::load(dir)? {
            if checkpoint.matches(matrix, seed) {
                return Ok(Some(checkpoint));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::{Duration, Profile, Scale, Scenario};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn matrix() -> Vec<RunKey> {
        let profile = Profile::new(Scale::Small, Duration::TwoDays);
        Scenario::ALL.iter().map(|s| RunKey::new(*s, profile, 8)).collect()
    }

    #[test]
    fn test_session_id_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
        let id = session_id(now, &matrix(), 42);
        assert!(id.starts_with("20240305_140709_"));
        assert_eq!(id.len(), "20240305_140709_".len() + 8);
        assert_eq!(id, session_id(now, &matrix(), 42));
        assert_ne!(matrix_hash(&matrix(), 42), matrix_hash(&matrix(), 43));
    }

    #[test]
    fn test_transitions_persist() {
        let dir = tempdir().unwrap();
        let mut cp = Checkpoint::new(dir.path(), "s".into(), 42, &matrix());
        cp.save().unwrap();
        assert_eq!(cp.next_pending(), Some(0));

        cp.mark_running(0).unwrap();
        cp.mark_finished(0, RunStatus::Completed, Some("P1_small-2d_8GB_full.json".into()), None)
            .unwrap();
        cp.mark_running(1).unwrap();
        cp.mark_finished(
            1,
            RunStatus::Failed,
            None,
            Some(RunError {
                kind: ErrorKind::Oom,
                message: "killed".into(),
            }),
        )
        .unwrap();
        cp.mark_running(2).unwrap();

        let mut loaded = Checkpoint::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.runs[0].status, RunStatus::Completed);
        assert_eq!(loaded.runs[2].status, RunStatus::Running);
        assert!(loaded.matches(&matrix(), 42));

        assert_eq!(loaded.prepare_resume(false), 1);
        assert_eq!(loaded.next_pending(), Some(2));
        assert_eq!(loaded.runs[1].status, RunStatus::Failed);

        assert_eq!(loaded.prepare_resume(true), 1);
        assert_eq!(loaded.next_pending(), Some(1));
        assert_eq!(loaded.pending_after(1).len(), 4);
    }

    #[test]
    fn test_find_resumable_picks_newest_matching() {
        let root = tempdir().unwrap();
        for id in ["20240101_000000_aaaaaaaa", "20240102_000000_bbbbbbbb"] {
            Checkpoint::new(&root.path().join(id), id.into(), 42, &matrix()).save().unwrap();
        }
        Checkpoint::new(&root.path().join("20240103_000000_cccccccc"), "c".into(), 7, &matrix())
            .save()
            .unwrap();

        let found = find_resumable(root.path(), &matrix(), 42).unwrap().unwrap();
        assert_eq!(found.session_id, "20240102_000000_bbbbbbbb");
        assert!(find_resumable(root.path(), &matrix()[..1], 42).unwrap().is_none());
    }
}
