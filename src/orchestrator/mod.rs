//! Session orchestrator
//!
//! Runs the `(scenario, profile, RAM)` matrix strictly one run at a time.
//! Any error other than a query error ends the run it occurs in; the session
//! always moves on to the next pending run. The checkpoint is rewritten on
//! every transition so an interrupted session resumes where it stopped.

pub mod run;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::config::BenchConfig;
use crate::container::ContainerManager;
use crate::error::{BenchError, BenchResult};
use crate::export::{ExportLayout, Exporter};
use crate::model::{Profile, Scenario};
use crate::results::checkpoint::{find_resumable, session_id};
use crate::results::{Checkpoint, RunEntry, RunError, RunKey, RunResult, RunStatus, SessionLock};

use run::{RunContext, RunState};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub scenarios: Vec<Scenario>,
    pub profiles: Vec<Profile>,
    pub ram_gb: Vec<u32>,
    pub seed: u64,
    pub export_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Session id to resume; otherwise the newest matching session is resumed
    pub resume: Option<String>,
    pub rerun_failed: bool,
    pub keep_exports: bool,
    pub config: BenchConfig,
}

impl SessionOptions {
    pub fn new(scenarios: Vec<Scenario>, profiles: Vec<Profile>, ram_gb: Vec<u32>) -> Self {
        Self {
            scenarios,
            profiles,
            ram_gb,
            seed: 42,
            export_dir: PathBuf::from("exports"),
            output_dir: PathBuf::from("results"),
            resume: None,
            rerun_failed: false,
            keep_exports: false,
            config: BenchConfig::default(),
        }
    }

    pub fn validate(&self) -> BenchResult<()> {
        if self.scenarios.is_empty() {
            return Err(BenchError::Config("no scenario selected".to_string()));
        }
        if self.profiles.is_empty() {
            return Err(BenchError::Config("no profile selected".to_string()));
        }
        if self.ram_gb.is_empty() || self.ram_gb.contains(&0) {
            return Err(BenchError::Config("RAM caps must be positive".to_string()));
        }
        Ok(())
    }

    /// Profile-major so one pivot serves consecutive runs, then scenario, then RAM.
    pub fn matrix(&self) -> Vec<RunKey> {
        let mut out = Vec::new();
        for &profile in &self.profiles {
            for &scenario in &self.scenarios {
                for &ram in &self.ram_gb {
                    out.push(RunKey::new(scenario, profile, ram));
                }
            }
        }
        out
    }
}

/// Final state of a session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    pub session_dir: PathBuf,
    pub runs: Vec<RunEntry>,
    pub interrupted: bool,
}

impl SessionReport {
    pub fn all_completed(&self) -> bool {
        !self.interrupted && self.runs.iter().all(|r| r.status == RunStatus::Completed)
    }
}

/// Ctrl-C sets the flag and wakes the run in progress.
#[derive(Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    pub fn listen() -> Self {
        let interrupt = Self::default();
        let handle = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                handle.trigger();
            }
        });
        interrupt
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        self.notify.notified().await
    }
}

pub struct Orchestrator {
    options: SessionOptions,
    containers: ContainerManager,
    interrupt: Interrupt,
}

impl Orchestrator {
    pub fn new(options: SessionOptions, interrupt: Interrupt) -> Self {
        let containers = ContainerManager::new(options.config.engines.clone(), options.config.timeouts.clone());
        Self {
            options,
            containers,
            interrupt,
        }
    }

    /// Resume the requested or newest matching session, or start a new one.
    pub fn open_checkpoint(&self) -> BenchResult<Checkpoint> {
        let matrix = self.options.matrix();
        let seed = self.options.seed;
        let root = &self.options.output_dir;

        let resumed = match &self.options.resume {
            Some(id) => {
                let checkpoint = Checkpoint::load(&root.join(id))?
                    .ok_or_else(|| BenchError::Config(format!("no checkpoint for session {}", id)))?;
                if !checkpoint.matches(&matrix, seed) {
                    return Err(BenchError::Config(format!(
                        "session {} was started with a different matrix or seed",
                        id
                    )));
                }
                Some(checkpoint)
            }
            None => find_resumable(root, &matrix, seed)?.filter(|c| {
                c.runs
                    .iter()
                    .any(|r| matches!(r.status, RunStatus::Pending | RunStatus::Running))
                    || (self.options.rerun_failed && c.count(RunStatus::Failed) > 0)
            }),
        };

        match resumed {
            Some(mut checkpoint) => {
                checkpoint.prepare_resume(self.options.rerun_failed);
                checkpoint.save()?;
                info!(
                    session = %checkpoint.session_id,
                    completed = checkpoint.count(RunStatus::Completed),
                    pending = checkpoint.count(RunStatus::Pending),
                    "Resuming session"
                );
                Ok(checkpoint)
            }
            None => {
                let id = session_id(Utc::now(), &matrix, seed);
                let checkpoint = Checkpoint::new(&root.join(&id), id, seed, &matrix);
                checkpoint.save()?;
                info!(session = %checkpoint.session_id, runs = matrix.len(), "New session");
                Ok(checkpoint)
            }
        }
    }

    pub async fn run_session(&self) -> BenchResult<SessionReport> {
        self.options.validate()?;
        let _lock = SessionLock::acquire(&self.options.output_dir)?;
        let mut checkpoint = self.open_checkpoint()?;
        println!(
            "Session {} ({} runs, {} pending)",
            checkpoint.session_id,
            checkpoint.runs.len(),
            checkpoint.count(RunStatus::Pending)
        );

        while let Some(index) = checkpoint.next_pending() {
            if self.interrupt.is_set() {
                break;
            }
            self.run_one(&mut checkpoint, index).await?;
        }

        let interrupted = self.interrupt.is_set();
        if interrupted {
            println!("Interrupted; resume with --resume {}", checkpoint.session_id);
        }
        Ok(SessionReport {
            session_id: checkpoint.session_id.clone(),
            session_dir: checkpoint.session_dir().to_path_buf(),
            runs: checkpoint.runs.clone(),
            interrupted,
        })
    }

    fn exporter(&self, profile: Profile) -> Exporter {
        let layout = ExportLayout::for_profile(&self.options.export_dir, &profile, self.options.seed);
        Exporter::new(layout, profile, self.options.seed, &self.options.config.generator)
    }

    /// Execute one run and record its outcome. Only checkpoint I/O errors
    /// propagate; run failures are recorded.
    async fn run_one(&self, checkpoint: &mut Checkpoint, index: usize) -> BenchResult<()> {
        let key = checkpoint.runs[index].key;
        println!();
        println!("=== {} | {} | {} GB ===", key.scenario, key.profile, key.ram_gb);
        checkpoint.mark_running(index)?;

        let exporter = self.exporter(key.profile);
        let ctx = RunContext {
            key,
            seed: self.options.seed,
            exporter: &exporter,
            containers: &self.containers,
            config: &self.options.config,
        };
        let mut state = RunState::default();
        let mut result = RunResult::new(key, self.options.seed);

        let outcome = tokio::select! {
            outcome = ctx.execute(&mut state, &mut result) => Some(outcome),
            _ = self.interrupt.wait() => None,
        };

        if let Some(monitor) = state.monitor.take() {
            result.resources = Some(monitor.stop().await);
        }
        let outcome = match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(ctx.classify(e, &state.handles).await),
            None => {
                println!("  interrupted, tearing down");
                self.teardown().await;
                // Left as running; resume re-queues it
                return Ok(());
            }
        };
        self.teardown().await;

        let (status, run_error) = match &outcome {
            Ok(()) => {
                result.complete();
                (RunStatus::Completed, None)
            }
            Err(e) => {
                error!(run = %key.file_stem(), kind = %e.kind(), error = %e, "Run failed");
                println!("  FAILED [{}] {}", e.kind(), e);
                result.fail(e);
                (RunStatus::Failed, Some(RunError::from(e)))
            }
        };

        let session_dir = checkpoint.session_dir().to_path_buf();
        let result_file = match result.write(&session_dir) {
            Ok((full, _)) => full.file_name().map(|n| n.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(error = %e, "Could not write run result");
                None
            }
        };
        if let Some(resources) = &result.resources {
            println!(
                "  resources  peak {:.1} MiB, cpu avg {:.0}% ({:?})",
                resources.peak_memory_bytes() as f64 / (1024.0 * 1024.0),
                resources.cpu_avg_percent,
                resources.source
            );
        }
        if status == RunStatus::Completed {
            println!("  completed  global p95 {:.2} ms", result.global_p95_ms);
        }
        checkpoint.mark_finished(index, status, result_file, run_error)?;

        if !self.options.keep_exports {
            self.prune(&exporter, checkpoint, index);
        }
        Ok(())
    }

    async fn teardown(&self) {
        match self.containers.teardown_all().await {
            Ok(n) => println!("  teardown   {} containers removed", n),
            Err(e) => {
                warn!(error = %e, "Teardown failed");
                println!("  teardown   FAILED [{}] {}", e.kind(), e);
            }
        }
    }

    fn prune(&self, exporter: &Exporter, checkpoint: &Checkpoint, index: usize) {
        let key = checkpoint.runs[index].key;
        let pending: Vec<Scenario> = checkpoint
            .pending_after(index)
            .into_iter()
            .filter(|k| k.profile == key.profile)
            .map(|k| k.scenario)
            .collect();
        if let Err(e) = exporter.prune(key.scenario, &pending) {
            warn!(error = %e, "Pruning export files failed");
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.options.output_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Duration, Scale};
    use tempfile::tempdir;

    fn options(root: &Path) -> SessionOptions {
        let mut o = SessionOptions::new(
            vec![Scenario::P1, Scenario::M1],
            vec![Profile::new(Scale::Small, Duration::TwoDays)],
            vec![4, 8],
        );
        o.output_dir = root.to_path_buf();
        o
    }

    #[test]
    fn test_matrix_order() {
        let dir = tempdir().unwrap();
        let m = options(dir.path()).matrix();
        let stems: Vec<String> = m.iter().map(|k| k.file_stem()).collect();
        assert_eq!(
            stems,
            vec!["P1_small-2d_4GB", "P1_small-2d_8GB", "M1_small-2d_4GB", "M1_small-2d_8GB"]
        );
    }

    #[test]
    fn test_validate_rejects_zero_ram() {
        let dir = tempdir().unwrap();
        let mut o = options(dir.path());
        o.ram_gb = vec![0];
        assert_eq!(o.validate().unwrap_err().kind(), crate::error::ErrorKind::Config);
    }

    #[tokio::test]
    async fn test_resume_skips_finished_runs() {
        let dir = tempdir().unwrap();
        let orch = Orchestrator::new(options(dir.path()), Interrupt::default());
        let mut first = orch.open_checkpoint().unwrap();
        first.mark_running(0).unwrap();
        first.mark_finished(0, RunStatus::Completed, None, None).unwrap();
        first.mark_running(1).unwrap();

        let resumed = orch.open_checkpoint().unwrap();
        assert_eq!(resumed.session_id, first.session_id);
        assert_eq!(resumed.runs[0].status, RunStatus::Completed);
        assert_eq!(resumed.next_pending(), Some(1));
    }

    #[tokio::test]
    async fn test_finished_session_starts_fresh() {
        let dir = tempdir().unwrap();
        let orch = Orchestrator::new(options(dir.path()), Interrupt::default());
        let mut first = orch.open_checkpoint().unwrap();
        for i in 0..first.runs.len() {
            first.mark_finished(i, RunStatus::Completed, None, None).unwrap();
        }
        // session ids have one-second resolution
        std::thread::sleep(std::time::Duration::from_millis(1100));
        let second = orch.open_checkpoint().unwrap();
        assert_ne!(second.session_id, first.session_id);
        assert_eq!(second.next_pending(), Some(0));
    }

    #[tokio::test]
    async fn test_explicit_resume_of_unknown_session_fails() {
        let dir = tempdir().unwrap();
        let mut o = options(dir.path());
        o.resume = Some("20240101_000000_deadbeef".to_string());
        let orch = Orchestrator::new(o, Interrupt::default());
        assert!(orch.open_checkpoint().is_err());
    }

    #[test]
    fn test_interrupt_flag() {
        let i = Interrupt::default();
        assert!(!i.is_set());
        i.trigger();
        assert!(i.is_set());
    }
}
