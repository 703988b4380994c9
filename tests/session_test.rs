use std::path::Path;

use bosbench::model::{Duration, Profile, Scale};
use bosbench::orchestrator::{Interrupt, Orchestrator, SessionOptions};
use bosbench::results::{Checkpoint, RunError, RunResult, RunStatus};
use bosbench::{BenchError, ErrorKind, Scenario};
use tempfile::tempdir;

fn ten_runs(root: &Path) -> SessionOptions {
    let mut options = SessionOptions::new(
        vec![Scenario::P1, Scenario::P2, Scenario::M1, Scenario::M2, Scenario::O1],
        vec![Profile::new(Scale::Small, Duration::TwoDays)],
        vec![4, 8],
    );
    options.output_dir = root.to_path_buf();
    options
}

#[test]
fn test_resume_after_interrupt_runs_only_the_remainder() {
    let dir = tempdir().unwrap();
    let orch = Orchestrator::new(ten_runs(dir.path()), Interrupt::default());

    let mut checkpoint = orch.open_checkpoint().unwrap();
    assert_eq!(checkpoint.runs.len(), 10);
    for i in 0..3 {
        checkpoint.mark_running(i).unwrap();
        let result = RunResult::new(checkpoint.runs[i].key, 42);
        checkpoint
            .mark_finished(i, RunStatus::Completed, Some(result.key.full_file_name()), None)
            .unwrap();
    }
    // interrupted while the fourth run was in flight
    checkpoint.mark_running(3).unwrap();
    let session = checkpoint.session_id.clone();
    drop(checkpoint);

    let resumed = orch.open_checkpoint().unwrap();
    assert_eq!(resumed.session_id, session);
    assert_eq!(resumed.count(RunStatus::Completed), 3);
    assert_eq!(resumed.count(RunStatus::Pending), 7);
    assert_eq!(resumed.next_pending(), Some(3));

    let on_disk = Checkpoint::load(resumed.session_dir()).unwrap().unwrap();
    assert_eq!(on_disk.runs[3].status, RunStatus::Pending);
    assert_eq!(on_disk.runs[0].result_file.as_deref(), Some("P1_small-2d_4GB_full.json"));
}

#[test]
fn test_failed_runs_requeue_only_on_request() {
    let dir = tempdir().unwrap();
    let orch = Orchestrator::new(ten_runs(dir.path()), Interrupt::default());
    let mut checkpoint = orch.open_checkpoint().unwrap();
    let oom = RunError::from(&BenchError::Oom("bosbench-graph".into()));
    for i in 0..checkpoint.runs.len() {
        let (status, error) = if i == 5 {
            (RunStatus::Failed, Some(oom.clone()))
        } else {
            (RunStatus::Completed, None)
        };
        checkpoint.mark_finished(i, status, None, error).unwrap();
    }
    assert_eq!(checkpoint.runs[5].error.as_ref().unwrap().kind, ErrorKind::Oom);

    let mut options = ten_runs(dir.path());
    options.resume = Some(checkpoint.session_id.clone());
    options.rerun_failed = true;
    let resumed = Orchestrator::new(options, Interrupt::default()).open_checkpoint().unwrap();
    assert_eq!(resumed.session_id, checkpoint.session_id);
    assert_eq!(resumed.next_pending(), Some(5));
    assert_eq!(resumed.count(RunStatus::Pending), 1);
    assert!(resumed.runs[5].error.is_none());
}

#[test]
fn test_resume_with_other_matrix_is_rejected() {
    let dir = tempdir().unwrap();
    let first = Orchestrator::new(ten_runs(dir.path()), Interrupt::default())
        .open_checkpoint()
        .unwrap();

    let mut options = ten_runs(dir.path());
    options.ram_gb = vec![16];
    options.resume = Some(first.session_id.clone());
    let err = Orchestrator::new(options, Interrupt::default()).open_checkpoint().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_run_result_files_are_written_side_by_side() {
    let dir = tempdir().unwrap();
    let checkpoint = Orchestrator::new(ten_runs(dir.path()), Interrupt::default())
        .open_checkpoint()
        .unwrap();
    let mut result = RunResult::new(checkpoint.runs[0].key, 42);
    result.fail(&BenchError::Stalled("no progress for 4 batches".into()));

    let (full, summary) = result.write(checkpoint.session_dir()).unwrap();
    assert!(full.ends_with("P1_small-2d_4GB_full.json"));
    assert!(summary.ends_with("P1_small-2d_4GB_summary.json"));

    let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&summary).unwrap()).unwrap();
    assert_eq!(value["scenario"], "P1");
    assert_eq!(value["status"], "failed");
    assert_eq!(value["error"]["kind"], "stalled");
}
