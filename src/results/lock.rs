//! One orchestrator per results directory
//!
//! The lock is a file holding the owner's PID. It is written under a
//! private name and hard-linked into place, so a competing process never
//! sees it empty. A lock left behind by a process that no longer exists is
//! taken over.

use std::io::{self, ErrorKind as IoErrorKind};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{BenchError, BenchResult};

pub const LOCK_FILE: &str = ".bosbench.lock";

#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
}

fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// Create `path` holding this process's PID, failing with `AlreadyExists`
/// when it is present.
fn publish_pid(path: &Path) -> io::Result<()> {
    let pid = std::process::id();
    let mut staged = path.as_os_str().to_os_string();
    staged.push(format!(".{}.tmp", pid));
    let staged = PathBuf::from(staged);
    std::fs::write(&staged, format!("{}\n", pid))?;
    let linked = std::fs::hard_link(&staged, path);
    let _ = std::fs::remove_file(&staged);
    linked
}

impl SessionLock {
    pub fn acquire(results_root: &Path) -> BenchResult<Self> {
        std::fs::create_dir_all(results_root)?;
        let path = results_root.join(LOCK_FILE);
        for _ in 0..2 {
            match publish_pid(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "Acquired results lock");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                    let owner = std::fs::read_to_string(&path)
                        .ok()
                        .and_then(|s| s.trim().parse::<u32>().ok());
                    match owner {
                        Some(pid) if pid != std::process::id() && process_alive(pid) => {
                            return Err(BenchError::Config(format!(
                                "results directory {} is in use by process {}",
                                results_root.display(),
                                pid
                            )));
                        }
                        _ => {
                            warn!(path = %path.display(), owner = ?owner, "Taking over stale lock");
                            std::fs::remove_file(&path)?;
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(BenchError::Config(format!("could not lock {}", path.display())))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
