//! Engine container lifecycle
//!
//! Containers are driven through the `docker` CLI. Every container carries the
//! `bosbench=1` label so teardown can find leftovers from crashed sessions.
//! The RAM cap is applied as both memory and memory+swap limit.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, TimeoutConfig, CONTAINER_DATA_DIR, CONTAINER_LABEL};
use crate::engine::{BoltClient, EngineClient, SparqlClient};
use crate::error::{BenchError, BenchResult};
use crate::model::{Engine, Scenario};

/// A started engine container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub engine: Engine,
    pub name: String,
    pub id: String,
}

/// `State` fields read from `docker inspect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    pub status: String,
    pub oom_killed: bool,
    pub health: Option<String>,
}

impl ContainerState {
    fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.trim().split('\t').collect();
        if parts.len() < 2 {
            return None;
        }
        let health = parts.get(2).map(|h| h.trim()).filter(|h| !h.is_empty() && *h != "<no value>");
        Some(Self {
            status: parts[0].to_string(),
            oom_killed: parts[1] == "true",
            health: health.map(|h| h.to_string()),
        })
    }

    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

pub struct ContainerManager {
    engines: EngineConfig,
    timeouts: TimeoutConfig,
}

impl ContainerManager {
    pub fn new(engines: EngineConfig, timeouts: TimeoutConfig) -> Self {
        Self { engines, timeouts }
    }

    /// Arguments of `docker run` for one engine
    pub fn run_args(&self, engine: Engine, ram_gb: u32, data_dir: &Path) -> Vec<String> {
        let e = &self.engines;
        let (host_port, container_port) = e.port_mapping(engine);
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            e.container_name(engine).into(),
            "--label".into(),
            CONTAINER_LABEL.into(),
            "--memory".into(),
            format!("{}g", ram_gb),
            "--memory-swap".into(),
            format!("{}g", ram_gb),
            "-p".into(),
            format!("{}:{}", host_port, container_port),
            "-v".into(),
            format!("{}:{}:ro", data_dir.display(), CONTAINER_DATA_DIR),
        ];
        match engine {
            Engine::Relational => {
                args.extend([
                    "-e".into(),
                    format!("POSTGRES_USER={}", e.pg_user),
                    "-e".into(),
                    format!("POSTGRES_PASSWORD={}", e.pg_password),
                    "-e".into(),
                    format!("POSTGRES_DB={}", e.pg_database),
                    "--health-cmd".into(),
                    format!("pg_isready -U {} -d {}", e.pg_user, e.pg_database),
                    "--health-interval".into(),
                    "1s".into(),
                    "--health-retries".into(),
                    "90".into(),
                    e.image(engine).into(),
                ]);
            }
            Engine::Graph => {
                args.extend([e.image(engine).into(), "--telemetry-enabled=false".into()]);
            }
            Engine::Rdf => {
                args.extend([
                    e.image(engine).into(),
                    "serve".into(),
                    "--location".into(),
                    "/store".into(),
                    "--bind".into(),
                    format!("0.0.0.0:{}", container_port),
                ]);
            }
        }
        args
    }

    /// Remove every labelled container with its anonymous volumes.
    pub async fn teardown_all(&self) -> BenchResult<usize> {
        let listed = docker(&["ps", "-aq", "--filter", &format!("label={}", CONTAINER_LABEL)])
            .await
            .map_err(|e| BenchError::Teardown(e.to_string()))?;
        let ids: Vec<&str> = listed.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let mut args = vec!["rm", "-f", "-v"];
        args.extend(ids.iter().copied());
        docker(&args).await.map_err(|e| BenchError::Teardown(e.to_string()))?;
        info!(containers = ids.len(), "Removed benchmark containers");
        Ok(ids.len())
    }

    /// Tear down leftovers, then start and await every engine the scenario
    /// needs with `data_dir` mounted read-only. Handles are pushed as soon as
    /// a container exists so a failed start can still be inspected.
    pub async fn start(
        &self,
        scenario: Scenario,
        ram_gb: u32,
        data_dir: &Path,
        handles: &mut Vec<ContainerHandle>,
    ) -> BenchResult<()> {
        self.teardown_all().await?;
        let data_dir = std::fs::canonicalize(data_dir)?;

        for engine in scenario.engines() {
            let args = self.run_args(engine, ram_gb, &data_dir);
            let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            let id = docker(&arg_refs).await?.trim().to_string();
            let handle = ContainerHandle {
                engine,
                name: self.engines.container_name(engine).to_string(),
                id,
            };
            info!(engine = engine.as_str(), container = %handle.name, ram_gb, "Started container");
            handles.push(handle.clone());
            self.wait_ready(&handle).await?;
        }
        Ok(())
    }

    /// Poll until the engine answers, the container dies or the readiness
    /// timeout expires.
    pub async fn wait_ready(&self, handle: &ContainerHandle) -> BenchResult<()> {
        let started = Instant::now();
        let deadline = started + self.timeouts.readiness;
        loop {
            let state = inspect(&handle.name).await?;
            if state.oom_killed {
                return Err(BenchError::Oom(format!("{} killed during startup", handle.name)));
            }
            if !state.is_running() && state.status != "created" {
                return Err(BenchError::ContainerStart(format!(
                    "{} is {} before becoming ready",
                    handle.name, state.status
                )));
            }
            let limit = deadline.saturating_duration_since(Instant::now()).min(READY_CHECK_TIMEOUT);
            if within(limit, self.responds(handle.engine, &state)).await {
                info!(
                    container = %handle.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Container ready"
                );
                return Ok(());
            }
            if Instant::now() >= deadline {
                // A container that exhausted its memory while starting is an OOM, not a timeout
                if self.is_oom_killed(&handle.name).await.unwrap_or(false) {
                    return Err(BenchError::Oom(format!("{} killed during startup", handle.name)));
                }
                return Err(BenchError::ContainerStart(format!(
                    "{} not ready after {}s",
                    handle.name,
                    self.timeouts.readiness.as_secs()
                )));
            }
            tokio::time::sleep(self.timeouts.readiness_poll).await;
        }
    }

    async fn responds(&self, engine: Engine, state: &ContainerState) -> bool {
        match engine {
            Engine::Relational => state.health.as_deref() == Some("healthy"),
            Engine::Graph => match BoltClient::connect(&self.engines.bolt_uri()).await {
                Ok(client) => client.ping().await.is_ok(),
                Err(e) => {
                    debug!(error = %e, "Bolt not ready");
                    false
                }
            },
            Engine::Rdf => SparqlClient::new(&self.engines.sparql_base_url()).ping().await.is_ok(),
        }
    }

    pub async fn is_oom_killed(&self, name: &str) -> BenchResult<bool> {
        Ok(inspect(name).await?.oom_killed)
    }

    /// First OOM-killed container among `handles`, if any
    pub async fn oom_victim(&self, handles: &[ContainerHandle]) -> Option<String> {
        for h in handles {
            match self.is_oom_killed(&h.name).await {
                Ok(true) => return Some(h.name.clone()),
                Ok(false) => {}
                Err(e) => warn!(container = %h.name, error = %e, "Could not inspect container"),
            }
        }
        None
    }

}

async fn inspect(name: &str) -> BenchResult<ContainerState> {
    let out = docker(&[
        "inspect",
        "--format",
        "{{.State.Status}}\t{{.State.OOMKilled}}\t{{if .State.Health}}{{.State.Health.Status}}{{end}}",
        name,
    ])
    .await?;
    ContainerState::parse(&out)
        .ok_or_else(|| BenchError::ContainerStart(format!("unexpected inspect output for {}: {}", name, out.trim())))
}

/// Bound on one readiness check; an engine that accepts connections but
/// never answers counts as not ready.
const READY_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

async fn within<F: Future<Output = bool>>(limit: Duration, check: F) -> bool {
    tokio::time::timeout(limit, check).await.unwrap_or(false)
}

/// Run a docker command and return stdout; a non-zero exit is an error.
pub(crate) async fn docker(args: &[&str]) -> BenchResult<String> {
    debug!(args = ?args, "docker");
    let output = tokio::time::timeout(Duration::from_secs(120), Command::new("docker").args(args).output())
        .await
        .map_err(|_| BenchError::ContainerStart(format!("docker {} timed out", args.first().unwrap_or(&""))))?
        .map_err(|e| BenchError::ContainerStart(format!("cannot run docker: {}", e)))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(BenchError::ContainerStart(format!(
            "docker {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ContainerManager {
        ContainerManager::new(EngineConfig::default(), TimeoutConfig::default())
    }

    #[test]
    fn test_run_args_apply_hard_memory_cap() {
        let args = manager().run_args(Engine::Relational, 8, Path::new("/srv/exports"));
        let joined = args.join(" ");
        assert!(joined.contains("--memory 8g --memory-swap 8g"));
        assert!(joined.contains("--label bosbench=1"));
        assert!(joined.contains("-v /srv/exports:/data:ro"));
        assert!(joined.contains("POSTGRES_DB=bosbench"));
        assert_eq!(args.last().unwrap(), "timescale/timescaledb:latest-pg16");
    }

    #[test]
    fn test_rdf_container_serves_on_its_port() {
        let args = manager().run_args(Engine::Rdf, 4, Path::new("/x"));
        assert!(args.windows(2).any(|w| w[0] == "--bind" && w[1] == "0.0.0.0:7878"));
        assert!(args.contains(&"ghcr.io/oxigraph/oxigraph:latest".to_string()));
    }

    #[test]
    fn test_parse_inspect_state() {
        let s = ContainerState::parse("running\tfalse\thealthy\n").unwrap();
        assert!(s.is_running());
        assert_eq!(s.health.as_deref(), Some("healthy"));

        let s = ContainerState::parse("exited\ttrue\t").unwrap();
        assert!(s.oom_killed);
        assert_eq!(s.health, None);

        assert!(ContainerState::parse("garbage").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_readiness_check_gives_up_at_its_limit() {
        let started = tokio::time::Instant::now();
        assert!(!within(READY_CHECK_TIMEOUT, std::future::pending::<bool>()).await);
        assert_eq!(started.elapsed(), READY_CHECK_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answering_readiness_check_passes() {
        assert!(within(READY_CHECK_TIMEOUT, async { true }).await);
        assert!(!within(READY_CHECK_TIMEOUT, async { false }).await);
    }
}
