//! Resource monitor
//!
//! A background task samples the run's containers at a fixed interval from
//! their cgroup v2 files, or from `docker stats` when the cgroup directories
//! are not reachable. Samples are summed across containers. The main flow
//! reads the sample buffer only after the task has stopped.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::container::{docker, ContainerHandle};
use crate::error::{BenchError, BenchResult};

/// Where the samples came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorSource {
    Cgroup,
    DockerStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// Milliseconds since the monitor started
    pub elapsed_ms: u64,
    pub memory_bytes: u64,
    /// Cumulative CPU time, cgroup only
    pub cpu_usec: Option<u64>,
    /// Instantaneous CPU percent, `docker stats` only
    pub cpu_percent: Option<f64>,
}

/// Memory peak of one phase, from `memory.peak` when readable, else from samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePeak {
    pub phase: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub memory_peak_bytes: u64,
    /// Whether the peak was read from the kernel counter
    pub from_kernel: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub source: Option<MonitorSource>,
    pub samples: usize,
    pub memory_min_bytes: u64,
    pub memory_avg_bytes: u64,
    pub memory_max_bytes: u64,
    pub cpu_avg_percent: f64,
    pub cpu_peak_percent: f64,
    pub phases: Vec<PhasePeak>,
}

impl ResourceSummary {
    /// Highest memory seen in any phase or sample
    pub fn peak_memory_bytes(&self) -> u64 {
        self.phases
            .iter()
            .map(|p| p.memory_peak_bytes)
            .max()
            .unwrap_or(0)
            .max(self.memory_max_bytes)
    }

    pub fn phase(&self, name: &str) -> Option<&PhasePeak> {
        self.phases.iter().find(|p| p.phase == name)
    }
}

/// cgroup v2 directory of a container, systemd driver first
pub fn cgroup_dir(root: &Path, container_id: &str) -> Option<PathBuf> {
    [
        root.join("system.slice").join(format!("docker-{}.scope", container_id)),
        root.join("docker").join(container_id),
    ]
    .into_iter()
    .find(|p| p.join("memory.current").exists())
}

/// `usage_usec` from a `cpu.stat` file
pub fn parse_cpu_usage(text: &str) -> Option<u64> {
    text.lines()
        .find_map(|l| l.strip_prefix("usage_usec "))
        .and_then(|v| v.trim().parse().ok())
}

/// A `docker stats` size such as `512MiB`, `1.5GiB` or `800kB`
pub fn parse_docker_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text.find(|c: char| c.is_ascii_alphabetic())?;
    let (number, unit) = text.split_at(split);
    let value: f64 = number.trim().parse().ok()?;
    let factor = match unit {
        "B" => 1.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * factor) as u64)
}

/// One `docker stats` line: `<mem usage> / <limit>\t<cpu>%`
fn parse_stats_line(line: &str) -> Option<(u64, f64)> {
    let (mem, cpu) = line.trim().split_once('\t')?;
    let used = parse_docker_size(mem.split('/').next()?)?;
    let cpu: f64 = cpu.trim().trim_end_matches('%').parse().ok()?;
    Some((used, cpu))
}

enum Sampler {
    Cgroup(Vec<PathBuf>),
    DockerStats(Vec<String>),
}

impl Sampler {
    fn source(&self) -> MonitorSource {
        match self {
            Sampler::Cgroup(_) => MonitorSource::Cgroup,
            Sampler::DockerStats(_) => MonitorSource::DockerStats,
        }
    }

    async fn sample(&self, elapsed_ms: u64) -> BenchResult<ResourceSample> {
        match self {
            Sampler::Cgroup(dirs) => {
                let mut memory = 0;
                let mut cpu = 0;
                for dir in dirs {
                    let current = tokio::fs::read_to_string(dir.join("memory.current")).await?;
                    memory += current
                        .trim()
                        .parse::<u64>()
                        .map_err(|e| BenchError::Export(format!("bad memory.current: {}", e)))?;
                    let stat = tokio::fs::read_to_string(dir.join("cpu.stat")).await?;
                    cpu += parse_cpu_usage(&stat).unwrap_or(0);
                }
                Ok(ResourceSample {
                    elapsed_ms,
                    memory_bytes: memory,
                    cpu_usec: Some(cpu),
                    cpu_percent: None,
                })
            }
            Sampler::DockerStats(names) => {
                let mut args = vec!["stats", "--no-stream", "--format", "{{.MemUsage}}\t{{.CPUPerc}}"];
                args.extend(names.iter().map(String::as_str));
                let out = docker(&args).await?;
                let (memory, cpu) = out
                    .lines()
                    .filter_map(parse_stats_line)
                    .fold((0, 0.0), |(m, c), (dm, dc)| (m + dm, c + dc));
                Ok(ResourceSample {
                    elapsed_ms,
                    memory_bytes: memory,
                    cpu_usec: None,
                    cpu_percent: Some(cpu),
                })
            }
        }
    }

    /// Sum of `memory.peak`, when every container exposes it
    fn read_peak(&self) -> Option<u64> {
        let Sampler::Cgroup(dirs) = self else {
            return None;
        };
        let mut total = 0;
        for dir in dirs {
            let text = std::fs::read_to_string(dir.join("memory.peak")).ok()?;
            total += text.trim().parse::<u64>().ok()?;
        }
        Some(total)
    }

    /// Reset `memory.peak`; kernels that do not allow it reject the write.
    fn reset_peak(&self) -> bool {
        let Sampler::Cgroup(dirs) = self else {
            return false;
        };
        dirs.iter().all(|d| {
            let peak = d.join("memory.peak");
            peak.exists() && std::fs::write(&peak, "0").is_ok()
        })
    }
}

struct OpenPhase {
    name: String,
    start_ms: u64,
    kernel_peak: bool,
}

pub struct ResourceMonitor {
    sampler: std::sync::Arc<Sampler>,
    started: Instant,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Vec<ResourceSample>>>,
    phase: Option<OpenPhase>,
    closed: Vec<PhasePeak>,
}

impl ResourceMonitor {
    /// Resolve cgroup directories for every container, or fall back to
    /// `docker stats`, and take the first sample before returning.
    pub async fn start(config: &MonitorConfig, containers: &[ContainerHandle]) -> Self {
        let dirs: Option<Vec<PathBuf>> = containers
            .iter()
            .map(|c| cgroup_dir(&config.cgroup_root, &c.id))
            .collect();
        let sampler = match dirs {
            Some(dirs) if !dirs.is_empty() => Sampler::Cgroup(dirs),
            _ => {
                warn!("cgroup files unreachable, sampling with docker stats");
                Sampler::DockerStats(containers.iter().map(|c| c.name.clone()).collect())
            }
        };
        Self::with_sampler(sampler, config.interval).await
    }

    /// Sample fixed cgroup directories
    pub async fn for_cgroups(dirs: Vec<PathBuf>, interval: Duration) -> Self {
        Self::with_sampler(Sampler::Cgroup(dirs), interval).await
    }

    async fn with_sampler(sampler: Sampler, interval: Duration) -> Self {
        let sampler = std::sync::Arc::new(sampler);
        let started = Instant::now();
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let mut samples = Vec::new();
        match sampler.sample(0).await {
            Ok(s) => samples.push(s),
            Err(e) => warn!(error = %e, "First resource sample failed"),
        }

        let task_sampler = sampler.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let elapsed_ms = started.elapsed().as_millis() as u64;
                        match task_sampler.sample(elapsed_ms).await {
                            Ok(s) => samples.push(s),
                            Err(e) => debug!(error = %e, "Resource sample failed"),
                        }
                    }
                }
            }
            samples
        });

        info!(source = ?sampler.source(), interval_ms = interval.as_millis() as u64, "Resource monitor started");
        Self {
            sampler,
            started,
            stop: Some(stop_tx),
            task: Some(task),
            phase: None,
            closed: Vec::new(),
        }
    }

    pub fn source(&self) -> MonitorSource {
        self.sampler.source()
    }

    fn close_phase(&mut self) {
        if let Some(open) = self.phase.take() {
            let kernel = if open.kernel_peak { self.sampler.read_peak() } else { None };
            self.closed.push(PhasePeak {
                phase: open.name,
                start_ms: open.start_ms,
                end_ms: self.started.elapsed().as_millis() as u64,
                memory_peak_bytes: kernel.unwrap_or(0),
                from_kernel: kernel.is_some(),
            });
        }
    }

    /// Close the current phase and open `name`, resetting the kernel peak
    /// counter when the host allows it.
    pub fn begin_phase(&mut self, name: &str) {
        self.close_phase();
        let kernel_peak = self.sampler.reset_peak();
        debug!(phase = name, kernel_peak, "Monitor phase");
        self.phase = Some(OpenPhase {
            name: name.to_string(),
            start_ms: self.started.elapsed().as_millis() as u64,
            kernel_peak,
        });
    }

    /// Stop sampling and aggregate.
    pub async fn stop(mut self) -> ResourceSummary {
        self.close_phase();
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let samples = match self.task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let mut phases = std::mem::take(&mut self.closed);
        for phase in phases.iter_mut().filter(|p| !p.from_kernel) {
            phase.memory_peak_bytes = samples
                .iter()
                .filter(|s| s.elapsed_ms >= phase.start_ms && s.elapsed_ms <= phase.end_ms)
                .map(|s| s.memory_bytes)
                .max()
                .unwrap_or(0);
        }
        let mut summary = summarize(&samples);
        summary.source = Some(self.sampler.source());
        summary.phases = phases;
        summary
    }
}

/// Memory min/avg/max and CPU percent across consecutive samples
pub fn summarize(samples: &[ResourceSample]) -> ResourceSummary {
    let mut summary = ResourceSummary {
        samples: samples.len(),
        ..ResourceSummary::default()
    };
    if samples.is_empty() {
        return summary;
    }
    let memory = samples.iter().map(|s| s.memory_bytes);
    summary.memory_min_bytes = memory.clone().min().unwrap_or(0);
    summary.memory_max_bytes = memory.clone().max().unwrap_or(0);
    summary.memory_avg_bytes = (memory.map(u128::from).sum::<u128>() / samples.len() as u128) as u64;

    let mut cpu: Vec<f64> = samples.iter().filter_map(|s| s.cpu_percent).collect();
    for pair in samples.windows(2) {
        if let (Some(a), Some(b)) = (pair[0].cpu_usec, pair[1].cpu_usec) {
            let wall_usec = pair[1].elapsed_ms.saturating_sub(pair[0].elapsed_ms) * 1000;
            if wall_usec > 0 {
                cpu.push(b.saturating_sub(a) as f64 / wall_usec as f64 * 100.0);
            }
        }
    }
    if !cpu.is_empty() {
        summary.cpu_avg_percent = cpu.iter().sum::<f64>() / cpu.len() as f64;
        summary.cpu_peak_percent = cpu.iter().copied().fold(0.0, f64::max);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(elapsed_ms: u64, memory_bytes: u64, cpu_usec: u64) -> ResourceSample {
        ResourceSample {
            elapsed_ms,
            memory_bytes,
            cpu_usec: Some(cpu_usec),
            cpu_percent: None,
        }
    }

    #[test]
    fn test_parse_cpu_stat() {
        let text = "usage_usec 123456\nuser_usec 100000\nsystem_usec 23456\n";
        assert_eq!(parse_cpu_usage(text), Some(123_456));
        assert_eq!(parse_cpu_usage("nr_periods 0\n"), None);
    }

    #[test]
    fn test_parse_docker_sizes() {
        assert_eq!(parse_docker_size("512MiB"), Some(512 * 1024 * 1024));
        assert_eq!(parse_docker_size(" 1.5GiB "), Some(1_610_612_736));
        assert_eq!(parse_docker_size("800kB"), Some(800_000));
        assert_eq!(parse_docker_size("lots"), None);
        assert_eq!(parse_stats_line("100MiB / 8GiB\t12.50%"), Some((104_857_600, 12.5)));
    }

    #[test]
    fn test_summary_cpu_from_deltas() {
        let samples = [sample(0, 100, 0), sample(1000, 300, 500_000), sample(2000, 200, 1_500_000)];
        let s = summarize(&samples);
        assert_eq!((s.memory_min_bytes, s.memory_avg_bytes, s.memory_max_bytes), (100, 200, 300));
        assert!((s.cpu_avg_percent - 75.0).abs() < 1e-9);
        assert!((s.cpu_peak_percent - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_cgroup_dir_prefers_systemd_scope() {
        let root = tempdir().unwrap();
        let legacy = root.path().join("docker").join("abc");
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(legacy.join("memory.current"), "1").unwrap();
        assert_eq!(cgroup_dir(root.path(), "abc"), Some(legacy));

        let scope = root.path().join("system.slice").join("docker-abc.scope");
        std::fs::create_dir_all(&scope).unwrap();
        std::fs::write(scope.join("memory.current"), "1").unwrap();
        assert_eq!(cgroup_dir(root.path(), "abc"), Some(scope));
        assert_eq!(cgroup_dir(root.path(), "missing"), None);
    }

    #[tokio::test]
    async fn test_monitor_samples_and_sums_containers() {
        let root = tempdir().unwrap();
        let mut dirs = Vec::new();
        for (name, mem) in [("a", "1000"), ("b", "500")] {
            let dir = root.path().join(name);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("memory.current"), mem).unwrap();
            std::fs::write(dir.join("cpu.stat"), "usage_usec 10\n").unwrap();
            dirs.push(dir);
        }
        let mut monitor = ResourceMonitor::for_cgroups(dirs, Duration::from_millis(10)).await;
        monitor.begin_phase("load");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let summary = monitor.stop().await;

        assert_eq!(summary.source, Some(MonitorSource::Cgroup));
        assert!(summary.samples >= 2);
        assert_eq!(summary.memory_max_bytes, 1500);
        let load = summary.phase("load").unwrap();
        // no memory.peak file, so the peak comes from the samples
        assert!(!load.from_kernel);
        assert_eq!(load.memory_peak_bytes, 1500);
        assert_eq!(summary.peak_memory_bytes(), 1500);
    }
}
