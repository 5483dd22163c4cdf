// Docker container metrics and log streaming via bollard

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bollard::Docker;
use bollard::container::LogOutput;
use bollard::query_parameters::{ListContainersOptions, LogsOptions, StatsOptions};
use bollard::secret::{ContainerStatsResponse, ContainerSummary, Port};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio::sync::{RwLock, mpsc};
use tracing::warn;

use crate::models::{ContainerSnapshot, LogLevel, LogLine};

/// Listing metadata refreshed each tick; stream-derived stats cached between
/// stats frames.
#[derive(Debug, Clone, Default)]
struct LiveStats {
    cpu_percent: f64,
    memory_usage: f64,
    net_rx: f64,
    net_tx: f64,
}

pub struct DockerRepo {
    docker: Docker,
    live_stats: Arc<RwLock<HashMap<String, LiveStats>>>,
    active_streams: Arc<RwLock<HashMap<String, tokio::task::JoinHandle<()>>>>,
}

/// Running container identity as the supervisor sees it.
#[derive(Debug, Clone)]
pub struct RunningContainer {
    pub full_id: String,
    pub short_id: String,
    pub name: String,
}

impl DockerRepo {
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self {
            docker,
            live_stats: Arc::new(RwLock::new(HashMap::new())),
            active_streams: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn handle(&self) -> Docker {
        self.docker.clone()
    }

    pub async fn list_running(&self) -> anyhow::Result<Vec<RunningContainer>> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);
        let opts = ListContainersOptions {
            all: false,
            filters: Some(filters),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;
        Ok(containers.iter().map(identity_of).collect())
    }

    /// List running containers, reconcile per-container stats streams against
    /// the listing, and return the current snapshot set (listing metadata
    /// merged with stream-cached cpu/mem/net).
    pub async fn list_running_and_refresh_stats(&self) -> anyhow::Result<Vec<ContainerSnapshot>> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);
        let opts = ListContainersOptions {
            all: false,
            filters: Some(filters),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(opts)).await?;

        let running: Vec<RunningContainer> = containers.iter().map(identity_of).collect();
        let running_set: HashSet<String> = running.iter().map(|c| c.short_id.clone()).collect();

        let current_keys: Vec<String> = {
            let r = self.active_streams.read().await;
            r.keys().cloned().collect()
        };
        let to_add: Vec<&RunningContainer> = running
            .iter()
            .filter(|c| !current_keys.contains(&c.short_id))
            .collect();
        let to_remove: Vec<String> = current_keys
            .into_iter()
            .filter(|id| !running_set.contains(id))
            .collect();

        let mut new_handles = Vec::with_capacity(to_add.len());
        for c in to_add {
            let handle = self.start_stats_stream(c.full_id.clone(), c.short_id.clone());
            new_handles.push((c.short_id.clone(), handle));
        }

        {
            let mut streams = self.active_streams.write().await;
            for (id, handle) in new_handles {
                streams.insert(id, handle);
            }
            for id in &to_remove {
                if let Some(handle) = streams.remove(id) {
                    handle.abort();
                }
            }
        }
        if !to_remove.is_empty() {
            let mut live = self.live_stats.write().await;
            for id in &to_remove {
                live.remove(id);
            }
        }

        let live = self.live_stats.read().await;
        let snapshots = containers
            .iter()
            .map(|c| {
                let ident = identity_of(c);
                let stats = live.get(&ident.short_id).cloned().unwrap_or_default();
                ContainerSnapshot {
                    id: ident.short_id,
                    name: ident.name,
                    image: c.image.clone().unwrap_or_default(),
                    state: c
                        .state
                        .as_ref()
                        .map(|s| s.to_string().to_lowercase())
                        .unwrap_or_default(),
                    status: c.status.clone().unwrap_or_default(),
                    ports: format_ports(c.ports.as_deref().unwrap_or_default()),
                    cpu_percent: stats.cpu_percent,
                    memory_usage: stats.memory_usage,
                    net_rx: stats.net_rx,
                    net_tx: stats.net_tx,
                }
            })
            .collect();
        Ok(snapshots)
    }

    fn start_stats_stream(&self, full_id: String, short_id: String) -> tokio::task::JoinHandle<()> {
        let docker = self.docker.clone();
        let live_stats = self.live_stats.clone();
        let active_streams = self.active_streams.clone();

        tokio::spawn(async move {
            let options = StatsOptions {
                stream: true,
                ..Default::default()
            };
            let mut stream = docker.stats(&full_id, Some(options));
            while let Some(result) = stream.next().await {
                match result {
                    Ok(s) => {
                        if let Some(stats) = process_statistics(&s) {
                            live_stats.write().await.insert(short_id.clone(), stats);
                        }
                    }
                    Err(e) => {
                        warn!("stats stream error for container {}: {}", short_id, e);
                        break;
                    }
                }
            }
            active_streams.write().await.remove(&short_id);
        })
    }
}

fn identity_of(c: &ContainerSummary) -> RunningContainer {
    let full_id = c.id.clone().unwrap_or_default();
    let short_id = full_id.chars().take(12).collect::<String>();
    let name = c
        .names
        .as_ref()
        .and_then(|n| n.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| short_id.clone());
    RunningContainer {
        full_id,
        short_id,
        name,
    }
}

fn format_ports(ports: &[Port]) -> String {
    let mut parts = Vec::new();
    for p in ports {
        if let Some(public) = p.public_port {
            let proto = p
                .typ
                .as_ref()
                .map(|t| t.to_string().to_lowercase())
                .unwrap_or_else(|| "tcp".into());
            parts.push(format!("{}->{}/{}", public, p.private_port, proto));
        }
    }
    parts.join(", ")
}

/// Derive cpu% / memory / net totals from one raw stats frame. Exposed for
/// unit tests.
fn process_statistics(s: &ContainerStatsResponse) -> Option<LiveStats> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let precpu_stats = s.precpu_stats.as_ref()?;
    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;
    let precpu_usage = precpu_stats.cpu_usage.as_ref()?;

    let cpu_delta =
        cpu_usage.total_usage.unwrap_or(0) as f64 - precpu_usage.total_usage.unwrap_or(0) as f64;
    let system_delta = cpu_stats.system_cpu_usage.unwrap_or(0) as f64
        - precpu_stats.system_cpu_usage.unwrap_or(0) as f64;
    let mut online = cpu_stats.online_cpus.unwrap_or(0) as f64;
    if online == 0.0 {
        online = cpu_usage
            .percpu_usage
            .as_ref()
            .map(|v| v.len())
            .unwrap_or(0) as f64;
    }
    let cpu_percent = if system_delta > 0.0 && cpu_delta > 0.0 && online > 0.0 {
        let raw = (cpu_delta / system_delta) * online * 100.0;
        (raw * 100.0).round() / 100.0
    } else {
        0.0
    };

    let memory_usage = s
        .memory_stats
        .as_ref()
        .and_then(|m| m.usage)
        .unwrap_or(0) as f64;

    let (net_rx, net_tx) = s.networks.as_ref().map_or((0.0, 0.0), |n| {
        let mut rx = 0u64;
        let mut tx = 0u64;
        for v in n.values() {
            rx += v.rx_bytes.unwrap_or(0);
            tx += v.tx_bytes.unwrap_or(0);
        }
        (rx as f64, tx as f64)
    });

    Some(LiveStats {
        cpu_percent,
        memory_usage,
        net_rx,
        net_tx,
    })
}

/// Attach to a container's log endpoint and forward every line as a LogLine
/// until the stream ends or the task is aborted. Stdout inherits the level
/// heuristic; stderr is tagged ERROR unconditionally. The engine timestamp
/// prefix is stripped into the timestamp field, falling back to the agent
/// clock when unparseable.
pub async fn stream_container_logs(
    docker: Docker,
    full_id: String,
    short_id: String,
    name: String,
    out: mpsc::Sender<LogLine>,
) {
    let options = LogsOptions {
        follow: true,
        stdout: true,
        stderr: true,
        timestamps: true,
        tail: "0".to_string(),
        ..Default::default()
    };
    let mut stream = docker.logs(&full_id, Some(options));
    let source_path = format!("docker://{}", short_id);

    while let Some(frame) = stream.next().await {
        let (bytes, forced_error) = match frame {
            Ok(LogOutput::StdOut { message }) => (message, false),
            Ok(LogOutput::Console { message }) => (message, false),
            Ok(LogOutput::StdErr { message }) => (message, true),
            Ok(LogOutput::StdIn { .. }) => continue,
            Err(e) => {
                warn!("log stream error for container {}: {}", name, e);
                break;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        for raw in text.lines() {
            if raw.is_empty() {
                continue;
            }
            let (ts, content) = split_engine_timestamp(raw);
            let level = if forced_error {
                LogLevel::Error
            } else {
                LogLevel::classify(content)
            };
            let line = LogLine {
                source_path: source_path.clone(),
                service: name.clone(),
                host: String::new(),
                timestamp: ts,
                level,
                message: content.to_string(),
            };
            // blocks when the channel is full: natural backpressure
            if out.send(line).await.is_err() {
                return;
            }
        }
    }
}

/// Docker emits "2026-01-28T10:14:48.282773Z message" when timestamps are
/// requested. Returns the agent clock and the whole line on parse failure.
fn split_engine_timestamp(line: &str) -> (DateTime<Utc>, &str) {
    if let Some((prefix, rest)) = line.split_once(' ')
        && let Ok(ts) = DateTime::parse_from_rfc3339(prefix)
    {
        return (ts.with_timezone(&Utc), rest);
    }
    (Utc::now(), line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::secret::{ContainerCpuStats, ContainerCpuUsage, ContainerMemoryStats};

    fn cpu_stats(total_usage: u64, system_cpu_usage: u64, online: u32) -> ContainerCpuStats {
        ContainerCpuStats {
            cpu_usage: Some(ContainerCpuUsage {
                total_usage: Some(total_usage),
                ..Default::default()
            }),
            system_cpu_usage: Some(system_cpu_usage),
            online_cpus: Some(online),
            throttling_data: None,
        }
    }

    #[test]
    fn process_statistics_returns_none_without_cpu_sections() {
        let s = ContainerStatsResponse {
            cpu_stats: None,
            precpu_stats: Some(cpu_stats(0, 0, 1)),
            ..Default::default()
        };
        assert!(process_statistics(&s).is_none());
    }

    #[test]
    fn process_statistics_computes_rounded_cpu_percent() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(cpu_stats(100_000_000, 1_000_000_000, 2)),
            precpu_stats: Some(cpu_stats(50_000_000, 500_000_000, 2)),
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(256 * 1024 * 1024),
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = process_statistics(&s).unwrap();
        // (50e6 / 500e6) * 2 * 100 = 20.00
        assert!((out.cpu_percent - 20.0).abs() < 0.001);
        assert_eq!(out.memory_usage, (256 * 1024 * 1024) as f64);
    }

    #[test]
    fn process_statistics_falls_back_to_percpu_len_when_online_zero() {
        let mut stats = cpu_stats(150, 1000, 0);
        stats.cpu_usage.as_mut().unwrap().percpu_usage = Some(vec![50, 50, 50, 0]);
        let s = ContainerStatsResponse {
            cpu_stats: Some(stats),
            precpu_stats: Some(cpu_stats(50, 500, 0)),
            ..Default::default()
        };
        let out = process_statistics(&s).unwrap();
        // (100 / 500) * 4 * 100 = 80.00
        assert!((out.cpu_percent - 80.0).abs() < 0.001);
    }

    #[test]
    fn process_statistics_zero_system_delta_is_zero_percent() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(cpu_stats(100, 500, 1)),
            precpu_stats: Some(cpu_stats(50, 500, 1)),
            ..Default::default()
        };
        assert_eq!(process_statistics(&s).unwrap().cpu_percent, 0.0);
    }

    #[test]
    fn split_engine_timestamp_strips_prefix() {
        let (ts, rest) = split_engine_timestamp("2026-01-28T10:14:48.282773Z hello world");
        assert_eq!(rest, "hello world");
        assert_eq!(ts.timestamp(), 1769595288);
    }

    #[test]
    fn split_engine_timestamp_falls_back_on_garbage() {
        let before = Utc::now();
        let (ts, rest) = split_engine_timestamp("no timestamp here");
        assert_eq!(rest, "no timestamp here");
        assert!(ts >= before);
    }

    #[test]
    fn format_ports_skips_unpublished() {
        let ports = vec![
            Port {
                private_port: 80,
                public_port: Some(8080),
                ..Default::default()
            },
            Port {
                private_port: 5432,
                public_port: None,
                ..Default::default()
            },
        ];
        assert_eq!(format_ports(&ports), "8080->80/tcp");
    }
}
