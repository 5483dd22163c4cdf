// Agent worker loops: fast tick, slow tick, connections, log forwarding

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::agent::connections::ConnectionCollector;
use crate::agent::docker::DockerRepo;
use crate::agent::firewall;
use crate::agent::process::{ProcessCollector, RawProcessCell};
use crate::agent::sampler::SystemSampler;
use crate::agent::sender::Sender;
use crate::models::LogLine;

pub const FAST_TICK: Duration = Duration::from_secs(1);
pub const SLOW_TICK: Duration = Duration::from_secs(30);

/// Buffered tailer→sender channel; tailers block when it is full.
pub const LOG_CHANNEL_CAPACITY: usize = 100;

pub struct FastLoopDeps {
    /// None when the system collector is disabled; container metrics and the
    /// raw process blob still flow on a bare snapshot.
    pub sampler: Option<SystemSampler>,
    pub docker: Option<Arc<DockerRepo>>,
    pub sender: Arc<Sender>,
    pub raw_cell: RawProcessCell,
    pub shutdown_rx: oneshot::Receiver<()>,
    pub host: String,
}

/// Fast loop: one SystemSnapshot plus the container set per second. Sampler
/// state lives in this task only; no locking.
pub fn spawn_fast_loop(deps: FastLoopDeps) -> tokio::task::JoinHandle<()> {
    let FastLoopDeps {
        mut sampler,
        docker,
        sender,
        raw_cell,
        mut shutdown_rx,
        host,
    } = deps;

    tokio::spawn(async move {
        let mut tick = tokio::time::interval(FAST_TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut docker_error_logged = false;

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = &mut shutdown_rx => {
                    info!("fast loop shutting down");
                    break;
                }
            }

            let snapshot = match sampler.as_mut() {
                Some(s) => s.sample(),
                None => crate::models::SystemSnapshot {
                    host: host.clone(),
                    timestamp: chrono::Utc::now().timestamp(),
                    ..Default::default()
                },
            };

            let containers = match &docker {
                Some(repo) => match repo.list_running_and_refresh_stats().await {
                    Ok(c) => {
                        docker_error_logged = false;
                        c
                    }
                    Err(e) => {
                        // one warning per outage, not one per tick
                        if !docker_error_logged {
                            warn!("container metrics failed: {} (silencing until recovery)", e);
                            docker_error_logged = true;
                        }
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };

            let process_raw = raw_cell.get();
            if let Err(e) = sender
                .send_metrics(&snapshot, &containers, &process_raw)
                .await
            {
                warn!("failed to send metrics: {}", e);
            }
        }
    })
}

/// Slow loop: processes, firewall rules blob, firewall-sync every 30 s,
/// with an initial hydration pass so a fresh host shows data immediately.
pub fn spawn_slow_loop(sender: Arc<Sender>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut collector = ProcessCollector::new();
        let mut firewall_error_logged = false;
        let mut tick = tokio::time::interval(SLOW_TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await; // first tick fires immediately: hydration

            let processes = collector.collect();
            if !processes.is_empty()
                && let Err(e) = sender.send_processes(&processes).await
            {
                warn!("failed to send processes: {}", e);
            }

            let rules = firewall::collect_rules().await;
            if let Err(e) = sender.send_firewall(&rules).await {
                warn!("failed to send firewall rules: {}", e);
            }

            match firewall::collect_blocked_ips().await {
                Ok(blocked) => {
                    firewall_error_logged = false;
                    match sender.send_firewall_sync(&blocked).await {
                        Ok(()) if !blocked.is_empty() => {
                            info!("synced {} blocked IPs to server", blocked.len());
                        }
                        Ok(()) => {}
                        Err(e) => warn!("failed to sync blocked IPs: {}", e),
                    }
                }
                Err(e) => {
                    if !firewall_error_logged {
                        warn!("failed to collect blocked IPs: {} (silencing until recovery)", e);
                        firewall_error_logged = true;
                    }
                }
            }
        }
    })
}

/// Connection tracking at the fast cadence.
pub fn spawn_connection_loop(sender: Arc<Sender>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut collector = ConnectionCollector::new();
        let mut tick = tokio::time::interval(FAST_TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let entries = collector.collect();
            if entries.is_empty() {
                continue;
            }
            if let Err(e) = sender.send_connections(&entries).await {
                warn!("failed to send connections: {}", e);
            }
        }
    })
}

/// Drain the tailer channel and forward each line. Errors are logged and the
/// line dropped; there is no durable local queue.
pub fn spawn_log_forwarder(
    sender: Arc<Sender>,
    mut rx: mpsc::Receiver<LogLine>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = sender.send_log(&line).await {
                warn!("failed to send log line: {}", e);
            }
        }
    })
}
