// Service probe plug-in seam: TCP detection + periodic stats forwarding

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::agent::sender::Sender;

const DETECT_TIMEOUT: Duration = Duration::from_secs(2);
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// A pluggable service probe. Database-specific collectors (MySQL, Redis,
/// Postgres, Mongo, ...) implement this trait out of tree; the agent only
/// detects the port and forwards whatever JSON the probe produces.
pub trait ServiceProbe: Send + Sync {
    fn name(&self) -> &str;
    /// Localhost port used for liveness detection.
    fn port(&self) -> u16;
    fn collect(&self) -> BoxFuture<'_, anyhow::Result<serde_json::Value>>;
}

async fn is_listening(port: u16) -> bool {
    tokio::time::timeout(
        DETECT_TIMEOUT,
        tokio::net::TcpStream::connect(("127.0.0.1", port)),
    )
    .await
    .map(|r| r.is_ok())
    .unwrap_or(false)
}

/// Detect which registered probes have a live localhost listener, then
/// collect and forward their stats every 30 s.
pub async fn run_probe_loop(sender: Arc<Sender>, probes: Vec<Box<dyn ServiceProbe>>) {
    let mut active = Vec::new();
    for probe in probes {
        if is_listening(probe.port()).await {
            info!("service detected: {} on port {}", probe.name(), probe.port());
            active.push(probe);
        }
    }
    if active.is_empty() {
        info!("no probeable services detected on localhost");
        return;
    }

    let mut tick = tokio::time::interval(PROBE_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tick.tick().await;
        for probe in &active {
            match probe.collect().await {
                Ok(stats) => {
                    if let Err(e) = sender.send_service_stats(probe.name(), &stats).await {
                        warn!("[{}] failed to send stats: {}", probe.name(), e);
                    }
                }
                Err(e) => warn!("[{}] failed to collect stats: {}", probe.name(), e),
            }
        }
    }
}
