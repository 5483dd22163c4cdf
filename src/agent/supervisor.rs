// Stream supervisor: exactly one live docker log stream per running container

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::agent::docker::{DockerRepo, stream_container_logs};
use crate::models::LogLine;

pub const SUPERVISOR_INTERVAL: Duration = Duration::from_secs(10);

/// Tracks per-container log stream tasks keyed by short id. An existing
/// stream is never restarted; the tailer exits on container death and the
/// supervisor reaps the entry on the next listing.
pub struct StreamSupervisor {
    docker: Arc<DockerRepo>,
    out: mpsc::Sender<LogLine>,
    active: HashMap<String, tokio::task::JoinHandle<()>>,
}

impl StreamSupervisor {
    pub fn new(docker: Arc<DockerRepo>, out: mpsc::Sender<LogLine>) -> Self {
        Self {
            docker,
            out,
            active: HashMap::new(),
        }
    }

    /// One reconciliation pass: start streams for new containers, cancel
    /// streams whose container is gone.
    pub async fn reconcile(&mut self) {
        let running = match self.docker.list_running().await {
            Ok(r) => r,
            Err(e) => {
                debug!("container listing failed: {}", e);
                return;
            }
        };

        let mut seen = std::collections::HashSet::new();
        for c in &running {
            seen.insert(c.short_id.clone());
            if self.active.contains_key(&c.short_id) {
                continue;
            }
            info!("starting log stream for {} ({})", c.name, c.short_id);
            let handle = tokio::spawn(stream_container_logs(
                self.docker.handle(),
                c.full_id.clone(),
                c.short_id.clone(),
                c.name.clone(),
                self.out.clone(),
            ));
            self.active.insert(c.short_id.clone(), handle);
        }

        self.active.retain(|id, handle| {
            if seen.contains(id) {
                true
            } else {
                info!("container {} gone, cancelling log stream", id);
                handle.abort();
                false
            }
        });
    }

    /// Cancel every stream (agent shutdown).
    pub fn shutdown(&mut self) {
        for (_, handle) in self.active.drain() {
            handle.abort();
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Run reconciliation forever at the supervisor cadence.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(SUPERVISOR_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            self.reconcile().await;
        }
    }
}
