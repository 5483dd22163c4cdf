// Docker container snapshot model

use serde::{Deserialize, Serialize};

/// Per-container sample carried inside the metrics payload.
///
/// `id` is the 12-char short id; `ports` is the published-port summary
/// ("8080->80/tcp, ..."); `cpu_percent` is rounded to two decimals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerSnapshot {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub ports: String,
    pub cpu_percent: f64,
    /// Memory usage in bytes.
    pub memory_usage: f64,
    pub net_rx: f64,
    pub net_tx: f64,
}
