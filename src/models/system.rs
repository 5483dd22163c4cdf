// System snapshot, partition/interface stats, processes, connections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// DDoS heuristic verdict derived from the aggregate receive rate.
/// Transitions are strictly greater-than: exactly 10.0 MB/s is still OK,
/// exactly 50.0 MB/s is still WARNING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DdosStatus {
    Ok,
    Warning,
    Critical,
}

impl Default for DdosStatus {
    fn default() -> Self {
        DdosStatus::Ok
    }
}

impl DdosStatus {
    /// Classify an aggregate receive rate in MB/s.
    pub fn from_recv_rate(rate_mbps: f64) -> Self {
        if rate_mbps > 50.0 {
            DdosStatus::Critical
        } else if rate_mbps > 10.0 {
            DdosStatus::Warning
        } else {
            DdosStatus::Ok
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DdosStatus::Ok => "OK",
            DdosStatus::Warning => "WARNING",
            DdosStatus::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionStat {
    pub mount_point: String,
    pub fstype: String,
    pub total: u64,
    pub used: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceStat {
    pub name: String,
    pub ip: String,
    pub mac: String,
    pub is_up: bool,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

/// One full host sample per fast tick. Counters (`bytes_*`, `disk_*_bytes`,
/// `disk_*_ops`) are monotonic; the `*_rate` fields are agent-derived MB/s
/// (zero on the first tick, clamped to zero on counter regression).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSnapshot {
    pub host: String,
    pub timestamp: i64,
    pub cpu_percent: f64,
    pub cpu_count: u32,
    pub cpu_physical: u32,
    pub cpu_model: String,
    /// Base frequency in GHz.
    pub cpu_freq: f64,
    pub memory_usage: f64,
    pub memory_total: u64,
    pub swap_usage: f64,
    pub swap_total: u64,
    pub disk_usage: f64,
    pub disk_total: u64,
    pub partitions: Vec<PartitionStat>,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub net_recv_rate: f64,
    pub net_sent_rate: f64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub disk_read_ops: u64,
    pub disk_write_ops: u64,
    pub disk_read_rate: f64,
    pub disk_write_rate: f64,
    pub disk_read_iops: f64,
    pub disk_write_iops: f64,
    pub interfaces: Vec<InterfaceStat>,
    pub uptime: u64,
    pub ddos_status: DdosStatus,
}

/// One process row; the agent sends the top 50 by CPU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: i32,
    pub name: String,
    pub username: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub cmdline: String,
}

/// One TCP connection row; all rows of a tick share one timestamp per host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub timestamp: DateTime<Utc>,
    pub local_ip: String,
    pub local_port: u16,
    pub remote_ip: String,
    pub remote_port: u16,
    pub status: String,
    pub pid: i32,
    pub process_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddos_status_boundaries_are_strict() {
        assert_eq!(DdosStatus::from_recv_rate(0.0), DdosStatus::Ok);
        assert_eq!(DdosStatus::from_recv_rate(10.0), DdosStatus::Ok);
        assert_eq!(DdosStatus::from_recv_rate(10.000001), DdosStatus::Warning);
        assert_eq!(DdosStatus::from_recv_rate(50.0), DdosStatus::Warning);
        assert_eq!(DdosStatus::from_recv_rate(50.000001), DdosStatus::Critical);
    }

    #[test]
    fn ddos_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&DdosStatus::Critical).unwrap(),
            "\"CRITICAL\""
        );
        assert_eq!(serde_json::to_string(&DdosStatus::Ok).unwrap(), "\"OK\"");
    }
}
