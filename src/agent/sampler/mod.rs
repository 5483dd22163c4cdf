// Per-tick host sampling: cached-heavy ring, monotonic-clamped rates, DDoS heuristic

mod linux;

use std::collections::HashMap;
use std::time::Instant;

use sysinfo::{Disks, Networks, System};

use crate::models::{DdosStatus, InterfaceStat, PartitionStat, SystemSnapshot};
use linux::DiskIoTotals;

/// Heavy enumerations (CPU topology, partition table, interface metadata)
/// take hundreds of milliseconds; refresh them every this many ticks, and on
/// the first tick. Distinct from the fast tick cadence.
pub const HEAVY_REFRESH_TICKS: u64 = 10;

const MB: f64 = 1024.0 * 1024.0;

/// Derivative rate in units/sec with monotonic-clamp semantics: zero when
/// the counter regressed (wraparound/reset) or the interval is degenerate.
pub(crate) fn clamped_rate(current: u64, previous: u64, dt_secs: f64) -> f64 {
    if dt_secs <= 0.0 || current < previous {
        return 0.0;
    }
    (current - previous) as f64 / dt_secs
}

#[derive(Default)]
struct HeavyCache {
    cpu_model: String,
    cpu_count: u32,
    cpu_physical: u32,
    cpu_freq_ghz: f64,
    partitions: Vec<PartitionStat>,
    disk_total: u64,
    disk_used: u64,
    iface_meta: HashMap<String, IfaceMeta>,
}

#[derive(Clone, Default)]
struct IfaceMeta {
    ip: String,
    mac: String,
    is_up: bool,
}

struct Observed<T> {
    value: T,
    at: Instant,
}

pub struct SystemSampler {
    host: String,
    sys: System,
    disks: Disks,
    networks: Networks,
    tick: u64,
    heavy: HeavyCache,
    last_net: Option<Observed<(u64, u64)>>,
    last_disk: Option<Observed<DiskIoTotals>>,
}

impl SystemSampler {
    pub fn new(host: String) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let disks = Disks::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();
        Self {
            host,
            sys,
            disks,
            networks,
            tick: 0,
            heavy: HeavyCache::default(),
            last_net: None,
            last_disk: None,
        }
    }

    /// Produce one snapshot. Sub-collector failures leave their section
    /// zero-valued; the snapshot is always emitted.
    pub fn sample(&mut self) -> SystemSnapshot {
        self.tick += 1;
        if self.tick == 1 || self.tick % HEAVY_REFRESH_TICKS == 1 {
            self.refresh_heavy();
        }

        self.sys.refresh_cpu_all();
        self.sys.refresh_memory();
        self.networks.refresh(true);

        let cpu_percent = (self.sys.global_cpu_usage() as f64).clamp(0.0, 100.0);

        let memory_total = self.sys.total_memory();
        let memory_used = memory_total.saturating_sub(self.sys.available_memory());
        let memory_usage = percent(memory_used, memory_total);

        let swap_total = self.sys.total_swap();
        let swap_usage = percent(self.sys.used_swap(), swap_total);

        let now = Instant::now();

        let mut interfaces = Vec::with_capacity(self.networks.list().len());
        let mut bytes_sent = 0u64;
        let mut bytes_recv = 0u64;
        for (name, data) in self.networks.list().iter() {
            let meta = self.heavy.iface_meta.get(name).cloned().unwrap_or_default();
            let sent = data.total_transmitted();
            let recv = data.total_received();
            bytes_sent += sent;
            bytes_recv += recv;
            interfaces.push(InterfaceStat {
                name: name.clone(),
                ip: meta.ip,
                mac: meta.mac,
                is_up: meta.is_up,
                bytes_sent: sent,
                bytes_recv: recv,
            });
        }

        let (net_sent_rate, net_recv_rate) = match &self.last_net {
            Some(prev) => {
                let dt = now.duration_since(prev.at).as_secs_f64();
                (
                    clamped_rate(bytes_sent, prev.value.0, dt) / MB,
                    clamped_rate(bytes_recv, prev.value.1, dt) / MB,
                )
            }
            None => (0.0, 0.0),
        };
        self.last_net = Some(Observed {
            value: (bytes_sent, bytes_recv),
            at: now,
        });

        let disk_io = linux::read_disk_io_totals().unwrap_or_default();
        let (disk_read_rate, disk_write_rate, disk_read_iops, disk_write_iops) =
            match &self.last_disk {
                Some(prev) => {
                    let dt = now.duration_since(prev.at).as_secs_f64();
                    (
                        clamped_rate(disk_io.read_bytes, prev.value.read_bytes, dt) / MB,
                        clamped_rate(disk_io.write_bytes, prev.value.write_bytes, dt) / MB,
                        clamped_rate(disk_io.read_ops, prev.value.read_ops, dt),
                        clamped_rate(disk_io.write_ops, prev.value.write_ops, dt),
                    )
                }
                None => (0.0, 0.0, 0.0, 0.0),
            };
        self.last_disk = Some(Observed {
            value: disk_io,
            at: now,
        });

        SystemSnapshot {
            host: self.host.clone(),
            timestamp: chrono::Utc::now().timestamp(),
            cpu_percent,
            cpu_count: self.heavy.cpu_count,
            cpu_physical: self.heavy.cpu_physical,
            cpu_model: self.heavy.cpu_model.clone(),
            cpu_freq: self.heavy.cpu_freq_ghz,
            memory_usage,
            memory_total,
            swap_usage,
            swap_total,
            disk_usage: percent(self.heavy.disk_used, self.heavy.disk_total),
            disk_total: self.heavy.disk_total,
            partitions: self.heavy.partitions.clone(),
            bytes_sent,
            bytes_recv,
            net_recv_rate,
            net_sent_rate,
            disk_read_bytes: disk_io.read_bytes,
            disk_write_bytes: disk_io.write_bytes,
            disk_read_ops: disk_io.read_ops,
            disk_write_ops: disk_io.write_ops,
            disk_read_rate,
            disk_write_rate,
            disk_read_iops,
            disk_write_iops,
            interfaces,
            uptime: System::uptime(),
            ddos_status: DdosStatus::from_recv_rate(net_recv_rate),
        }
    }

    fn refresh_heavy(&mut self) {
        self.heavy.cpu_count = self.sys.cpus().len() as u32;
        self.heavy.cpu_physical = System::physical_core_count().unwrap_or(0) as u32;
        self.heavy.cpu_freq_ghz = self
            .sys
            .cpus()
            .first()
            .map(|c| c.frequency() as f64 / 1000.0)
            .unwrap_or(0.0);
        self.heavy.cpu_model = linux::read_cpu_model()
            .or_else(|| {
                self.sys
                    .cpus()
                    .first()
                    .map(|c| c.brand().to_string())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| "Unknown".into());

        self.disks.refresh(true);
        self.heavy.partitions = self
            .disks
            .list()
            .iter()
            .map(|d| {
                let total = d.total_space();
                let used = total.saturating_sub(d.available_space());
                PartitionStat {
                    mount_point: d.mount_point().to_string_lossy().into_owned(),
                    fstype: d.file_system().to_string_lossy().into_owned(),
                    total,
                    used,
                }
            })
            .collect();
        let root = self
            .heavy
            .partitions
            .iter()
            .find(|p| p.mount_point == "/")
            .or_else(|| self.heavy.partitions.first());
        self.heavy.disk_total = root.map(|p| p.total).unwrap_or(0);
        self.heavy.disk_used = root.map(|p| p.used).unwrap_or(0);

        self.networks.refresh(true);
        self.heavy.iface_meta = self
            .networks
            .list()
            .iter()
            .map(|(name, data)| {
                let ip = data
                    .ip_networks()
                    .iter()
                    .find(|n| n.addr.is_ipv4())
                    .map(|n| n.addr.to_string())
                    .unwrap_or_default();
                (
                    name.clone(),
                    IfaceMeta {
                        ip,
                        mac: data.mac_address().to_string(),
                        is_up: linux::interface_is_up(name),
                    },
                )
            })
            .collect();
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_rate_zero_on_first_interval() {
        // no previous sample is modeled as dt <= 0 by callers
        assert_eq!(clamped_rate(1_000_000, 0, 0.0), 0.0);
    }

    #[test]
    fn clamped_rate_zero_on_counter_regression() {
        assert_eq!(clamped_rate(100, 200, 1.0), 0.0);
    }

    #[test]
    fn clamped_rate_computes_bytes_per_sec() {
        let r = clamped_rate(11_000_000, 1_000_000, 1.0);
        assert!((r - 10_000_000.0).abs() < f64::EPSILON);
        // ~10 MB/s as the wire reports it
        assert!((r / MB - 9.5367).abs() < 0.001);
    }

    #[test]
    fn percent_handles_zero_total() {
        assert_eq!(percent(5, 0), 0.0);
        assert!((percent(1, 4) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn first_sample_has_zero_rates() {
        let mut sampler = SystemSampler::new("test-host".into());
        let snap = sampler.sample();
        assert_eq!(snap.net_recv_rate, 0.0);
        assert_eq!(snap.net_sent_rate, 0.0);
        assert_eq!(snap.disk_read_rate, 0.0);
        assert_eq!(snap.disk_write_iops, 0.0);
        assert!(snap.cpu_percent >= 0.0 && snap.cpu_percent <= 100.0);
        assert!(snap.memory_usage >= 0.0 && snap.memory_usage <= 100.0);
        assert_eq!(snap.host, "test-host");
    }
}
