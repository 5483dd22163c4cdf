// Time-series store: Flux writes/reads, adaptive downsampling, derivatives

use chrono::{DateTime, FixedOffset, Utc};
use futures_util::stream;
use influxdb2::models::{DataPoint, Query};
use influxdb2::{Client, FromDataPoint};
use tracing::warn;

use crate::models::{ContainerSnapshot, SystemSnapshot};

fn epoch() -> DateTime<FixedOffset> {
    DateTime::<Utc>::UNIX_EPOCH.fixed_offset()
}

// ---------------------------------------------------------------------------
// Adaptive time ranges (10s ≤1h, 1m for 1-24h, 5m ≥7d, 1h ≥30d)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    /// Arguments for the Flux `range()` call, e.g. `start: -15m`.
    pub range_clause: String,
    /// aggregateWindow `every:` value.
    pub window: String,
}

fn window_for_secs(total_secs: i64) -> &'static str {
    const HOUR: i64 = 3600;
    const DAY: i64 = 24 * HOUR;
    if total_secs >= 30 * DAY {
        "1h"
    } else if total_secs >= 7 * DAY {
        "5m"
    } else if total_secs >= HOUR {
        "1m"
    } else {
        "10s"
    }
}

/// Parse a relative duration like "90s", "15m", "24h", "7d".
fn parse_duration_secs(s: &str) -> Option<i64> {
    let s = s.trim();
    let split = s.len().checked_sub(1)?;
    let (num, unit) = s.split_at(split);
    let value: i64 = num.parse().ok()?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86400,
        _ => return None,
    };
    (secs > 0).then_some(secs)
}

/// Resolve duration / from / to query inputs into a Flux range and
/// aggregation window. Absolute bounds accept RFC3339 or unix millis.
pub fn parse_time_range(duration: &str, from: &str, to: &str) -> anyhow::Result<TimeRange> {
    if !from.is_empty() && !to.is_empty() {
        let parse_bound = |s: &str| -> Option<DateTime<Utc>> {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    s.parse::<i64>()
                        .ok()
                        .and_then(DateTime::<Utc>::from_timestamp_millis)
                })
        };
        if let (Some(start), Some(stop)) = (parse_bound(from), parse_bound(to)) {
            let total = (stop - start).num_seconds();
            return Ok(TimeRange {
                range_clause: format!(
                    "start: {}, stop: {}",
                    start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    stop.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                ),
                window: window_for_secs(total).to_string(),
            });
        }
    }

    let duration = match duration {
        "" => "15m",
        // incomplete custom-range requests fall back gracefully
        "custom" => "1h",
        other => other,
    };
    let secs = parse_duration_secs(duration)
        .ok_or_else(|| anyhow::anyhow!("invalid duration format: {}", duration))?;
    Ok(TimeRange {
        range_clause: format!("start: -{}", duration),
        window: window_for_secs(secs).to_string(),
    })
}

// ---------------------------------------------------------------------------
// Query result rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize, FromDataPoint)]
pub struct SystemMetricData {
    pub cpu_percent: f64,
    pub cpu_count: f64,
    pub cpu_model: String,
    pub memory_usage: f64,
    pub memory_total: f64,
    pub swap_usage: f64,
    pub disk_usage: f64,
    pub disk_total: f64,
    pub net_recv_rate: f64,
    pub net_sent_rate: f64,
    pub bytes_sent: f64,
    pub bytes_recv: f64,
    pub uptime: f64,
    pub ddos_status: String,
    pub process_raw: String,
    pub partitions: String,
    pub interfaces: String,
    pub time: DateTime<FixedOffset>,
}

impl Default for SystemMetricData {
    fn default() -> Self {
        Self {
            cpu_percent: 0.0,
            cpu_count: 0.0,
            cpu_model: String::new(),
            memory_usage: 0.0,
            memory_total: 0.0,
            swap_usage: 0.0,
            disk_usage: 0.0,
            disk_total: 0.0,
            net_recv_rate: 0.0,
            net_sent_rate: 0.0,
            bytes_sent: 0.0,
            bytes_recv: 0.0,
            uptime: 0.0,
            ddos_status: String::new(),
            process_raw: String::new(),
            partitions: String::new(),
            interfaces: String::new(),
            time: epoch(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, FromDataPoint)]
pub struct HistoryPoint {
    pub cpu_percent: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub net_recv_rate: f64,
    pub net_sent_rate: f64,
    pub time: DateTime<FixedOffset>,
}

impl Default for HistoryPoint {
    fn default() -> Self {
        Self {
            cpu_percent: 0.0,
            memory_usage: 0.0,
            disk_usage: 0.0,
            net_recv_rate: 0.0,
            net_sent_rate: 0.0,
            time: epoch(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, FromDataPoint)]
pub struct InterfacePoint {
    pub interface: String,
    pub bytes_sent: f64,
    pub bytes_recv: f64,
    pub time: DateTime<FixedOffset>,
}

impl Default for InterfacePoint {
    fn default() -> Self {
        Self {
            interface: String::new(),
            bytes_sent: 0.0,
            bytes_recv: 0.0,
            time: epoch(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, FromDataPoint)]
pub struct ContainerPoint {
    pub container_id: String,
    pub container_name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub ports: String,
    pub cpu_percent: f64,
    pub memory_usage: f64,
    pub net_rx: f64,
    pub net_tx: f64,
    pub time: DateTime<FixedOffset>,
}

impl Default for ContainerPoint {
    fn default() -> Self {
        Self {
            container_id: String::new(),
            container_name: String::new(),
            image: String::new(),
            state: String::new(),
            status: String::new(),
            ports: String::new(),
            cpu_percent: 0.0,
            memory_usage: 0.0,
            net_rx: 0.0,
            net_tx: 0.0,
            time: epoch(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, FromDataPoint)]
struct HostTagRow {
    value: String,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct MetricsStore {
    client: Client,
    bucket: String,
}

impl MetricsStore {
    pub fn new(url: &str, org: &str, token: &str, bucket: &str) -> Self {
        Self {
            client: Client::new(url, org, token),
            bucket: bucket.to_string(),
        }
    }

    /// One `system` point per snapshot: host as tag, everything else as
    /// fields; partitions and interfaces ride along as JSON strings for
    /// later unpack.
    pub async fn write_system_point(
        &self,
        snapshot: &SystemSnapshot,
        process_raw: &str,
    ) -> anyhow::Result<()> {
        let partitions = serde_json::to_string(&snapshot.partitions)?;
        let interfaces = serde_json::to_string(&snapshot.interfaces)?;
        let point = DataPoint::builder("system")
            .tag("host", &snapshot.host)
            .field("cpu_percent", snapshot.cpu_percent)
            .field("cpu_count", snapshot.cpu_count as f64)
            .field("cpu_physical", snapshot.cpu_physical as f64)
            .field("cpu_model", snapshot.cpu_model.as_str())
            .field("cpu_freq", snapshot.cpu_freq)
            .field("memory_usage", snapshot.memory_usage)
            .field("memory_total", snapshot.memory_total as f64)
            .field("swap_usage", snapshot.swap_usage)
            .field("swap_total", snapshot.swap_total as f64)
            .field("disk_usage", snapshot.disk_usage)
            .field("disk_total", snapshot.disk_total as f64)
            .field("bytes_sent", snapshot.bytes_sent as f64)
            .field("bytes_recv", snapshot.bytes_recv as f64)
            .field("net_recv_rate", snapshot.net_recv_rate)
            .field("net_sent_rate", snapshot.net_sent_rate)
            .field("disk_read_rate", snapshot.disk_read_rate)
            .field("disk_write_rate", snapshot.disk_write_rate)
            .field("disk_read_iops", snapshot.disk_read_iops)
            .field("disk_write_iops", snapshot.disk_write_iops)
            .field("uptime", snapshot.uptime as f64)
            .field("ddos_status", snapshot.ddos_status.as_str())
            .field("process_raw", process_raw)
            .field("partitions", partitions.as_str())
            .field("interfaces", interfaces.as_str())
            .timestamp(snapshot.timestamp * 1_000_000_000)
            .build()?;
        self.client
            .write(&self.bucket, stream::iter([point]))
            .await?;
        Ok(())
    }

    pub async fn write_container_point(
        &self,
        host: &str,
        ts: i64,
        container: &ContainerSnapshot,
    ) -> anyhow::Result<()> {
        let point = DataPoint::builder("containers")
            .tag("host", host)
            .tag("container_id", &container.id)
            .tag("container_name", &container.name)
            .tag("image", &container.image)
            .tag("state", &container.state)
            .field("status", container.status.as_str())
            .field("ports", container.ports.as_str())
            .field("cpu_percent", container.cpu_percent)
            .field("memory_usage", container.memory_usage)
            .field("net_rx", container.net_rx)
            .field("net_tx", container.net_tx)
            .timestamp(ts * 1_000_000_000)
            .build()?;
        self.client
            .write(&self.bucket, stream::iter([point]))
            .await?;
        Ok(())
    }

    /// Raw monotonic counters per interface; rates are computed on read via
    /// a non-negative derivative.
    pub async fn write_interface_point(
        &self,
        host: &str,
        ts: i64,
        interface: &str,
        bytes_sent: u64,
        bytes_recv: u64,
    ) -> anyhow::Result<()> {
        let point = DataPoint::builder("network_interface")
            .tag("host", host)
            .tag("interface", interface)
            .field("bytes_sent", bytes_sent as f64)
            .field("bytes_recv", bytes_recv as f64)
            .timestamp(ts * 1_000_000_000)
            .build()?;
        self.client
            .write(&self.bucket, stream::iter([point]))
            .await?;
        Ok(())
    }

    /// Last point within 5 minutes for the host, pivoted to one row.
    pub async fn latest_system(&self, host: &str) -> anyhow::Result<Option<SystemMetricData>> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
  |> range(start: -5m)
  |> filter(fn: (r) => r["_measurement"] == "system")
  |> filter(fn: (r) => r["host"] == "{host}")
  |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")
  |> sort(columns: ["_time"], desc: true)
  |> limit(n: 1)"#,
            bucket = self.bucket,
            host = host,
        );
        let mut rows: Vec<SystemMetricData> =
            self.client.query(Some(Query::new(flux))).await?;
        Ok(rows.drain(..).next())
    }

    /// Downsampled history over the adaptive window.
    pub async fn system_history(
        &self,
        host: &str,
        range: &TimeRange,
    ) -> anyhow::Result<Vec<HistoryPoint>> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
  |> range({range})
  |> filter(fn: (r) => r["_measurement"] == "system")
  |> filter(fn: (r) => r["host"] == "{host}")
  |> filter(fn: (r) => r["_field"] == "cpu_percent" or r["_field"] == "memory_usage" or r["_field"] == "disk_usage" or r["_field"] == "net_recv_rate" or r["_field"] == "net_sent_rate")
  |> aggregateWindow(every: {window}, fn: mean, createEmpty: false)
  |> pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")"#,
            bucket = self.bucket,
            range = range.range_clause,
            host = host,
            window = range.window,
        );
        Ok(self.client.query(Some(Query::new(flux))).await?)
    }

    /// Monotonic counters become rates through a 1 s non-negative
    /// first-order derivative, then the window mean.
    pub async fn interface_history(
        &self,
        host: &str,
        range: &TimeRange,
    ) -> anyhow::Result<Vec<InterfacePoint>> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
  |> range({range})
  |> filter(fn: (r) => r["_measurement"] == "network_interface")
  |> filter(fn: (r) => r["host"] == "{host}")
  |> derivative(unit: 1s, nonNegative: true)
  |> aggregateWindow(every: {window}, fn: mean, createEmpty: false)
  |> pivot(rowKey: ["_time", "interface"], columnKey: ["_field"], valueColumn: "_value")"#,
            bucket = self.bucket,
            range = range.range_clause,
            host = host,
            window = range.window,
        );
        Ok(self.client.query(Some(Query::new(flux))).await?)
    }

    /// Latest value of every field for every container seen in the last
    /// minute.
    pub async fn latest_containers(&self, host: &str) -> anyhow::Result<Vec<ContainerPoint>> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
  |> range(start: -1m)
  |> filter(fn: (r) => r["_measurement"] == "containers")
  |> filter(fn: (r) => r["host"] == "{host}")
  |> group(columns: ["container_id", "_field"])
  |> last()
  |> pivot(rowKey: ["_time", "container_id", "container_name", "image", "state"], columnKey: ["_field"], valueColumn: "_value")"#,
            bucket = self.bucket,
            host = host,
        );
        Ok(self.client.query(Some(Query::new(flux))).await?)
    }

    /// Hosts that reported within the last hour.
    pub async fn hosts(&self) -> anyhow::Result<Vec<String>> {
        let flux = format!(
            r#"from(bucket: "{bucket}")
  |> range(start: -1h)
  |> filter(fn: (r) => r["_measurement"] == "system")
  |> filter(fn: (r) => r["_field"] == "cpu_percent")
  |> keep(columns: ["host"])
  |> distinct(column: "host")"#,
            bucket = self.bucket,
        );
        let rows: Vec<HostTagRow> = self.client.query(Some(Query::new(flux))).await?;
        let mut hosts: Vec<String> = rows
            .into_iter()
            .map(|r| r.value)
            .filter(|h| !h.is_empty())
            .collect();
        hosts.sort();
        hosts.dedup();
        Ok(hosts)
    }

    /// Container names currently reporting for a host (merged into the
    /// services listing).
    pub async fn container_names(&self, host: &str) -> Vec<String> {
        match self.latest_containers(host).await {
            Ok(points) => {
                let mut names: Vec<String> = points
                    .into_iter()
                    .map(|p| p.container_name)
                    .filter(|n| !n.is_empty())
                    .collect();
                names.sort();
                names.dedup();
                names
            }
            Err(e) => {
                warn!("container name listing failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parser_units() {
        assert_eq!(parse_duration_secs("90s"), Some(90));
        assert_eq!(parse_duration_secs("15m"), Some(900));
        assert_eq!(parse_duration_secs("24h"), Some(86400));
        assert_eq!(parse_duration_secs("7d"), Some(604800));
        assert_eq!(parse_duration_secs("bogus"), None);
        assert_eq!(parse_duration_secs("-5m"), None);
        assert_eq!(parse_duration_secs(""), None);
    }

    #[test]
    fn window_matches_duration_tiers() {
        let tr = parse_time_range("15m", "", "").unwrap();
        assert_eq!(tr.window, "10s");
        assert_eq!(tr.range_clause, "start: -15m");

        assert_eq!(parse_time_range("1h", "", "").unwrap().window, "1m");
        assert_eq!(parse_time_range("24h", "", "").unwrap().window, "1m");
        assert_eq!(parse_time_range("7d", "", "").unwrap().window, "5m");
        assert_eq!(parse_time_range("30d", "", "").unwrap().window, "1h");
    }

    #[test]
    fn empty_duration_defaults_and_custom_falls_back() {
        assert_eq!(parse_time_range("", "", "").unwrap().range_clause, "start: -15m");
        assert_eq!(parse_time_range("custom", "", "").unwrap().range_clause, "start: -1h");
    }

    #[test]
    fn absolute_bounds_accept_rfc3339_and_millis() {
        let tr = parse_time_range("", "2026-07-01T00:00:00Z", "2026-07-02T00:00:00Z").unwrap();
        assert_eq!(
            tr.range_clause,
            "start: 2026-07-01T00:00:00Z, stop: 2026-07-02T00:00:00Z"
        );
        assert_eq!(tr.window, "1m");

        let from_ms = 1_750_000_000_000i64;
        let to_ms = from_ms + 3_600_000;
        let tr = parse_time_range("", &from_ms.to_string(), &to_ms.to_string()).unwrap();
        assert!(tr.range_clause.starts_with("start: 2025-"));
        assert_eq!(tr.window, "1m");
    }

    #[test]
    fn invalid_duration_is_an_error() {
        assert!(parse_time_range("fortnight", "", "").is_err());
    }
}
