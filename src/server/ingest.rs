// Agent-facing ingestion: validate, enrich, dual-write, evaluate alerts

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::models::{ContainerSnapshot, ProcessInfo, SystemSnapshot};
use crate::server::access_log::{domain_from_source, is_web_service, parse_combined_log};
use crate::server::auth::random_string;
use crate::server::event_store::{
    AccessLogRow, ConnectionRow, FirewallRow, LogRow, ProcessRow,
};
use crate::server::mfa;
use crate::server::AppState;

const MB: f64 = 1024.0 * 1024.0;

fn internal_error(msg: &str) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": msg }))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct MetricsPayload {
    #[serde(flatten)]
    pub snapshot: SystemSnapshot,
    #[serde(default)]
    pub containers: Vec<ContainerSnapshot>,
    #[serde(default)]
    pub process_raw: String,
}

/// POST /ingest/metrics — one system point, one per container, one per
/// interface; then the alert pass.
pub async fn handle_metrics(
    State(state): State<AppState>,
    Json(mut payload): Json<MetricsPayload>,
) -> Response {
    if payload.snapshot.host.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "host required" })))
            .into_response();
    }
    if payload.snapshot.timestamp == 0 {
        payload.snapshot.timestamp = Utc::now().timestamp();
    }
    let snapshot = &payload.snapshot;

    if let Err(e) = state
        .metrics
        .write_system_point(snapshot, &payload.process_raw)
        .await
    {
        warn!("system point write failed: {}", e);
        return internal_error("Failed to store metric");
    }
    for container in &payload.containers {
        if let Err(e) = state
            .metrics
            .write_container_point(&snapshot.host, snapshot.timestamp, container)
            .await
        {
            warn!("container point write failed: {}", e);
        }
    }
    for iface in &snapshot.interfaces {
        if let Err(e) = state
            .metrics
            .write_interface_point(
                &snapshot.host,
                snapshot.timestamp,
                &iface.name,
                iface.bytes_sent,
                iface.bytes_recv,
            )
            .await
        {
            warn!("interface point write failed: {}", e);
        }
    }

    // alert thresholds are in B/s; the wire rates are MB/s
    let mut metrics: HashMap<String, f64> = HashMap::from([
        ("cpu_percent".into(), snapshot.cpu_percent),
        ("memory_usage".into(), snapshot.memory_usage),
        ("disk_usage".into(), snapshot.disk_usage),
        ("swap_usage".into(), snapshot.swap_usage),
        ("cpu_freq".into(), snapshot.cpu_freq),
        ("net_recv_rate".into(), snapshot.net_recv_rate * MB),
        ("net_sent_rate".into(), snapshot.net_sent_rate * MB),
        (
            "net_total_rate".into(),
            (snapshot.net_recv_rate + snapshot.net_sent_rate) * MB,
        ),
        ("disk_read_rate".into(), snapshot.disk_read_rate * MB),
        ("disk_write_rate".into(), snapshot.disk_write_rate * MB),
        ("disk_read_op".into(), snapshot.disk_read_iops),
        ("disk_write_op".into(), snapshot.disk_write_iops),
    ]);
    // the agent's verdict is advisory; the server re-evaluates the receive
    // rate against its own configurable threshold (MB/s)
    let ddos_threshold = state.config.get().ddos_threshold;
    if snapshot.ddos_status == crate::models::DdosStatus::Critical
        || (ddos_threshold > 0.0 && snapshot.net_recv_rate > ddos_threshold)
    {
        metrics.insert("ddos_status".into(), 1.0);
    }

    let ips: Vec<&str> = snapshot
        .interfaces
        .iter()
        .map(|i| i.ip.as_str())
        .filter(|ip| !ip.is_empty() && *ip != "127.0.0.1" && *ip != "::1")
        .collect();
    let ip_info = ips.join(", ");

    state
        .alerts
        .evaluate(&snapshot.host, &metrics, &ip_info)
        .await;

    StatusCode::ACCEPTED.into_response()
}

#[derive(Debug, Deserialize)]
pub struct LogPayload {
    #[serde(default)]
    pub source_path: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub level: String,
}

/// POST /ingest/logs — web-service lines attempt access-log structuring
/// with GeoIP enrichment; every line lands in the generic table.
pub async fn handle_logs(State(state): State<AppState>, Json(payload): Json<LogPayload>) -> Response {
    let ts = payload.timestamp.unwrap_or_else(Utc::now);

    if is_web_service(&payload.service)
        && let Some(parts) = parse_combined_log(&payload.message)
    {
        let geo = state.geoip.lookup(&parts.ip);
        let row = AccessLogRow {
            ts,
            service: payload.service.clone(),
            host: payload.host.clone(),
            ip: parts.ip,
            method: parts.method,
            path: parts.path,
            status_code: parts.status,
            bytes_sent: parts.bytes_sent,
            user_agent: parts.user_agent,
            country: geo.country,
            region: geo.region,
            city: geo.city,
            latitude: geo.latitude,
            longitude: geo.longitude,
            domain: domain_from_source(&payload.source_path),
        };
        if let Err(e) = state.events.insert_access_log(&row).await {
            warn!("access log insert failed: {}", e);
        }
    }

    let row = LogRow {
        ts,
        host: payload.host,
        service: payload.service,
        level: payload.level,
        message: payload.message,
        source_path: payload.source_path,
    };
    if let Err(e) = state.events.insert_log(&row).await {
        warn!("log insert failed: {}", e);
        return internal_error("Failed to store log");
    }
    StatusCode::ACCEPTED.into_response()
}

#[derive(Debug, Deserialize)]
pub struct ProcessesPayload {
    pub host: String,
    #[serde(default)]
    pub processes: Vec<ProcessInfo>,
}

pub async fn handle_processes(
    State(state): State<AppState>,
    Json(payload): Json<ProcessesPayload>,
) -> Response {
    let ts = Utc::now();
    let rows: Vec<ProcessRow> = payload
        .processes
        .iter()
        .map(|p| ProcessRow {
            ts,
            host: payload.host.clone(),
            pid: p.pid,
            name: p.name.clone(),
            username: p.username.clone(),
            cpu_percent: p.cpu_percent,
            memory_percent: p.memory_percent,
            cmdline: p.cmdline.clone(),
        })
        .collect();
    if let Err(e) = state.events.insert_processes(&rows).await {
        warn!("process insert failed: {}", e);
        return internal_error("Failed to insert processes");
    }
    StatusCode::ACCEPTED.into_response()
}

#[derive(Debug, Deserialize)]
pub struct FirewallPayload {
    pub host: String,
    #[serde(default)]
    pub rules: String,
}

pub async fn handle_firewall(
    State(state): State<AppState>,
    Json(payload): Json<FirewallPayload>,
) -> Response {
    let row = FirewallRow {
        ts: Utc::now(),
        host: payload.host,
        rules: payload.rules,
    };
    if let Err(e) = state.events.insert_firewall(&row).await {
        warn!("firewall insert failed: {}", e);
        return internal_error("Failed to insert firewall rules");
    }
    StatusCode::ACCEPTED.into_response()
}

#[derive(Debug, Deserialize)]
pub struct WireConnection {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub local_ip: String,
    pub local_port: u16,
    pub remote_ip: String,
    pub remote_port: u16,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub pid: i32,
    #[serde(default)]
    pub process_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionsPayload {
    pub host: String,
    #[serde(default)]
    pub connections: Vec<WireConnection>,
}

/// POST /ingest/connections — many rows per tick, batch-prepared; missing
/// timestamps are filled server-side.
pub async fn handle_connections(
    State(state): State<AppState>,
    Json(payload): Json<ConnectionsPayload>,
) -> Response {
    let now = Utc::now();
    let rows: Vec<ConnectionRow> = payload
        .connections
        .iter()
        .map(|c| ConnectionRow {
            ts: c.timestamp.unwrap_or(now),
            host: payload.host.clone(),
            local_ip: c.local_ip.clone(),
            local_port: c.local_port,
            remote_ip: c.remote_ip.clone(),
            remote_port: c.remote_port,
            status: c.status.clone(),
            pid: c.pid,
            process_name: c.process_name.clone(),
        })
        .collect();
    if let Err(e) = state.events.insert_connections(&rows).await {
        warn!("connection insert failed: {}", e);
        return internal_error("Failed to insert connections");
    }
    StatusCode::ACCEPTED.into_response()
}

#[derive(Debug, Deserialize)]
pub struct FirewallSyncPayload {
    pub host: String,
    #[serde(default)]
    pub blocked_ips: Vec<String>,
}

/// POST /ingest/firewall-sync — wholesale replacement of the agent's
/// blocked-IP rows with what iptables actually holds.
pub async fn handle_firewall_sync(
    State(state): State<AppState>,
    Json(payload): Json<FirewallSyncPayload>,
) -> Response {
    if let Err(e) = state
        .events
        .sync_blocked_ips(&payload.host, &payload.blocked_ips)
        .await
    {
        warn!("firewall sync failed: {}", e);
        return internal_error("Failed to sync blocked IPs");
    }
    StatusCode::ACCEPTED.into_response()
}

#[derive(Debug, Deserialize)]
pub struct ServiceStatsPayload {
    pub host: String,
    pub service: String,
    #[serde(default)]
    pub stats: serde_json::Value,
}

/// POST /ingest/service-stats — probe output stored as a generic log row
/// (the probe seam is interface-only; stats stay opaque JSON).
pub async fn handle_service_stats(
    State(state): State<AppState>,
    Json(payload): Json<ServiceStatsPayload>,
) -> Response {
    let row = LogRow {
        ts: Utc::now(),
        host: payload.host,
        service: payload.service,
        level: "INFO".to_string(),
        message: payload.stats.to_string(),
        source_path: "service-stats".to_string(),
    };
    if let Err(e) = state.events.insert_log(&row).await {
        warn!("service stats insert failed: {}", e);
        return internal_error("Failed to store service stats");
    }
    StatusCode::ACCEPTED.into_response()
}

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    #[serde(default)]
    pub api_key: String,
    pub hostname: String,
    #[serde(default)]
    pub mfa_code: String,
}

/// POST /agent/register — SystemAPIKey gate, optional TOTP, then a fresh
/// 32-char shared secret persisted under agent_secrets[hostname].
pub async fn handle_register_agent(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Response {
    let cfg = state.config.get();

    if cfg.system_api_key.is_empty() || payload.api_key != cfg.system_api_key {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "Invalid API Key" })))
            .into_response();
    }

    if cfg.mfa_enabled {
        if payload.mfa_code.is_empty() {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "MFA_REQUIRED", "message": "MFA Code required" })),
            )
                .into_response();
        }
        if !mfa::validate(&payload.mfa_code, &cfg.mfa_secret) {
            return (StatusCode::FORBIDDEN, Json(json!({ "error": "Invalid MFA Code" })))
                .into_response();
        }
    }

    if payload.hostname.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "hostname required" })))
            .into_response();
    }

    let secret = random_string(32);
    if let Err(e) = state.config.update(|c| {
        c.agent_secrets
            .insert(payload.hostname.clone(), secret.clone());
    }) {
        warn!("failed to persist agent secret: {}", e);
        return internal_error("Failed to save registration");
    }

    (
        StatusCode::OK,
        Json(json!({ "agent_id": payload.hostname, "secret": secret })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct AgentCommandsQuery {
    #[serde(default)]
    pub agent_id: String,
}

/// GET /agent/commands?agent_id= — pending commands FIFO.
pub async fn handle_agent_commands(
    State(state): State<AppState>,
    Query(q): Query<AgentCommandsQuery>,
) -> Response {
    if q.agent_id.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "agent_id required" })))
            .into_response();
    }
    match state.events.pending_commands(&q.agent_id).await {
        Ok(commands) => (StatusCode::OK, Json(json!({ "commands": commands }))).into_response(),
        Err(e) => {
            warn!("pending command query failed: {}", e);
            internal_error("Failed to fetch commands")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandAckPayload {
    pub id: String,
    pub status: crate::models::CommandStatus,
    #[serde(default)]
    pub output: String,
}

/// POST /agent/commands/ack — at-least-once finalization.
pub async fn handle_command_ack(
    State(state): State<AppState>,
    Json(payload): Json<CommandAckPayload>,
) -> Response {
    if let Err(e) = state
        .events
        .ack_command(&payload.id, payload.status, &payload.output)
        .await
    {
        warn!("command ack failed: {}", e);
        return internal_error("Failed to ack command");
    }
    StatusCode::OK.into_response()
}
