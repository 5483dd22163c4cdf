// HTTP surface: router assembly plus user/admin query handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router, middleware};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::models::{AlertRule, NotificationChannel};
use crate::server::event_store::LogFilter;
use crate::server::ingest;
use crate::server::metrics_store::parse_time_range;
use crate::server::{auth, mfa, AppState};

const IP_LOG_PAGE: usize = 20;

pub fn app(state: AppState) -> Router {
    let agent = Router::new()
        .route("/agent/commands", get(ingest::handle_agent_commands))
        .route("/agent/commands/ack", post(ingest::handle_command_ack))
        .route("/ingest/firewall-sync", post(ingest::handle_firewall_sync))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::agent_secret_auth,
        ));

    let public = Router::new()
        .route("/auth/login", post(handle_login))
        .route("/agent/register", post(ingest::handle_register_agent))
        .route("/ingest/metrics", post(ingest::handle_metrics))
        .route("/ingest/logs", post(ingest::handle_logs))
        .route("/ingest/processes", post(ingest::handle_processes))
        .route("/ingest/firewall", post(ingest::handle_firewall))
        .route("/ingest/connections", post(ingest::handle_connections))
        .route("/ingest/service-stats", post(ingest::handle_service_stats));

    let user = Router::new()
        .route("/hosts", get(handle_get_hosts).delete(handle_delete_host))
        .route("/metrics/system", get(handle_latest_metrics))
        .route("/metrics/history", get(handle_history))
        .route("/metrics/containers", get(handle_containers))
        .route("/metrics/interfaces/history", get(handle_interface_history))
        .route("/logs/stream", get(handle_recent_logs))
        .route("/logs/search", get(handle_search_logs))
        .route("/logs/services", get(handle_services))
        .route("/processes", get(handle_get_processes))
        .route("/firewall", get(handle_get_firewall))
        .route("/connections/summary", get(handle_connection_summary))
        .route("/connections/details", get(handle_connection_details))
        .route("/settings", get(handle_get_settings))
        .route("/ip/block", post(handle_block_ip))
        .route("/ip/unblock", post(handle_unblock_ip))
        .route("/ip/{ip}", get(handle_ip_details))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::optional_user_auth,
        ));

    let admin = Router::new()
        .route("/settings", post(handle_save_settings))
        .route(
            "/alerts/rules",
            get(handle_get_alert_rules).post(handle_create_alert_rule),
        )
        .route(
            "/alerts/rules/{id}",
            put(handle_update_alert_rule).delete(handle_delete_alert_rule),
        )
        .route("/alerts/rules/{id}/toggle", post(handle_toggle_alert_rule))
        .route(
            "/alerts/channels",
            get(handle_get_channels).post(handle_create_channel),
        )
        .route("/alerts/channels/{id}", axum::routing::delete(handle_delete_channel))
        .route("/alerts/silence", post(handle_silence))
        .route("/alerts/unsilence", post(handle_unsilence))
        .route("/mfa/setup", post(handle_mfa_setup))
        .route("/mfa/enable", post(handle_mfa_enable))
        .route("/mfa/disable", post(handle_mfa_disable))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::optional_admin_auth,
        ));

    let v1 = public.merge(agent).merge(user).merge(admin);

    Router::new()
        .route("/", get(|| async { "fleetwatch server" }))
        .route("/version", get(handle_version))
        .nest("/api/v1", v1)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .with_state(state)
}

fn internal_error(msg: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": msg }))).into_response()
}

async fn handle_version() -> impl IntoResponse {
    Json(json!({
        "name": crate::version::NAME,
        "version": crate::version::VERSION,
    }))
}

// -- auth -------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LoginPayload {
    password: String,
}

async fn handle_login(State(state): State<AppState>, Json(p): Json<LoginPayload>) -> Response {
    if !state.auth.validate_password(&p.password) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid password" })))
            .into_response();
    }
    match state
        .auth
        .generate_token("admin", "admin", vec!["*".to_string()])
    {
        Ok(token) => (StatusCode::OK, Json(json!({ "token": token }))).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

// -- hosts ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HostQuery {
    #[serde(default)]
    host: String,
}

async fn handle_get_hosts(State(state): State<AppState>) -> Response {
    match state.metrics.hosts().await {
        Ok(hosts) => {
            let ignored = state.config.get().ignored_hosts;
            let visible: Vec<String> = hosts
                .into_iter()
                .filter(|h| !ignored.contains(h))
                .collect();
            (StatusCode::OK, Json(visible)).into_response()
        }
        Err(e) => internal_error(e.to_string()),
    }
}

/// Soft delete: the host goes on the ignored list; its data ages out via
/// retention.
async fn handle_delete_host(State(state): State<AppState>, Query(q): Query<HostQuery>) -> Response {
    if q.host.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Host required" })))
            .into_response();
    }
    let result = state.config.update(|c| {
        if !c.ignored_hosts.contains(&q.host) {
            c.ignored_hosts.push(q.host.clone());
        }
    });
    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

// -- metrics ----------------------------------------------------------------

async fn handle_latest_metrics(
    State(state): State<AppState>,
    Query(q): Query<HostQuery>,
) -> Response {
    match state.metrics.latest_system(&q.host).await {
        Ok(Some(data)) => (StatusCode::OK, Json(data)).into_response(),
        Ok(None) => (StatusCode::OK, Json(json!({}))).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    host: String,
    #[serde(default)]
    duration: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
}

async fn handle_history(State(state): State<AppState>, Query(q): Query<HistoryQuery>) -> Response {
    let range = match parse_time_range(&q.duration, &q.from, &q.to) {
        Ok(r) => r,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };
    match state.metrics.system_history(&q.host, &range).await {
        Ok(history) => (StatusCode::OK, Json(history)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn handle_containers(State(state): State<AppState>, Query(q): Query<HostQuery>) -> Response {
    match state.metrics.latest_containers(&q.host).await {
        Ok(containers) => (StatusCode::OK, Json(containers)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn handle_interface_history(
    State(state): State<AppState>,
    Query(q): Query<HistoryQuery>,
) -> Response {
    let range = match parse_time_range(&q.duration, &q.from, &q.to) {
        Ok(r) => r,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };
    match state.metrics.interface_history(&q.host, &range).await {
        Ok(history) => (StatusCode::OK, Json(history)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

// -- logs -------------------------------------------------------------------

async fn handle_recent_logs(State(state): State<AppState>) -> Response {
    match state.events.recent_logs(50).await {
        Ok(logs) => (StatusCode::OK, Json(logs)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    level: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    service: String,
    #[serde(default)]
    search: String,
    #[serde(default)]
    before: String,
    #[serde(default)]
    after: String,
    #[serde(default)]
    order: String,
    #[serde(default)]
    limit: Option<usize>,
}

/// Accept RFC3339, a bare date, or "YYYY-MM-DD HH:MM".
fn parse_search_time(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Some(t.and_utc());
    }
    None
}

async fn handle_search_logs(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> Response {
    let filter = LogFilter {
        limit: q.limit.unwrap_or(100),
        level: q.level,
        host: q.host,
        service: q.service,
        search: q.search,
        before: parse_search_time(&q.before),
        after: parse_search_time(&q.after),
        ascending: q.order.eq_ignore_ascii_case("asc"),
    };
    match state.events.query_logs(&filter).await {
        Ok(logs) => (StatusCode::OK, Json(logs)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

/// Historic log services merged with containers currently reporting.
async fn handle_services(State(state): State<AppState>, Query(q): Query<HostQuery>) -> Response {
    let mut services = match state.events.unique_services(&q.host).await {
        Ok(s) => s,
        Err(e) => {
            warn!("service listing failed: {}", e);
            Vec::new()
        }
    };
    if !q.host.is_empty() {
        for name in state.metrics.container_names(&q.host).await {
            if !services.contains(&name) {
                services.push(name);
            }
        }
    }
    (StatusCode::OK, Json(services)).into_response()
}

// -- processes / firewall / connections -------------------------------------

async fn handle_get_processes(State(state): State<AppState>, Query(q): Query<HostQuery>) -> Response {
    match state.events.latest_processes(&q.host).await {
        Ok(procs) => (StatusCode::OK, Json(procs)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn handle_get_firewall(State(state): State<AppState>, Query(q): Query<HostQuery>) -> Response {
    let rules = state.events.latest_firewall(&q.host).await.unwrap_or_default();
    (StatusCode::OK, Json(json!({ "rules": rules }))).into_response()
}

async fn handle_connection_summary(
    State(state): State<AppState>,
    Query(q): Query<HostQuery>,
) -> Response {
    match state.events.connection_summary(&q.host).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionDetailsQuery {
    #[serde(default)]
    host: String,
    port: u16,
}

async fn handle_connection_details(
    State(state): State<AppState>,
    Query(q): Query<ConnectionDetailsQuery>,
) -> Response {
    match state.events.connection_details(&q.host, q.port).await {
        Ok(details) => (StatusCode::OK, Json(details)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

// -- IP intelligence --------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IpDetailsQuery {
    #[serde(default)]
    agent_id: String,
}

async fn handle_ip_details(
    State(state): State<AppState>,
    Path(ip): Path<String>,
    Query(q): Query<IpDetailsQuery>,
) -> Response {
    let geo = state.geoip.lookup(&ip);
    let blocked = match state.events.is_ip_blocked(&ip, &q.agent_id).await {
        Ok(b) => b,
        Err(e) => return internal_error(e.to_string()),
    };
    let ssh_attempts = state
        .events
        .count_ssh_events(&ip, &q.agent_id)
        .await
        .unwrap_or(0);
    let auth_failures = state
        .events
        .count_auth_failures(&ip, &q.agent_id)
        .await
        .unwrap_or(0);
    // fetch one extra row to learn whether more pages exist
    let mut recent_logs = match state
        .events
        .logs_for_ip(&ip, &q.agent_id, IP_LOG_PAGE + 1, 0)
        .await
    {
        Ok(l) => l,
        Err(e) => {
            warn!("logs for ip failed: {}", e);
            Vec::new()
        }
    };
    let has_more_logs = recent_logs.len() > IP_LOG_PAGE;
    recent_logs.truncate(IP_LOG_PAGE);
    let activity = state
        .events
        .ip_activity(&ip, &q.agent_id)
        .await
        .unwrap_or_default();

    (
        StatusCode::OK,
        Json(json!({
            "ip": ip,
            "geo": geo,
            "blocked": blocked,
            "ssh_attempts": ssh_attempts,
            "auth_failures": auth_failures,
            "activity": activity,
            "recent_logs": recent_logs,
            "has_more_logs": has_more_logs,
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct BlockPayload {
    ip: String,
    #[serde(default)]
    agent_id: String,
    #[serde(default)]
    reason: String,
}

/// The UI gets a queued response immediately; the true outcome surfaces in
/// the command's ack row.
async fn handle_block_ip(State(state): State<AppState>, Json(p): Json<BlockPayload>) -> Response {
    if p.agent_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "agent_id is required for blocking" })),
        )
            .into_response();
    }
    match state.events.block_ip(&p.ip, &p.agent_id, &p.reason).await {
        Ok(command_id) => (
            StatusCode::OK,
            Json(json!({ "status": "queued", "command_id": command_id })),
        )
            .into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn handle_unblock_ip(State(state): State<AppState>, Json(p): Json<BlockPayload>) -> Response {
    if p.agent_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "agent_id is required for unblocking" })),
        )
            .into_response();
    }
    match state.events.unblock_ip(&p.ip, &p.agent_id).await {
        Ok(command_id) => (
            StatusCode::OK,
            Json(json!({ "status": "queued", "command_id": command_id })),
        )
            .into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

// -- settings ---------------------------------------------------------------

/// Secrets (password hash, API key, agent secrets, MFA secret) never leave
/// the server; only tunables are exposed.
async fn handle_get_settings(State(state): State<AppState>) -> Response {
    let c = state.config.get();
    (
        StatusCode::OK,
        Json(json!({
            "retention_days": c.retention_days,
            "ddos_threshold": c.ddos_threshold,
            "email_alerts": c.email_alerts,
            "alert_emails": c.alert_emails,
            "webhook_urls": c.webhook_urls,
            "smtp_server": c.smtp_server,
            "smtp_port": c.smtp_port,
            "smtp_user": c.smtp_user,
            "mfa_enabled": c.mfa_enabled,
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct SettingsPayload {
    retention_days: u32,
    ddos_threshold: f64,
    email_alerts: bool,
    #[serde(default)]
    alert_emails: Vec<String>,
    #[serde(default)]
    webhook_urls: Vec<String>,
    #[serde(default)]
    smtp_server: String,
    #[serde(default)]
    smtp_port: u16,
    #[serde(default)]
    smtp_user: String,
    #[serde(default)]
    smtp_password: String,
}

async fn handle_save_settings(
    State(state): State<AppState>,
    Json(p): Json<SettingsPayload>,
) -> Response {
    let result = state.config.update(|c| {
        c.retention_days = p.retention_days;
        c.ddos_threshold = p.ddos_threshold;
        c.email_alerts = p.email_alerts;
        c.alert_emails = p.alert_emails.clone();
        c.webhook_urls = p.webhook_urls.clone();
        c.smtp_server = p.smtp_server.clone();
        c.smtp_port = p.smtp_port;
        c.smtp_user = p.smtp_user.clone();
        c.smtp_password = p.smtp_password.clone();
    });
    match result {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

// -- alert rules & channels -------------------------------------------------

async fn handle_get_alert_rules(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.config.get().alert_rules)).into_response()
}

async fn handle_create_alert_rule(
    State(state): State<AppState>,
    Json(mut rule): Json<AlertRule>,
) -> Response {
    if rule.id.is_empty() {
        rule.id = format!("rule_{}", uuid::Uuid::new_v4().simple());
    }
    rule.enabled = true;
    let saved = rule.clone();
    match state.config.update(|c| c.alert_rules.push(rule)) {
        Ok(()) => (StatusCode::OK, Json(saved)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn handle_update_alert_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<AlertRule>,
) -> Response {
    let mut found = false;
    let result = state.config.update(|c| {
        for rule in c.alert_rules.iter_mut() {
            if rule.id == id {
                rule.name = update.name.clone();
                rule.metric = update.metric.clone();
                rule.host = update.host.clone();
                rule.operator = update.operator;
                rule.threshold = update.threshold;
                rule.channels = update.channels.clone();
                found = true;
                break;
            }
        }
    });
    match result {
        Ok(()) if found => StatusCode::OK.into_response(),
        Ok(()) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn handle_toggle_alert_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let mut found = false;
    let result = state.config.update(|c| {
        for rule in c.alert_rules.iter_mut() {
            if rule.id == id {
                rule.enabled = !rule.enabled;
                found = true;
                break;
            }
        }
    });
    match result {
        Ok(()) if found => StatusCode::OK.into_response(),
        Ok(()) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn handle_delete_alert_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.config.update(|c| c.alert_rules.retain(|r| r.id != id)) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn handle_get_channels(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.config.get().notification_channels)).into_response()
}

async fn handle_create_channel(
    State(state): State<AppState>,
    Json(mut channel): Json<NotificationChannel>,
) -> Response {
    if channel.id.is_empty() {
        channel.id = format!("chan_{}", uuid::Uuid::new_v4().simple());
    }
    let saved = channel.clone();
    match state
        .config
        .update(|c| c.notification_channels.push(channel))
    {
        Ok(()) => (StatusCode::OK, Json(saved)).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn handle_delete_channel(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state
        .config
        .update(|c| c.notification_channels.retain(|ch| ch.id != id))
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct SilencePayload {
    rule_id: String,
    #[serde(default)]
    host: String,
    /// e.g. "1h", "30m"
    duration: String,
}

async fn handle_silence(State(state): State<AppState>, Json(p): Json<SilencePayload>) -> Response {
    let Some(secs) = parse_silence_duration(&p.duration) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Invalid duration format (e.g., 1h, 30m)" })),
        )
            .into_response();
    };
    let host = if p.host.trim().is_empty() {
        "*".to_string()
    } else {
        p.host.trim().to_string()
    };
    let expiry = Utc::now() + chrono::Duration::seconds(secs);
    let mut found = false;
    let result = state.config.update(|c| {
        for rule in c.alert_rules.iter_mut() {
            if rule.id == p.rule_id {
                rule.silenced.insert(host.clone(), expiry);
                found = true;
                break;
            }
        }
    });
    match result {
        Ok(()) if found => StatusCode::OK.into_response(),
        Ok(()) => (StatusCode::NOT_FOUND, Json(json!({ "error": "Rule not found" })))
            .into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

fn parse_silence_duration(s: &str) -> Option<i64> {
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

#[derive(Debug, Deserialize)]
struct UnsilencePayload {
    rule_id: String,
    #[serde(default)]
    host: String,
}

async fn handle_unsilence(
    State(state): State<AppState>,
    Json(p): Json<UnsilencePayload>,
) -> Response {
    let result = state.config.update(|c| {
        for rule in c.alert_rules.iter_mut() {
            if rule.id == p.rule_id {
                rule.silenced.remove(&p.host);
                break;
            }
        }
    });
    match result {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

// -- MFA --------------------------------------------------------------------

async fn handle_mfa_setup() -> Response {
    match mfa::generate("admin@fleetwatch") {
        Ok((secret, url)) => {
            (StatusCode::OK, Json(json!({ "secret": secret, "url": url }))).into_response()
        }
        Err(e) => internal_error(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct MfaEnablePayload {
    code: String,
    secret: String,
}

async fn handle_mfa_enable(
    State(state): State<AppState>,
    Json(p): Json<MfaEnablePayload>,
) -> Response {
    if !mfa::validate(&p.code, &p.secret) {
        return (StatusCode::FORBIDDEN, Json(json!({ "error": "Invalid Code" }))).into_response();
    }
    let result = state.config.update(|c| {
        c.mfa_enabled = true;
        c.mfa_secret = p.secret.clone();
    });
    match result {
        Ok(()) => (StatusCode::OK, Json(json!({ "message": "MFA Enabled" }))).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

async fn handle_mfa_disable(State(state): State<AppState>) -> Response {
    let result = state.config.update(|c| {
        c.mfa_enabled = false;
        c.mfa_secret.clear();
    });
    match result {
        Ok(()) => (StatusCode::OK, Json(json!({ "message": "MFA Disabled" }))).into_response(),
        Err(e) => internal_error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_time_accepts_three_formats() {
        assert!(parse_search_time("2026-07-01T10:00:00Z").is_some());
        assert!(parse_search_time("2026-07-01").is_some());
        assert!(parse_search_time("2026-07-01 10:30").is_some());
        assert!(parse_search_time("").is_none());
        assert!(parse_search_time("yesterday").is_none());
    }

    #[test]
    fn silence_duration_parses_units() {
        assert_eq!(parse_silence_duration("1h"), Some(3600));
        assert_eq!(parse_silence_duration("30m"), Some(1800));
        assert_eq!(parse_silence_duration("2d"), Some(172_800));
        assert_eq!(parse_silence_duration("soon"), None);
        assert_eq!(parse_silence_duration("0m"), None);
    }
}
