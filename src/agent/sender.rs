// Authenticated keep-alive HTTP client for ingestion, commands, enrollment

use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::json;

use crate::models::{
    AgentCommand, CommandStatus, ConnectionEntry, ContainerSnapshot, LogLine, ProcessInfo,
    SystemSnapshot,
};

const AGENT_SECRET_HEADER: &str = "X-Agent-Secret";
const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_IDLE_PER_HOST: usize = 100;

pub struct Sender {
    base_url: String,
    agent_secret: String,
    hostname: String,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub agent_id: String,
    pub secret: String,
}

impl Sender {
    /// `server_url` is the bare server origin; the `/api/v1` prefix is
    /// appended here.
    pub fn new(server_url: &str, agent_secret: &str, hostname: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Duration::from_secs(90))
            // transport TLS is assumed but not validated by default
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            base_url: format!("{}/api/v1", server_url.trim_end_matches('/')),
            agent_secret: agent_secret.to_string(),
            hostname: hostname.to_string(),
            client,
        })
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    async fn post(&self, endpoint: &str, body: &serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .header(AGENT_SECRET_HEADER, &self.agent_secret)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", endpoint))?;
        if !resp.status().is_success() {
            bail!("POST {} returned {}", endpoint, resp.status());
        }
        Ok(())
    }

    pub async fn send_metrics(
        &self,
        snapshot: &SystemSnapshot,
        containers: &[ContainerSnapshot],
        process_raw: &str,
    ) -> anyhow::Result<()> {
        let mut body = serde_json::to_value(snapshot)?;
        if let Some(map) = body.as_object_mut() {
            map.insert("containers".into(), serde_json::to_value(containers)?);
            map.insert("process_raw".into(), json!(process_raw));
        }
        self.post("/ingest/metrics", &body).await
    }

    pub async fn send_log(&self, line: &LogLine) -> anyhow::Result<()> {
        let service = if line.service.is_empty() {
            "agent"
        } else {
            &line.service
        };
        let body = json!({
            "source_path": line.source_path,
            "message": line.message,
            "timestamp": line.timestamp,
            "host": self.hostname,
            "service": service,
            "level": line.level,
        });
        self.post("/ingest/logs", &body).await
    }

    pub async fn send_processes(&self, processes: &[ProcessInfo]) -> anyhow::Result<()> {
        let body = json!({ "host": self.hostname, "processes": processes });
        self.post("/ingest/processes", &body).await
    }

    pub async fn send_firewall(&self, rules: &str) -> anyhow::Result<()> {
        let body = json!({ "host": self.hostname, "rules": rules });
        self.post("/ingest/firewall", &body).await
    }

    pub async fn send_connections(&self, connections: &[ConnectionEntry]) -> anyhow::Result<()> {
        let body = json!({ "host": self.hostname, "connections": connections });
        self.post("/ingest/connections", &body).await
    }

    pub async fn send_firewall_sync(&self, blocked_ips: &[String]) -> anyhow::Result<()> {
        let body = json!({ "host": self.hostname, "blocked_ips": blocked_ips });
        self.post("/ingest/firewall-sync", &body).await
    }

    pub async fn send_service_stats(
        &self,
        service: &str,
        stats: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let body = json!({ "host": self.hostname, "service": service, "stats": stats });
        self.post("/ingest/service-stats", &body).await
    }

    /// Poll pending commands assigned to this agent.
    pub async fn fetch_commands(&self) -> anyhow::Result<Vec<AgentCommand>> {
        #[derive(Deserialize)]
        struct CommandsResponse {
            commands: Vec<AgentCommand>,
        }
        let resp = self
            .client
            .get(format!(
                "{}/agent/commands?agent_id={}",
                self.base_url, self.hostname
            ))
            .header(AGENT_SECRET_HEADER, &self.agent_secret)
            .send()
            .await?;
        if !resp.status().is_success() {
            bail!("fetch commands returned {}", resp.status());
        }
        let body: CommandsResponse = resp.json().await?;
        Ok(body.commands)
    }

    /// Report command execution result back to the server.
    pub async fn ack_command(
        &self,
        id: &str,
        status: CommandStatus,
        output: &str,
    ) -> anyhow::Result<()> {
        let body = json!({ "id": id, "status": status, "output": output });
        self.post("/agent/commands/ack", &body).await
    }
}

/// Enrollment: trades the system API key (plus an MFA code when the server
/// demands one) for a per-agent shared secret.
pub async fn register(
    server_url: &str,
    api_key: &str,
    hostname: &str,
    mfa_code: Option<&str>,
) -> anyhow::Result<Registration> {
    let client = reqwest::Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()?;
    let mut body = json!({ "api_key": api_key, "hostname": hostname });
    if let Some(code) = mfa_code {
        body["mfa_code"] = json!(code);
    }
    let resp = client
        .post(format!(
            "{}/api/v1/agent/register",
            server_url.trim_end_matches('/')
        ))
        .json(&body)
        .send()
        .await?;
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!("MFA_REQUIRED");
    }
    if !status.is_success() {
        bail!("registration failed with status {}", status);
    }
    Ok(resp.json().await?)
}
