// Alert evaluation: rule matching, silences, cooldown, channel dispatch

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::models::{AlertRule, ChannelKind, NotificationChannel};
use crate::server::config_store::ConfigStore;
use crate::server::event_store::{AlertRow, EventStore};

/// Minimum wall-clock gap between two triggers of the same (rule, host).
pub const ALERT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct TriggeredAlert {
    pub rule: AlertRule,
    pub value: f64,
    pub message: String,
}

/// Pure rule-matching core: host filter, silence, threshold comparison and
/// the in-process cooldown map. No IO.
pub struct RulePlanner {
    config: Arc<ConfigStore>,
    /// In-process only: a restart resets cooldowns, favoring a duplicate
    /// alert over silence after recovery.
    cooldowns: Mutex<HashMap<(String, String), Instant>>,
}

impl RulePlanner {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Decide which rules fire right now; updates cooldown state for every
    /// returned alert.
    pub fn plan(
        &self,
        host: &str,
        metrics: &HashMap<String, f64>,
        ip_info: &str,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Vec<TriggeredAlert> {
        let rules = self.config.get().alert_rules;
        let mut out = Vec::new();
        for rule in rules {
            if !rule.enabled || !rule.applies_to(host) || rule.is_silenced(host, wall) {
                continue;
            }
            let Some(&value) = metrics.get(&rule.metric) else {
                continue;
            };
            if !rule.operator.matches(value, rule.threshold) {
                continue;
            }
            if !self.passes_cooldown(&rule.id, host, now) {
                continue;
            }
            let message = format!(
                "[{}] {} ({}): {} = {:.2} {} threshold {:.2} at {}",
                rule.name,
                host,
                if ip_info.is_empty() { "Unknown IP" } else { ip_info },
                rule.metric,
                value,
                rule.operator.as_str(),
                rule.threshold,
                wall.format("%a, %d %b %Y %H:%M:%S GMT"),
            );
            out.push(TriggeredAlert {
                rule,
                value,
                message,
            });
        }
        out
    }

    /// True when the (rule, host) pair is outside its cooldown window; marks
    /// the trigger time when it is.
    fn passes_cooldown(&self, rule_id: &str, host: &str, now: Instant) -> bool {
        let mut map = self
            .cooldowns
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let key = (rule_id.to_string(), host.to_string());
        if let Some(last) = map.get(&key)
            && now.duration_since(*last) < ALERT_COOLDOWN
        {
            return false;
        }
        map.insert(key, now);
        true
    }
}

pub struct AlertEvaluator {
    config: Arc<ConfigStore>,
    events: Arc<EventStore>,
    planner: RulePlanner,
    http: reqwest::Client,
}

impl AlertEvaluator {
    pub fn new(config: Arc<ConfigStore>, events: Arc<EventStore>) -> Self {
        Self {
            planner: RulePlanner::new(config.clone()),
            config,
            events,
            http: reqwest::Client::new(),
        }
    }

    /// Runs synchronously inside the metrics-ingest path after the write.
    pub async fn evaluate(&self, host: &str, metrics: &HashMap<String, f64>, ip_info: &str) {
        let triggered = self
            .planner
            .plan(host, metrics, ip_info, Instant::now(), Utc::now());
        for alert in triggered {
            self.fire(host, &alert).await;
        }
    }

    /// Append the alert row and dispatch to every known channel. Dispatch
    /// errors are logged and swallowed so remaining rules still evaluate.
    async fn fire(&self, host: &str, alert: &TriggeredAlert) {
        info!("alert triggered: {}", alert.message);

        let severity = if alert.rule.metric == "ddos_status" {
            "CRITICAL"
        } else {
            "WARNING"
        };
        let row = AlertRow {
            ts: Utc::now(),
            host: host.to_string(),
            alert_type: alert.rule.metric.clone(),
            severity: severity.to_string(),
            message: alert.message.clone(),
            resolved: 0,
        };
        if let Err(e) = self.events.insert_alert(&row).await {
            warn!("failed to record alert: {}", e);
        }

        let channels = self.config.get().notification_channels;
        for id in &alert.rule.channels {
            let Some(channel) = channels.iter().find(|c| &c.id == id) else {
                continue; // unknown channel ids are silently skipped
            };
            match channel.kind {
                ChannelKind::Webhook => self.send_webhook(channel, &alert.message).await,
                ChannelKind::Email => self.send_email(channel, &alert.message).await,
            }
        }
    }

    /// Body carries both `content` (Discord) and `text` (Slack/Teams).
    async fn send_webhook(&self, channel: &NotificationChannel, message: &str) {
        let Some(url) = channel.config.get("url") else {
            warn!("webhook channel {} has no url", channel.id);
            return;
        };
        let body = serde_json::json!({ "content": message, "text": message });
        match self.http.post(url).json(&body).send().await {
            Ok(resp) if !resp.status().is_success() => {
                warn!("webhook {} returned {}", channel.id, resp.status());
            }
            Ok(_) => {}
            Err(e) => warn!("webhook {} failed: {}", channel.id, e),
        }
    }

    async fn send_email(&self, channel: &NotificationChannel, message: &str) {
        let cfg = self.config.get();
        if cfg.smtp_server.is_empty() {
            warn!("SMTP not configured, skipping email channel {}", channel.id);
            return;
        }
        let Some(to) = channel.config.get("to") else {
            warn!("email channel {} has no recipient", channel.id);
            return;
        };
        if let Err(e) = self
            .deliver_email(
                &cfg.smtp_server,
                cfg.smtp_port,
                &cfg.smtp_user,
                &cfg.smtp_password,
                to,
                message,
            )
            .await
        {
            warn!("email to {} failed: {}", to, e);
        }
    }

    async fn deliver_email(
        &self,
        server: &str,
        port: u16,
        user: &str,
        password: &str,
        to: &str,
        body: &str,
    ) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(user.parse()?)
            .to(to.parse()?)
            .subject("Fleetwatch Alert")
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;
        let mut mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)?
            .credentials(Credentials::new(user.to_string(), password.to_string()));
        if port != 0 {
            mailer = mailer.port(port);
        }
        mailer.build().send(email).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertOperator;

    fn fixture() -> (Arc<ConfigStore>, RulePlanner) {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("server-config.json")).unwrap());
        std::mem::forget(dir);
        let planner = RulePlanner::new(config.clone());
        (config, planner)
    }

    fn cpu_rule() -> AlertRule {
        AlertRule {
            id: "r1".into(),
            name: "cpu high".into(),
            enabled: true,
            metric: "cpu_percent".into(),
            host: "*".into(),
            operator: AlertOperator::Gt,
            threshold: 80.0,
            channels: vec![],
            silenced: HashMap::new(),
        }
    }

    fn metrics(cpu: f64) -> HashMap<String, f64> {
        HashMap::from([("cpu_percent".to_string(), cpu)])
    }

    #[test]
    fn triggers_once_then_cooldown_then_again() {
        let (config, planner) = fixture();
        config.update(|c| c.alert_rules.push(cpu_rule())).unwrap();

        let t0 = Instant::now();
        let wall = Utc::now();
        let first = planner.plan("node-1", &metrics(85.0), "10.0.0.5", t0, wall);
        assert_eq!(first.len(), 1);
        assert!(first[0].message.contains("cpu high"));
        assert!(first[0].message.contains("node-1"));
        assert!(first[0].message.contains("10.0.0.5"));
        assert!(first[0].message.contains("cpu_percent = 85.00 > threshold 80.00"));

        // 30 s later: suppressed
        let suppressed =
            planner.plan("node-1", &metrics(90.0), "", t0 + Duration::from_secs(30), wall);
        assert!(suppressed.is_empty());

        // 61 s later: fires again
        let again = planner.plan("node-1", &metrics(90.0), "", t0 + Duration::from_secs(61), wall);
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn cooldown_is_per_host() {
        let (config, planner) = fixture();
        config.update(|c| c.alert_rules.push(cpu_rule())).unwrap();
        let t0 = Instant::now();
        let wall = Utc::now();
        assert_eq!(planner.plan("node-1", &metrics(99.0), "", t0, wall).len(), 1);
        // a different host is not cooled down by node-1's trigger
        assert_eq!(planner.plan("node-2", &metrics(99.0), "", t0, wall).len(), 1);
    }

    #[test]
    fn value_equal_to_threshold_does_not_trigger_gt() {
        let (config, planner) = fixture();
        config.update(|c| c.alert_rules.push(cpu_rule())).unwrap();
        let out = planner.plan("node-1", &metrics(80.0), "", Instant::now(), Utc::now());
        assert!(out.is_empty());
    }

    #[test]
    fn disabled_silenced_and_foreign_host_rules_are_skipped() {
        let (config, planner) = fixture();
        let wall = Utc::now();
        config
            .update(|c| {
                let mut disabled = cpu_rule();
                disabled.id = "disabled".into();
                disabled.enabled = false;
                let mut silenced = cpu_rule();
                silenced.id = "silenced".into();
                silenced
                    .silenced
                    .insert("node-1".into(), wall + chrono::Duration::hours(1));
                let mut other_host = cpu_rule();
                other_host.id = "other".into();
                other_host.host = "node-9".into();
                c.alert_rules.extend([disabled, silenced, other_host]);
            })
            .unwrap();
        let out = planner.plan("node-1", &metrics(95.0), "", Instant::now(), wall);
        assert!(out.is_empty());
    }

    #[test]
    fn star_silence_suppresses_every_host_until_expiry() {
        let (config, planner) = fixture();
        let wall = Utc::now();
        config
            .update(|c| {
                let mut rule = cpu_rule();
                rule.silenced
                    .insert("*".into(), wall + chrono::Duration::minutes(10));
                c.alert_rules.push(rule);
            })
            .unwrap();
        assert!(planner.plan("node-1", &metrics(95.0), "", Instant::now(), wall).is_empty());
        // exactly at expiry the trigger is allowed again
        let at_expiry = wall + chrono::Duration::minutes(10);
        assert_eq!(
            planner.plan("node-1", &metrics(95.0), "", Instant::now(), at_expiry).len(),
            1
        );
    }

    #[test]
    fn missing_metric_is_skipped() {
        let (config, planner) = fixture();
        config.update(|c| c.alert_rules.push(cpu_rule())).unwrap();
        let other = HashMap::from([("memory_usage".to_string(), 99.0)]);
        assert!(planner.plan("node-1", &other, "", Instant::now(), Utc::now()).is_empty());
    }
}
