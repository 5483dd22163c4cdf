// Alert rules and notification channels (persisted in server config)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertOperator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl AlertOperator {
    /// Strict comparison: `>` with value exactly equal to the threshold does
    /// not trigger.
    pub fn matches(&self, value: f64, threshold: f64) -> bool {
        match self {
            AlertOperator::Gt => value > threshold,
            AlertOperator::Lt => value < threshold,
            AlertOperator::Ge => value >= threshold,
            AlertOperator::Le => value <= threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertOperator::Gt => ">",
            AlertOperator::Lt => "<",
            AlertOperator::Ge => ">=",
            AlertOperator::Le => "<=",
        }
    }
}

/// A threshold rule over one metric. `host` is `*` (or empty) for a
/// catch-all, otherwise an exact host id. `silenced` maps host → expiry; an
/// entry under `*` silences every host until it expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    pub metric: String,
    #[serde(default)]
    pub host: String,
    pub operator: AlertOperator,
    pub threshold: f64,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub silenced: HashMap<String, DateTime<Utc>>,
}

impl AlertRule {
    /// Host filter: empty and `*` accept every host.
    pub fn applies_to(&self, host: &str) -> bool {
        self.host.is_empty() || self.host == "*" || self.host == host
    }

    /// A silence entry suppresses while its expiry is strictly in the
    /// future; a trigger exactly at the expiry instant is allowed.
    pub fn is_silenced(&self, host: &str, now: DateTime<Utc>) -> bool {
        for key in [host, "*"] {
            if let Some(expiry) = self.silenced.get(key)
                && *expiry > now
            {
                return true;
            }
        }
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rule(host: &str) -> AlertRule {
        AlertRule {
            id: "r1".into(),
            name: "cpu high".into(),
            enabled: true,
            metric: "cpu_percent".into(),
            host: host.into(),
            operator: AlertOperator::Gt,
            threshold: 80.0,
            channels: vec![],
            silenced: HashMap::new(),
        }
    }

    #[test]
    fn operator_gt_is_strict_at_threshold() {
        assert!(!AlertOperator::Gt.matches(80.0, 80.0));
        assert!(AlertOperator::Gt.matches(80.01, 80.0));
        assert!(AlertOperator::Ge.matches(80.0, 80.0));
        assert!(AlertOperator::Le.matches(80.0, 80.0));
        assert!(!AlertOperator::Lt.matches(80.0, 80.0));
    }

    #[test]
    fn operator_round_trips_through_serde() {
        let op: AlertOperator = serde_json::from_str("\">=\"").unwrap();
        assert_eq!(op, AlertOperator::Ge);
        assert_eq!(serde_json::to_string(&AlertOperator::Lt).unwrap(), "\"<\"");
    }

    #[test]
    fn host_pattern_star_matches_all() {
        assert!(rule("*").applies_to("node-1"));
        assert!(rule("").applies_to("node-1"));
        assert!(rule("node-1").applies_to("node-1"));
        assert!(!rule("node-1").applies_to("node-2"));
    }

    #[test]
    fn silence_expiry_boundary_allows_trigger_at_expiry() {
        let now = Utc::now();
        let mut r = rule("*");
        r.silenced.insert("node-1".into(), now);
        // expiry exactly now: not silenced
        assert!(!r.is_silenced("node-1", now));
        r.silenced.insert("node-1".into(), now + Duration::seconds(1));
        assert!(r.is_silenced("node-1", now));
    }

    #[test]
    fn star_silence_covers_every_host() {
        let now = Utc::now();
        let mut r = rule("*");
        r.silenced.insert("*".into(), now + Duration::hours(1));
        assert!(r.is_silenced("node-1", now));
        assert!(r.is_silenced("node-2", now));
    }
}
