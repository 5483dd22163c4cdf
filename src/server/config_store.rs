// Persistent server config: RW-locked, JSON, atomic save

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{AlertRule, NotificationChannel};

pub const CONFIG_FILE: &str = "server-config.json";

fn default_retention_days() -> u32 {
    7
}

fn default_ddos_threshold() -> f64 {
    50.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// MB/s threshold used when the server re-evaluates ddos_status.
    #[serde(default = "default_ddos_threshold")]
    pub ddos_threshold: f64,
    #[serde(default)]
    pub email_alerts: bool,
    #[serde(default)]
    pub alert_emails: Vec<String>,
    #[serde(default)]
    pub webhook_urls: Vec<String>,
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default)]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default)]
    pub alert_rules: Vec<AlertRule>,
    #[serde(default)]
    pub notification_channels: Vec<NotificationChannel>,
    /// bcrypt hash; never plaintext after first boot.
    #[serde(default)]
    pub admin_password: String,
    #[serde(default)]
    pub system_api_key: String,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub mfa_secret: String,
    #[serde(default)]
    pub agent_secrets: HashMap<String, String>,
    #[serde(default)]
    pub ignored_hosts: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            ddos_threshold: default_ddos_threshold(),
            email_alerts: true,
            alert_emails: Vec::new(),
            webhook_urls: Vec::new(),
            smtp_server: String::new(),
            smtp_port: 0,
            smtp_user: String::new(),
            smtp_password: String::new(),
            alert_rules: Vec::new(),
            notification_channels: Vec::new(),
            admin_password: String::new(),
            system_api_key: String::new(),
            mfa_enabled: false,
            mfa_secret: String::new(),
            agent_secrets: HashMap::new(),
            ignored_hosts: Vec::new(),
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    config: RwLock<ServerConfig>,
}

impl ConfigStore {
    /// Load existing config or create the file with defaults.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ServerConfig::default(),
            Err(e) => return Err(e.into()),
        };
        let store = Self {
            path,
            config: RwLock::new(config),
        };
        store.persist()?;
        Ok(store)
    }

    pub fn get(&self) -> ServerConfig {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn save(&self, config: ServerConfig) -> anyhow::Result<()> {
        {
            let mut guard = self
                .config
                .write()
                .unwrap_or_else(|e| e.into_inner());
            *guard = config;
        }
        self.persist()
    }

    /// Mutate-and-save in one step under the write lock.
    pub fn update<F>(&self, mutate: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut ServerConfig),
    {
        {
            let mut guard = self
                .config
                .write()
                .unwrap_or_else(|e| e.into_inner());
            mutate(&mut guard);
        }
        self.persist()
    }

    /// Atomic replace: write a sibling temp file, then rename over the
    /// target so readers never observe a torn file. Mode 0644.
    fn persist(&self) -> anyhow::Result<()> {
        let data = {
            let guard = self
                .config
                .read()
                .unwrap_or_else(|e| e.into_inner());
            serde_json::to_string_pretty(&*guard)?
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644)) {
                warn!("could not set config permissions: {}", e);
            }
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_defaults_and_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let store = ConfigStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.get().retention_days, 7);
        assert!((store.get().ddos_threshold - 50.0).abs() < f64::EPSILON);

        store
            .update(|c| {
                c.retention_days = 3;
                c.agent_secrets
                    .insert("node-1".into(), "s3cret".into());
            })
            .unwrap();

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.get().retention_days, 3);
        assert_eq!(
            reopened.get().agent_secrets.get("node-1").map(String::as_str),
            Some("s3cret")
        );
    }

    #[test]
    fn save_replaces_whole_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join(CONFIG_FILE)).unwrap();
        let mut cfg = store.get();
        cfg.ignored_hosts.push("dead-host".into());
        store.save(cfg).unwrap();
        assert_eq!(store.get().ignored_hosts, vec!["dead-host"]);
    }

    #[test]
    fn unknown_json_fields_do_not_break_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"retention_days": 5, "future_field": true}"#).unwrap();
        let store = ConfigStore::open(&path).unwrap();
        assert_eq!(store.get().retention_days, 5);
    }
}
