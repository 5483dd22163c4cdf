// Agent enrollment/collector config persisted as agent-config.json

use std::path::Path;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "agent-config.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub system: bool,
    pub docker: bool,
    pub kubernetes: bool,
    pub pm2: bool,
    pub nginx: bool,
    pub apache: bool,
}

/// Log collection strategy: tail everything discovered, only the selected
/// paths, or nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    All,
    Selected,
    None,
}

impl Default for LogMode {
    fn default() -> Self {
        LogMode::All
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogStrategy {
    pub mode: LogMode,
    #[serde(default)]
    pub selected_logs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    pub server_url: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub agent_secret: String,
    #[serde(default)]
    pub mysql_user: String,
    #[serde(default)]
    pub mysql_password: String,
    #[serde(default)]
    pub postgres_user: String,
    #[serde(default)]
    pub postgres_password: String,
    #[serde(default)]
    pub clickhouse_user: String,
    #[serde(default)]
    pub clickhouse_password: String,
    #[serde(default)]
    pub collectors: CollectorConfig,
    #[serde(default)]
    pub log_config: LogStrategy,
}

impl AgentConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::load_from_str(&data)
    }

    /// Parse config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let cfg: AgentConfig = serde_json::from_str(s)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Legacy/first-run configs have no collector section; default to the
    /// base set so a bare enrollment still reports.
    pub fn apply_collector_defaults(&mut self) {
        if self.collectors == CollectorConfig::default() {
            self.collectors.system = true;
            self.collectors.docker = true;
            self.log_config.mode = LogMode::All;
        }
    }
}
