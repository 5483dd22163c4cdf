// Agent config loading, defaults and round-trip tests

use fleetwatch::agent::config::{AgentConfig, LogMode};

const VALID_CONFIG: &str = r#"{
  "server_url": "https://monitor.example.com",
  "agent_id": "node-1",
  "agent_secret": "0123456789abcdef0123456789abcdef",
  "collectors": {
    "system": true,
    "docker": true,
    "kubernetes": false,
    "pm2": false,
    "nginx": true,
    "apache": false
  },
  "log_config": {
    "mode": "selected",
    "selected_logs": ["/var/log/nginx/access.log", "/var/log/syslog"]
  }
}"#;

#[test]
fn loads_full_config() {
    let cfg = AgentConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(cfg.server_url, "https://monitor.example.com");
    assert_eq!(cfg.agent_id, "node-1");
    assert_eq!(cfg.agent_secret.len(), 32);
    assert!(cfg.collectors.system);
    assert!(cfg.collectors.nginx);
    assert!(!cfg.collectors.kubernetes);
    assert_eq!(cfg.log_config.mode, LogMode::Selected);
    assert_eq!(cfg.log_config.selected_logs.len(), 2);
}

#[test]
fn minimal_config_gets_defaults() {
    let cfg = AgentConfig::load_from_str(r#"{"server_url": "http://localhost:8080"}"#).unwrap();
    assert_eq!(cfg.agent_id, "");
    assert_eq!(cfg.log_config.mode, LogMode::All);
    assert!(cfg.log_config.selected_logs.is_empty());
    assert!(!cfg.collectors.system);
}

#[test]
fn collector_defaults_enable_base_set_on_first_run() {
    let mut cfg = AgentConfig::load_from_str(r#"{"server_url": "http://localhost:8080"}"#).unwrap();
    cfg.apply_collector_defaults();
    assert!(cfg.collectors.system);
    assert!(cfg.collectors.docker);
    assert!(!cfg.collectors.pm2);
    assert_eq!(cfg.log_config.mode, LogMode::All);
}

#[test]
fn explicit_collectors_are_not_overridden() {
    let mut cfg = AgentConfig::load_from_str(
        r#"{"server_url": "x", "collectors": {"system": false, "docker": false,
            "kubernetes": true, "pm2": false, "nginx": false, "apache": false}}"#,
    )
    .unwrap();
    cfg.apply_collector_defaults();
    // kubernetes=true means the section was configured; leave it alone
    assert!(!cfg.collectors.system);
    assert!(cfg.collectors.kubernetes);
}

#[test]
fn save_and_reload_round_trips() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("agent-config.json");
    let cfg = AgentConfig::load_from_str(VALID_CONFIG).unwrap();
    cfg.save(&path).unwrap();
    let reloaded = AgentConfig::load(&path).unwrap();
    assert_eq!(reloaded.server_url, cfg.server_url);
    assert_eq!(reloaded.agent_secret, cfg.agent_secret);
    assert_eq!(reloaded.log_config.mode, cfg.log_config.mode);
}

#[test]
fn invalid_json_is_rejected() {
    assert!(AgentConfig::load_from_str("not json {{{").is_err());
}
