// Remediation command queue and blocked-IP models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    BlockIp,
    UnblockIp,
}

impl CommandAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandAction::BlockIp => "block_ip",
            CommandAction::UnblockIp => "unblock_ip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "block_ip" => Some(CommandAction::BlockIp),
            "unblock_ip" => Some(CommandAction::UnblockIp),
            _ => None,
        }
    }
}

/// A command is terminal once its status leaves `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommandStatus::Pending),
            "completed" => Some(CommandStatus::Completed),
            "failed" => Some(CommandStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommand {
    pub id: String,
    pub agent_id: String,
    pub action: CommandAction,
    pub target_ip: String,
    pub status: CommandStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
}

/// Keyed (agent_id, ip); last write wins, deletion is a tombstone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedIp {
    pub ip: String,
    pub agent_id: String,
    pub blocked_at: DateTime<Utc>,
    pub blocked_by: String,
    pub reason: String,
}
