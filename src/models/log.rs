// Log line model and level heuristic

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Infer a level from raw line content by case-insensitive substring match.
    pub fn classify(line: &str) -> Self {
        let lower = line.to_lowercase();
        if lower.contains("error")
            || lower.contains("fail")
            || lower.contains("critical")
            || lower.contains("exception")
            || lower.contains("panic")
        {
            return LogLevel::Error;
        }
        if lower.contains("warn") || lower.contains("alert") {
            return LogLevel::Warn;
        }
        if lower.contains("debug") || lower.contains("trace") {
            return LogLevel::Debug;
        }
        LogLevel::Info
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// One normalized log record. Docker-origin lines use the virtual scheme
/// `docker://<short-id>` as `source_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub source_path: String,
    pub service: String,
    #[serde(default)]
    pub host: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_error_keywords() {
        assert_eq!(LogLevel::classify("Connection FAILED: refused"), LogLevel::Error);
        assert_eq!(LogLevel::classify("unhandled exception in worker"), LogLevel::Error);
        assert_eq!(LogLevel::classify("kernel PANIC"), LogLevel::Error);
        assert_eq!(LogLevel::classify("critical section breached"), LogLevel::Error);
    }

    #[test]
    fn classify_warn_and_debug() {
        assert_eq!(LogLevel::classify("WARNING: disk almost full"), LogLevel::Warn);
        assert_eq!(LogLevel::classify("raid alert raised"), LogLevel::Warn);
        assert_eq!(LogLevel::classify("DEBUG entering loop"), LogLevel::Debug);
        assert_eq!(LogLevel::classify("trace id=42"), LogLevel::Debug);
    }

    #[test]
    fn classify_defaults_to_info() {
        assert_eq!(LogLevel::classify("started on port 8080"), LogLevel::Info);
    }

    #[test]
    fn error_wins_over_warn() {
        // "error" and "warn" both present: the error branch is checked first
        assert_eq!(LogLevel::classify("warn: error while retrying"), LogLevel::Error);
    }
}
