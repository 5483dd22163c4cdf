// Process sampling: top-50 by CPU, plus the async raw `top` lane

use std::sync::{Arc, RwLock};
use std::time::Duration;

use sysinfo::{ProcessesToUpdate, System, Users};
use tracing::debug;

use crate::models::ProcessInfo;

const TOP_N: usize = 50;
const CMDLINE_MAX: usize = 100;
const RAW_INTERVAL: Duration = Duration::from_millis(500);
const RAW_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ProcessCollector {
    sys: System,
    users: Users,
}

impl Default for ProcessCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessCollector {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            users: Users::new_with_refreshed_list(),
        }
    }

    /// Top 50 processes by CPU with cmdline truncated at 100 chars.
    pub fn collect(&mut self) -> Vec<ProcessInfo> {
        self.sys.refresh_processes(ProcessesToUpdate::All, true);
        let total_memory = self.sys.total_memory();

        let mut results: Vec<ProcessInfo> = self
            .sys
            .processes()
            .values()
            .map(|p| {
                let username = p
                    .user_id()
                    .and_then(|uid| self.users.get_user_by_id(uid))
                    .map(|u| u.name().to_string())
                    .unwrap_or_default();
                let mut cmdline = p
                    .cmd()
                    .iter()
                    .map(|c| c.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                if cmdline.len() > CMDLINE_MAX {
                    cmdline = truncate_chars(&cmdline, CMDLINE_MAX);
                }
                ProcessInfo {
                    pid: p.pid().as_u32() as i32,
                    name: p.name().to_string_lossy().into_owned(),
                    username,
                    cpu_percent: p.cpu_usage() as f64,
                    memory_percent: if total_memory > 0 {
                        (p.memory() as f64 / total_memory as f64) * 100.0
                    } else {
                        0.0
                    },
                    cmdline: cmdline.trim().to_string(),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.cpu_percent
                .partial_cmp(&a.cpu_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(TOP_N);
        results
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    let truncated: String = s.chars().take(max).collect();
    format!("{}...", truncated)
}

/// Single-slot cell holding the latest raw `top` output. The main tick only
/// ever reads the last written value, so it never blocks on the subprocess.
#[derive(Clone, Default)]
pub struct RawProcessCell(Arc<RwLock<String>>);

impl RawProcessCell {
    pub fn get(&self) -> String {
        self.0.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn set(&self, value: String) {
        if let Ok(mut slot) = self.0.write() {
            *slot = value;
        }
    }
}

async fn collect_raw() -> anyhow::Result<String> {
    let output = tokio::time::timeout(
        RAW_TIMEOUT,
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg("TERM=xterm top -b -n 1 -w 512 | head -n 20")
            .output(),
    )
    .await??;
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    if text.is_empty() {
        return Ok("No output from top command".to_string());
    }
    Ok(text)
}

/// Dedicated lane refreshing the raw cell as fast as `top` allows, with a
/// small pause between runs.
pub async fn run_raw_collector(cell: RawProcessCell) {
    loop {
        match collect_raw().await {
            Ok(raw) => cell.set(raw),
            Err(e) => {
                debug!("raw process collection failed: {}", e);
                cell.set(format!("Error collecting raw process data: {}", e));
            }
        }
        tokio::time::sleep(RAW_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_caps_at_top_50_sorted_by_cpu() {
        let mut col = ProcessCollector::new();
        let procs = col.collect();
        assert!(procs.len() <= TOP_N);
        for pair in procs.windows(2) {
            assert!(pair[0].cpu_percent >= pair[1].cpu_percent);
        }
        for p in &procs {
            assert!(p.cmdline.chars().count() <= CMDLINE_MAX + 3);
        }
    }

    #[test]
    fn raw_cell_is_empty_before_first_write() {
        let cell = RawProcessCell::default();
        assert_eq!(cell.get(), "");
        cell.set("top output".into());
        assert_eq!(cell.get(), "top output");
    }
}
