// Log source discovery: priority system logs, /proc fd walk, path scans

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::config::{LogMode, LogStrategy};

const PRIORITY_LOGS: &[&str] = &[
    "/var/log/syslog",
    "/var/log/auth.log",
    "/var/log/kern.log",
    "/var/log/dpkg.log",
];

const SCAN_ROOTS: &[&str] = &["/var/log", "/opt", "/home"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLog {
    pub path: PathBuf,
    pub service: String,
}

/// Infer a service name from a path (used both for auto-discovered and
/// manually selected logs).
pub fn service_for_path(path: &str) -> String {
    let lower = path.to_lowercase();
    for (needle, service) in [
        ("apache", "apache"),
        ("httpd", "apache"),
        ("nginx", "nginx"),
        ("caddy", "caddy"),
        ("traefik", "traefik"),
        ("pm2", "pm2"),
        ("mysql", "mysql"),
        ("redis", "redis"),
        ("mongod", "mongodb"),
        ("postgres", "postgresql"),
        ("auth.log", "auth"),
        ("syslog", "system"),
        ("kern.log", "system"),
    ] {
        if lower.contains(needle) {
            return service.to_string();
        }
    }
    "agent".to_string()
}

fn can_read(path: &Path) -> bool {
    fs::File::open(path).is_ok()
}

/// Resolve the set of logs to tail for the configured strategy, deduped by
/// canonicalized path so symlinked directories do not produce double tails.
pub fn discover_logs(strategy: &LogStrategy) -> Vec<DiscoveredLog> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    match strategy.mode {
        LogMode::None => return Vec::new(),
        LogMode::Selected => {
            candidates.extend(strategy.selected_logs.iter().map(PathBuf::from));
        }
        LogMode::All => {
            for p in PRIORITY_LOGS {
                candidates.push(PathBuf::from(p));
            }
            candidates.extend(scan_proc_for_open_logs());
            for root in SCAN_ROOTS {
                scan_directory(Path::new(root), 0, &mut candidates);
            }
            // manual selections are always included on top of auto-discovery
            candidates.extend(strategy.selected_logs.iter().map(PathBuf::from));
        }
    }

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut out = Vec::new();
    for path in candidates {
        if !can_read(&path) {
            continue;
        }
        let canonical = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if seen.insert(canonical) {
            let service = service_for_path(&path.to_string_lossy());
            out.push(DiscoveredLog { path, service });
        }
    }
    out
}

/// Walk /proc/[pid]/fd symlinks for open .log files.
fn scan_proc_for_open_logs() -> Vec<PathBuf> {
    let mut results = Vec::new();
    let Ok(entries) = fs::read_dir("/proc") else {
        return results;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().filter(|s| s.chars().all(|c| c.is_ascii_digit())) else {
            continue;
        };
        let fd_dir = format!("/proc/{}/fd", pid);
        let Ok(fds) = fs::read_dir(&fd_dir) else {
            continue;
        };
        for fd in fds.flatten() {
            let Ok(target) = fs::read_link(fd.path()) else {
                continue;
            };
            let target_str = target.to_string_lossy();
            if !(target_str.ends_with(".log") || target_str.contains("/log/")) {
                continue;
            }
            if target_str.starts_with("/dev")
                || target_str.starts_with("socket:")
                || target_str.starts_with("pipe:")
            {
                continue;
            }
            results.push(target);
        }
    }
    results
}

const MAX_SCAN_DEPTH: usize = 4;

fn scan_directory(root: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if file_type.is_dir() {
            if name.starts_with('.') || name == "node_modules" {
                continue;
            }
            scan_directory(&path, depth + 1, out);
        } else if file_type.is_file() && name.ends_with(".log") {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_inference_covers_known_daemons() {
        assert_eq!(service_for_path("/var/log/nginx/access.log"), "nginx");
        assert_eq!(service_for_path("/var/log/httpd/error_log.log"), "apache");
        assert_eq!(service_for_path("/var/log/postgresql/postgresql.log"), "postgresql");
        assert_eq!(service_for_path("/var/log/auth.log"), "auth");
        assert_eq!(service_for_path("/opt/myapp/out.log"), "agent");
    }

    #[test]
    fn none_mode_discovers_nothing() {
        let strategy = LogStrategy {
            mode: LogMode::None,
            selected_logs: vec!["/etc/hostname".into()],
        };
        assert!(discover_logs(&strategy).is_empty());
    }

    #[test]
    fn selected_mode_dedups_symlinked_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let real = dir.path().join("app.log");
        std::fs::write(&real, "x\n").unwrap();
        let link = dir.path().join("alias.log");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&real, &link).unwrap();
        let strategy = LogStrategy {
            mode: LogMode::Selected,
            selected_logs: vec![
                real.to_string_lossy().into_owned(),
                link.to_string_lossy().into_owned(),
            ],
        };
        let found = discover_logs(&strategy);
        #[cfg(unix)]
        assert_eq!(found.len(), 1);
        #[cfg(not(unix))]
        assert_eq!(found.len(), 1);
    }
}
