// TCP connection snapshots from /proc/net/tcp{,6} with pid/process resolution

use std::collections::HashMap;
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::Utc;

use crate::models::ConnectionEntry;

/// One parsed socket row before pid/process enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawConnection {
    pub local_ip: String,
    pub local_port: u16,
    pub remote_ip: String,
    pub remote_port: u16,
    pub status: &'static str,
    pub inode: u64,
}

pub struct ConnectionCollector {
    process_names: HashMap<i32, String>,
}

impl Default for ConnectionCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionCollector {
    pub fn new() -> Self {
        Self {
            process_names: HashMap::new(),
        }
    }

    /// One snapshot: every TCP socket with a shared timestamp. Returns an
    /// empty vec when /proc is unreadable.
    pub fn collect(&mut self) -> Vec<ConnectionEntry> {
        let mut raw = Vec::new();
        if let Ok(content) = fs::read_to_string("/proc/net/tcp") {
            raw.extend(content.lines().skip(1).filter_map(|l| parse_tcp_line(l, false)));
        }
        if let Ok(content) = fs::read_to_string("/proc/net/tcp6") {
            raw.extend(content.lines().skip(1).filter_map(|l| parse_tcp_line(l, true)));
        }
        if raw.is_empty() {
            return Vec::new();
        }

        let inode_to_pid = scan_socket_inodes();
        let now = Utc::now();
        raw.into_iter()
            .map(|c| {
                let pid = inode_to_pid.get(&c.inode).copied().unwrap_or(0);
                ConnectionEntry {
                    timestamp: now,
                    local_ip: c.local_ip,
                    local_port: c.local_port,
                    remote_ip: c.remote_ip,
                    remote_port: c.remote_port,
                    status: c.status.to_string(),
                    pid,
                    process_name: self.resolve_process_name(pid),
                }
            })
            .collect()
    }

    fn resolve_process_name(&mut self, pid: i32) -> String {
        if pid == 0 {
            return "kernel".to_string();
        }
        if let Some(name) = self.process_names.get(&pid) {
            return name.clone();
        }
        let name = fs::read_to_string(format!("/proc/{}/comm", pid))
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        if !name.is_empty() {
            self.process_names.insert(pid, name.clone());
        }
        name
    }
}

/// Map socket inode → owning pid by walking /proc/[pid]/fd symlinks.
fn scan_socket_inodes() -> HashMap<u64, i32> {
    let mut map = HashMap::new();
    let Ok(entries) = fs::read_dir("/proc") else {
        return map;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        let Ok(fds) = fs::read_dir(format!("/proc/{}/fd", pid)) else {
            continue;
        };
        for fd in fds.flatten() {
            let Ok(target) = fs::read_link(fd.path()) else {
                continue;
            };
            let target = target.to_string_lossy();
            if let Some(inode) = target
                .strip_prefix("socket:[")
                .and_then(|s| s.strip_suffix(']'))
                .and_then(|s| s.parse::<u64>().ok())
            {
                map.entry(inode).or_insert(pid);
            }
        }
    }
    map
}

pub(crate) fn tcp_state_name(code: u8) -> &'static str {
    match code {
        0x01 => "ESTABLISHED",
        0x02 => "SYN_SENT",
        0x03 => "SYN_RECV",
        0x04 => "FIN_WAIT1",
        0x05 => "FIN_WAIT2",
        0x06 => "TIME_WAIT",
        0x07 => "CLOSE",
        0x08 => "CLOSE_WAIT",
        0x09 => "LAST_ACK",
        0x0A => "LISTEN",
        0x0B => "CLOSING",
        _ => "UNKNOWN",
    }
}

/// Parse one /proc/net/tcp{,6} row:
/// `sl local_address rem_address st ... uid timeout inode`.
/// Addresses are hex, byte-order little-endian per 32-bit group.
pub(crate) fn parse_tcp_line(line: &str, v6: bool) -> Option<RawConnection> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 10 {
        return None;
    }
    let (local_ip, local_port) = parse_hex_addr(fields[1], v6)?;
    let (remote_ip, remote_port) = parse_hex_addr(fields[2], v6)?;
    let state = u8::from_str_radix(fields[3], 16).ok()?;
    let inode: u64 = fields[9].parse().ok()?;
    Some(RawConnection {
        local_ip,
        local_port,
        remote_ip,
        remote_port,
        status: tcp_state_name(state),
        inode,
    })
}

fn parse_hex_addr(field: &str, v6: bool) -> Option<(String, u16)> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let ip = if v6 {
        parse_ipv6_hex(addr_hex)?
    } else {
        parse_ipv4_hex(addr_hex)?
    };
    Some((ip, port))
}

fn parse_ipv4_hex(hex: &str) -> Option<String> {
    if hex.len() != 8 {
        return None;
    }
    let raw = u32::from_str_radix(hex, 16).ok()?;
    // kernel stores the address little-endian
    Some(Ipv4Addr::from(raw.swap_bytes()).to_string())
}

fn parse_ipv6_hex(hex: &str) -> Option<String> {
    if hex.len() != 32 {
        return None;
    }
    let mut octets = [0u8; 16];
    for group in 0..4 {
        let word = u32::from_str_radix(&hex[group * 8..(group + 1) * 8], 16).ok()?;
        octets[group * 4..(group + 1) * 4].copy_from_slice(&word.to_le_bytes());
    }
    Some(Ipv6Addr::from(octets).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ipv4_listen_row() {
        let line = "   0: 0100007F:0CEA 00000000:0000 0A 00000000:00000000 00:00000000 00000000   113        0 21558 1 0000000000000000 100 0 0 10 0";
        let c = parse_tcp_line(line, false).unwrap();
        assert_eq!(c.local_ip, "127.0.0.1");
        assert_eq!(c.local_port, 0x0CEA);
        assert_eq!(c.remote_ip, "0.0.0.0");
        assert_eq!(c.remote_port, 0);
        assert_eq!(c.status, "LISTEN");
        assert_eq!(c.inode, 21558);
    }

    #[test]
    fn parse_ipv4_established_row() {
        let line = "   4: 0F02000A:0016 0202000A:D2B4 01 00000000:00000000 02:000AC4C2 00000000     0        0 35411 4 0000000000000000 20 4 31 10 -1";
        let c = parse_tcp_line(line, false).unwrap();
        assert_eq!(c.local_ip, "10.0.2.15");
        assert_eq!(c.local_port, 22);
        assert_eq!(c.remote_ip, "10.0.2.2");
        assert_eq!(c.status, "ESTABLISHED");
    }

    #[test]
    fn parse_ipv6_loopback_row() {
        let line = "   0: 00000000000000000000000001000000:1F90 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 40001 1 0000000000000000 100 0 0 10 0";
        let c = parse_tcp_line(line, true).unwrap();
        assert_eq!(c.local_ip, "::1");
        assert_eq!(c.local_port, 8080);
        assert_eq!(c.status, "LISTEN");
    }

    #[test]
    fn malformed_rows_are_skipped() {
        assert!(parse_tcp_line("sl local rem", false).is_none());
        assert!(parse_tcp_line("", false).is_none());
    }

    #[test]
    fn unknown_state_maps_to_unknown() {
        assert_eq!(tcp_state_name(0xFF), "UNKNOWN");
    }
}
