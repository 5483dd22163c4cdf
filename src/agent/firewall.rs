// iptables/ufw: rules blob, blocked-IP parsing, block/unblock execution

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::warn;

use crate::models::CommandAction;

const EXEC_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a command with a bounded execution time, returning combined
/// stdout+stderr. No retries; the next tick is the retry.
async fn run(program: &str, args: &[&str]) -> anyhow::Result<(bool, String)> {
    let output = tokio::time::timeout(
        EXEC_TIMEOUT,
        tokio::process::Command::new(program).args(args).output(),
    )
    .await
    .with_context(|| format!("{} timed out", program))??;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok((output.status.success(), text))
}

/// Firewall rules blob for ingestion: UFW when active, else iptables.
pub async fn collect_rules() -> String {
    if let Ok((true, out)) = run("ufw", &["status", "verbose"]).await
        && !out.contains("Status: inactive")
    {
        return out;
    }
    if let Ok((true, out)) = run("iptables", &["-L", "-n"]).await {
        return out;
    }
    "Firewall info unavailable".to_string()
}

/// Source IPs of every DROP/REJECT rule across all chains of an
/// iptables-save dump (fail2ban chains included), CIDR masks stripped,
/// 0.0.0.0 and loopback excluded, deduplicated in order.
pub fn blocked_ips_from_save(save_output: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut blocked = Vec::new();
    for line in save_output.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with("-A ") {
            continue;
        }
        if !trimmed.contains("-j DROP") && !trimmed.contains("-j REJECT") {
            continue;
        }
        let Some(ip) = source_ip_of(trimmed) else {
            continue;
        };
        if ip == "0.0.0.0" || ip.starts_with("127.") {
            continue;
        }
        if seen.insert(ip.clone()) {
            blocked.push(ip);
        }
    }
    blocked
}

/// The `-s` operand with any CIDR mask stripped.
fn source_ip_of(rule: &str) -> Option<String> {
    let fields: Vec<&str> = rule.split_whitespace().collect();
    let pos = fields.iter().position(|f| *f == "-s")?;
    let raw = fields.get(pos + 1)?;
    let ip = raw.split('/').next().unwrap_or(raw);
    Some(ip.to_string())
}

/// Rewrite every matching `-A` DROP/REJECT rule for `ip` into its `-D`
/// delete argument vector, preserving all trailing args (e.g.
/// `--reject-with icmp-port-unreachable`).
pub fn delete_rules_for_ip(save_output: &str, ip: &str) -> Vec<Vec<String>> {
    let mut deletes = Vec::new();
    for line in save_output.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with("-A ") {
            continue;
        }
        if !trimmed.contains("-j DROP") && !trimmed.contains("-j REJECT") {
            continue;
        }
        if source_ip_of(trimmed).as_deref() != Some(ip) {
            continue;
        }
        let delete: Vec<String> = std::iter::once("-D".to_string())
            .chain(
                trimmed
                    .split_whitespace()
                    .skip(1) // drop the leading -A
                    .map(str::to_string),
            )
            .collect();
        deletes.push(delete);
    }
    deletes
}

pub async fn collect_blocked_ips() -> anyhow::Result<Vec<String>> {
    let (ok, out) = run("iptables-save", &[]).await?;
    if !ok {
        bail!("iptables-save failed: {}", out.trim());
    }
    Ok(blocked_ips_from_save(&out))
}

/// Execute a remediation verb. Success output for unblock is
/// "Removed N rule(s) for <ip>"; zero matches with no delete error is the
/// explicit failure "no matching iptables rules found for IP <ip>".
pub async fn execute_command(action: CommandAction, ip: &str) -> anyhow::Result<String> {
    match action {
        CommandAction::BlockIp => {
            let (ok, out) = run("iptables", &["-I", "INPUT", "-s", ip, "-j", "DROP"]).await?;
            if !ok {
                bail!("iptables block failed: {}", out.trim());
            }
            Ok(out)
        }
        CommandAction::UnblockIp => {
            let (ok, save) = run("iptables-save", &[]).await?;
            if !ok {
                bail!("iptables-save failed: {}", save.trim());
            }
            let deletes = delete_rules_for_ip(&save, ip);
            let mut removed = 0usize;
            let mut last_err: Option<anyhow::Error> = None;
            for args in &deletes {
                let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                match run("iptables", &arg_refs).await {
                    Ok((true, _)) => removed += 1,
                    Ok((false, out)) => {
                        warn!("iptables delete failed: {}", out.trim());
                        last_err = Some(anyhow::anyhow!(
                            "iptables delete failed for rule '{}': {}",
                            args.join(" "),
                            out.trim()
                        ));
                    }
                    Err(e) => last_err = Some(e),
                }
            }
            if removed == 0 {
                if let Some(e) = last_err {
                    return Err(e);
                }
                bail!("no matching iptables rules found for IP {}", ip);
            }
            Ok(format!("Removed {} rule(s) for {}", removed, ip))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAVE: &str = "\
# Generated by iptables-save
*filter
:INPUT ACCEPT [0:0]
:f2b-sshd - [0:0]
-A INPUT -s 1.2.3.4/32 -j DROP
-A INPUT -s 178.185.136.57/32 -j DROP
-A INPUT -s 0.0.0.0/0 -j ACCEPT
-A INPUT -s 127.0.0.1/32 -j DROP
-A f2b-sshd -s 1.2.3.4/32 -j REJECT --reject-with icmp-port-unreachable
-A f2b-sshd -s 45.164.39.253/32 -j REJECT --reject-with icmp-port-unreachable
-A FORWARD -j ACCEPT
COMMIT";

    #[test]
    fn blocked_ips_cover_all_chains_and_dedup() {
        let ips = blocked_ips_from_save(SAVE);
        assert_eq!(ips, vec!["1.2.3.4", "178.185.136.57", "45.164.39.253"]);
    }

    #[test]
    fn blocked_ips_exclude_zero_and_loopback() {
        let ips = blocked_ips_from_save(SAVE);
        assert!(!ips.iter().any(|ip| ip == "0.0.0.0"));
        assert!(!ips.iter().any(|ip| ip.starts_with("127.")));
    }

    #[test]
    fn delete_rules_rewrite_preserves_trailing_args() {
        let deletes = delete_rules_for_ip(SAVE, "1.2.3.4");
        assert_eq!(deletes.len(), 2);
        assert_eq!(
            deletes[0],
            vec!["-D", "INPUT", "-s", "1.2.3.4/32", "-j", "DROP"]
        );
        assert_eq!(
            deletes[1],
            vec![
                "-D",
                "f2b-sshd",
                "-s",
                "1.2.3.4/32",
                "-j",
                "REJECT",
                "--reject-with",
                "icmp-port-unreachable"
            ]
        );
    }

    #[test]
    fn delete_rules_require_exact_source_match() {
        // 1.2.3.4 must not match 41.2.3.45 or partial substrings
        let save = "-A INPUT -s 41.2.3.45/32 -j DROP\n-A INPUT -s 1.2.3.40/32 -j DROP";
        assert!(delete_rules_for_ip(save, "1.2.3.4").is_empty());
    }

    #[test]
    fn delete_rules_ignore_accept_targets() {
        let save = "-A INPUT -s 9.9.9.9/32 -j ACCEPT";
        assert!(delete_rules_for_ip(save, "9.9.9.9").is_empty());
    }

    #[tokio::test]
    async fn unblock_with_no_matching_rules_is_explicit_failure() {
        // no iptables rules exist for this address in any realistic test
        // environment; iptables-save itself may also be missing, and both
        // paths must surface an error rather than a zero-removal success
        let err = execute_command(CommandAction::UnblockIp, "203.0.113.77")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(
            msg.contains("no matching iptables rules found for IP 203.0.113.77")
                || msg.contains("iptables-save"),
            "unexpected error: {msg}"
        );
    }
}
