// Firewall parsing contract: sync collection and unblock rule rewriting

use fleetwatch::agent::firewall::{blocked_ips_from_save, delete_rules_for_ip};

// A realistic dump: manual INPUT block plus a fail2ban chain, as produced by
// iptables-save on a host running sshd protection.
const SAVE: &str = "\
# Generated by iptables-save v1.8.7
*filter
:INPUT ACCEPT [1024:123456]
:FORWARD ACCEPT [0:0]
:OUTPUT ACCEPT [2048:654321]
:f2b-sshd - [0:0]
-A INPUT -p tcp -m multiport --dports 22 -j f2b-sshd
-A INPUT -s 1.2.3.4/32 -j DROP
-A f2b-sshd -s 1.2.3.4/32 -j REJECT --reject-with icmp-port-unreachable
-A f2b-sshd -s 134.209.93.41/32 -j REJECT --reject-with icmp-port-unreachable
-A f2b-sshd -j RETURN
COMMIT
";

#[test]
fn sync_collects_unique_ips_across_all_chains() {
    let ips = blocked_ips_from_save(SAVE);
    assert_eq!(ips, vec!["1.2.3.4", "134.209.93.41"]);
}

#[test]
fn unblock_rewrites_both_chains_preserving_reject_args() {
    let deletes = delete_rules_for_ip(SAVE, "1.2.3.4");
    assert_eq!(deletes.len(), 2, "one delete per matching chain rule");
    assert_eq!(deletes[0].join(" "), "-D INPUT -s 1.2.3.4/32 -j DROP");
    assert_eq!(
        deletes[1].join(" "),
        "-D f2b-sshd -s 1.2.3.4/32 -j REJECT --reject-with icmp-port-unreachable"
    );
}

#[test]
fn unblock_of_unlisted_ip_matches_nothing() {
    assert!(delete_rules_for_ip(SAVE, "8.8.8.8").is_empty());
}

#[test]
fn jump_and_return_rules_are_not_collected() {
    // rules without -s (the multiport jump, RETURN) must never surface
    let ips = blocked_ips_from_save(SAVE);
    assert_eq!(ips.len(), 2);
}
