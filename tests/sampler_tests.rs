// Sampler invariants over multiple ticks on the live host

use fleetwatch::agent::sampler::SystemSampler;
use fleetwatch::models::DdosStatus;

#[test]
fn first_tick_rates_are_zero_and_bounds_hold() {
    let mut sampler = SystemSampler::new("test-host".into());
    let snap = sampler.sample();

    assert_eq!(snap.host, "test-host");
    assert_eq!(snap.net_recv_rate, 0.0);
    assert_eq!(snap.net_sent_rate, 0.0);
    assert_eq!(snap.disk_read_rate, 0.0);
    assert_eq!(snap.disk_write_rate, 0.0);
    assert_eq!(snap.disk_read_iops, 0.0);
    assert_eq!(snap.disk_write_iops, 0.0);
    assert_eq!(snap.ddos_status, DdosStatus::Ok);
}

#[test]
fn repeated_ticks_keep_percentages_in_range() {
    let mut sampler = SystemSampler::new("test-host".into());
    for _ in 0..3 {
        let snap = sampler.sample();
        assert!(snap.cpu_percent >= 0.0 && snap.cpu_percent <= 100.0);
        assert!(snap.memory_usage >= 0.0 && snap.memory_usage <= 100.0);
        assert!(snap.swap_usage >= 0.0 && snap.swap_usage <= 100.0);
        assert!(snap.disk_usage >= 0.0 && snap.disk_usage <= 100.0);
        assert!(snap.net_recv_rate >= 0.0);
        assert!(snap.net_sent_rate >= 0.0);
        assert!(snap.timestamp > 0);
        std::thread::sleep(std::time::Duration::from_millis(30));
    }
}

#[test]
fn heavy_fields_are_populated_on_first_tick() {
    let mut sampler = SystemSampler::new("test-host".into());
    let snap = sampler.sample();
    // the cached-heavy ring must be filled on tick one, not tick ten
    assert!(snap.cpu_count > 0);
    assert!(!snap.cpu_model.is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn interfaces_and_counters_are_consistent() {
    let mut sampler = SystemSampler::new("test-host".into());
    let snap = sampler.sample();
    let iface_recv: u64 = snap.interfaces.iter().map(|i| i.bytes_recv).sum();
    let iface_sent: u64 = snap.interfaces.iter().map(|i| i.bytes_sent).sum();
    assert_eq!(snap.bytes_recv, iface_recv);
    assert_eq!(snap.bytes_sent, iface_sent);
}
