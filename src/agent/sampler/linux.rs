// Linux-specific helpers: /proc/cpuinfo, /proc/diskstats, /sys operstate.

pub(super) const SECTOR_SIZE: u64 = 512;

/// Aggregate block-device IO counters, summed across every device whose name
/// does not start with `loop` or `ram`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DiskIoTotals {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
}

/// Read first "model name" from /proc/cpuinfo. Prefer over sysinfo when it
/// returns placeholder names like "cpu0".
pub(super) fn read_cpu_model() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/cpuinfo").ok()?;
        for line in content.lines() {
            if line.starts_with("model name") {
                let name = line
                    .find(": ")
                    .map(|i| line[i + 2..].trim())
                    .filter(|s| !s.is_empty() && *s != "cpu0")?;
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Read link state from /sys/class/net/<interface>/operstate.
pub(super) fn interface_is_up(interface_name: &str) -> bool {
    #[cfg(target_os = "linux")]
    {
        let path = format!("/sys/class/net/{}/operstate", interface_name);
        if let Ok(content) = std::fs::read_to_string(&path) {
            return content.trim() == "up";
        }
    }
    false
}

pub(super) fn read_disk_io_totals() -> Option<DiskIoTotals> {
    #[cfg(target_os = "linux")]
    {
        let content = std::fs::read_to_string("/proc/diskstats").ok()?;
        Some(parse_diskstats(&content))
    }
    #[cfg(not(target_os = "linux"))]
    None
}

/// Parse /proc/diskstats content. Field layout per kernel docs:
/// major minor name reads-completed reads-merged sectors-read ms-reading
/// writes-completed writes-merged sectors-written ...
pub(crate) fn parse_diskstats(content: &str) -> DiskIoTotals {
    let mut totals = DiskIoTotals::default();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];
        if name.starts_with("loop") || name.starts_with("ram") {
            continue;
        }
        let read_ops: u64 = fields[3].parse().unwrap_or(0);
        let sectors_read: u64 = fields[5].parse().unwrap_or(0);
        let write_ops: u64 = fields[7].parse().unwrap_or(0);
        let sectors_written: u64 = fields[9].parse().unwrap_or(0);
        totals.read_ops += read_ops;
        totals.write_ops += write_ops;
        totals.read_bytes += sectors_read * SECTOR_SIZE;
        totals.write_bytes += sectors_written * SECTOR_SIZE;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISKSTATS: &str = "\
   8       0 sda 1000 20 80000 500 2000 30 160000 900 0 700 1400
   8       1 sda1 900 10 70000 400 1500 20 120000 800 0 600 1200
   7       0 loop0 5000 0 999999 100 0 0 0 0 0 10 100
   1       0 ram0 100 0 8888 1 0 0 0 0 0 1 1
 253       0 dm-0 300 0 2400 10 100 0 800 5 0 15 15";

    #[test]
    fn parse_diskstats_sums_and_skips_loop_ram() {
        let t = parse_diskstats(DISKSTATS);
        // sda + sda1 + dm-0 only
        assert_eq!(t.read_ops, 1000 + 900 + 300);
        assert_eq!(t.write_ops, 2000 + 1500 + 100);
        assert_eq!(t.read_bytes, (80000 + 70000 + 2400) * SECTOR_SIZE);
        assert_eq!(t.write_bytes, (160000 + 120000 + 800) * SECTOR_SIZE);
    }

    #[test]
    fn parse_diskstats_ignores_short_lines() {
        let t = parse_diskstats("8 0 sda 1\ngarbage");
        assert_eq!(t, DiskIoTotals::default());
    }
}
