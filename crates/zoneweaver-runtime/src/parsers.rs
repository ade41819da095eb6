//! Pure functions turning the tabular/keyed output of `zpool`/`zfs`/`format`/
//! `kstat` into the typed storage records from `zoneweaver_core::types`.
//! None of these touch the network or the filesystem — they take a string
//! (plus a host/timestamp context) and return parsed rows, which keeps them
//! trivial to table-test.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use zoneweaver_core::{ArcStatsRecord, DiskIoStatRecord, DiskRecord, PoolIoStatRecord, ZfsDatasetRecord, ZfsPoolRecord};

/// Decode a ZFS-style size string: `<num>[KMGTPEZ]`, base-1024, case
/// insensitive. `-` and `none` parse as "no value" rather than an error.
pub fn parse_unit(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" || raw.eq_ignore_ascii_case("none") {
        return None;
    }

    let upper = raw.to_ascii_uppercase();
    let (num_part, mult): (&str, u64) = match upper.chars().last() {
        Some('K') => (&upper[..upper.len() - 1], 1024),
        Some('M') => (&upper[..upper.len() - 1], 1024u64.pow(2)),
        Some('G') => (&upper[..upper.len() - 1], 1024u64.pow(3)),
        Some('T') => (&upper[..upper.len() - 1], 1024u64.pow(4)),
        Some('P') => (&upper[..upper.len() - 1], 1024u64.pow(5)),
        Some('E') => (&upper[..upper.len() - 1], 1024u64.pow(6)),
        Some('Z') => (&upper[..upper.len() - 1], 1024u64.pow(7)),
        _ => (upper.as_str(), 1),
    };

    let value: f64 = num_part.parse().ok()?;
    Some((value * mult as f64).floor() as u64)
}

/// `alloc / (alloc + free) * 100`, rounded to 2dp. `alloc + free == 0` → 0.
pub fn capacity_percentage(alloc: u64, free: u64) -> f64 {
    let total = alloc + free;
    if total == 0 {
        return 0.0;
    }
    let pct = (alloc as f64) / (total as f64) * 100.0;
    (pct * 100.0).round() / 100.0
}

/// One line of `zpool list -H -o name,size,alloc,free,capacity,fragmentation,health`.
pub fn parse_zpool_list_line(host: &str, timestamp: DateTime<Utc>, line: &str) -> Option<ZfsPoolRecord> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 7 {
        return None;
    }
    let alloc_bytes = parse_unit(cols[2]);
    let free_bytes = parse_unit(cols[3]);
    let capacity_pct = match (alloc_bytes, free_bytes) {
        (Some(a), Some(f)) => capacity_percentage(a, f),
        _ => cols[4].trim_end_matches('%').parse().unwrap_or(0.0),
    };

    Some(ZfsPoolRecord {
        host: host.to_string(),
        timestamp,
        name: cols[0].to_string(),
        health: cols[6].to_string(),
        size_raw: cols[1].to_string(),
        size_bytes: parse_unit(cols[1]),
        alloc_raw: cols[2].to_string(),
        alloc_bytes,
        free_raw: cols[3].to_string(),
        free_bytes,
        capacity_pct,
        pool_type: None,
        fragmentation_pct: cols[5].trim_end_matches('%').parse().ok(),
    })
}

/// One line of `zfs list -H -o name,used,avail,refer,mountpoint,quota,compression`.
/// `pool` is the top-level segment of `name` (everything before the first `/`).
pub fn parse_zfs_list_line(host: &str, timestamp: DateTime<Utc>, line: &str) -> Option<ZfsDatasetRecord> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 4 {
        return None;
    }
    let name = cols[0].to_string();
    let pool = name.split('/').next().unwrap_or(&name).to_string();
    let mountpoint = cols.get(4).map(|s| s.trim()).filter(|s| !s.is_empty() && *s != "-").map(str::to_string);
    let quota_raw = cols.get(5).map(|s| s.trim().to_string());
    let quota_bytes = quota_raw.as_deref().and_then(parse_unit);
    let compression = cols.get(6).map(|s| s.trim()).filter(|s| !s.is_empty() && *s != "-").map(str::to_string);

    Some(ZfsDatasetRecord {
        host: host.to_string(),
        timestamp,
        name,
        pool,
        used_raw: cols[1].to_string(),
        used_bytes: parse_unit(cols[1]),
        available_raw: cols[2].to_string(),
        available_bytes: parse_unit(cols[2]),
        referenced_raw: cols[3].to_string(),
        referenced_bytes: parse_unit(cols[3]),
        mountpoint,
        quota_raw,
        quota_bytes,
        compression,
    })
}

/// `zfs get all -H -o property,value` for one dataset, as a property map.
pub fn parse_zfs_get_all(output: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    for line in output.lines() {
        let mut cols = line.splitn(2, '\t');
        if let (Some(prop), Some(value)) = (cols.next(), cols.next()) {
            props.insert(prop.trim().to_string(), value.trim().to_string());
        }
    }
    props
}

/// Disk type inferred from a device name: `cXtXdX` with no partition/slice
/// suffix → disk; names containing "ssd"/model markers are left to the
/// caller's vendor string, since `format` alone doesn't expose media type.
fn infer_disk_type(vendor: Option<&str>, model: Option<&str>) -> String {
    let haystack = format!("{} {}", vendor.unwrap_or(""), model.unwrap_or("")).to_ascii_lowercase();
    if haystack.contains("ssd") || haystack.contains("nvme") {
        "ssd".to_string()
    } else {
        "hdd".to_string()
    }
}

fn infer_interface_type(device_name: &str) -> String {
    if device_name.starts_with("c0t") || device_name.contains("nvme") {
        "nvme".to_string()
    } else {
        "scsi".to_string()
    }
}

/// One line of `format`'s disk listing: `N. DEVICE <VENDOR-MODEL-FW-CAPACITY>`.
pub fn parse_format_disk_line(host: &str, timestamp: DateTime<Utc>, line: &str) -> Option<DiskRecord> {
    let line = line.trim();
    let rest = line.split_once('.')?.1.trim();
    let (device_name, descriptor) = rest.split_once(char::is_whitespace)?;
    let descriptor = descriptor.trim().trim_start_matches('<').trim_end_matches('>');

    let parts: Vec<&str> = descriptor.splitn(4, '-').collect();
    let (vendor, model, firmware, capacity_raw) = match parts.as_slice() {
        [v, m, f, c] => (Some(*v), Some(*m), Some(*f), Some(*c)),
        [v, m, c] => (Some(*v), Some(*m), None, Some(*c)),
        _ => (None, None, None, None),
    };

    Some(DiskRecord {
        host: host.to_string(),
        timestamp,
        device_name: device_name.to_string(),
        vendor: vendor.map(str::to_string),
        model: model.map(str::to_string),
        firmware: firmware.map(str::to_string),
        capacity_raw: capacity_raw.map(str::to_string),
        capacity_bytes: capacity_raw.and_then(parse_unit),
        disk_type: infer_disk_type(vendor, model),
        interface_type: infer_interface_type(device_name),
    })
}

/// `kstat -p zfs:0:arcstats:*` output — one `module:instance:name:stat value`
/// line per stat.
pub fn parse_arcstats(host: &str, timestamp: DateTime<Utc>, output: &str) -> ArcStatsRecord {
    let mut stats: HashMap<String, u64> = HashMap::new();
    for line in output.lines() {
        let mut cols = line.split_whitespace();
        let Some(key_field) = cols.next() else { continue };
        let Some(value_field) = cols.next() else { continue };
        let Some(stat_name) = key_field.rsplit(':').next() else { continue };
        if let Ok(v) = value_field.parse::<u64>() {
            stats.insert(stat_name.to_string(), v);
        }
    }

    let hits = stats.get("hits").copied().unwrap_or(0);
    let misses = stats.get("misses").copied().unwrap_or(0);
    let total = hits + misses;
    let hit_ratio = if total == 0 {
        "0.00".to_string()
    } else {
        format!("{:.2}", (hits as f64 / total as f64) * 100.0)
    };

    ArcStatsRecord {
        host: host.to_string(),
        timestamp,
        size_bytes: stats.get("size").copied(),
        target_size_bytes: stats.get("c").copied(),
        mru_size_bytes: stats.get("p").copied(),
        mfu_size_bytes: stats.get("mfu_size").copied(),
        hits,
        misses,
        hit_ratio,
    }
}

const TOPOLOGY_MARKERS: &[&str] = &["raidz1", "raidz2", "raidz3", "mirror", "cache", "log", "spare"];

fn is_topology_row(first_col: &str) -> bool {
    TOPOLOGY_MARKERS.iter().any(|m| first_col == *m)
}

fn is_device_row(first_col: &str) -> bool {
    first_col.starts_with('c') && first_col.contains('t') && first_col.contains('d') && !first_col.contains('/')
}

/// `zpool iostat -l -H -v 1 2`: two tab-delimited samples separated by a
/// blank-line-free repeat of the same pool/device set. Only the second
/// sample is meaningful (the first covers boot-to-now averages). Returns
/// `(pool_rows, disk_rows)`; `pool_type` on the pool row is adjusted to the
/// last topology keyword (`raidz2`, `mirror`, ...) seen under it.
pub fn parse_zpool_iostat_verbose(
    host: &str,
    timestamp: DateTime<Utc>,
    output: &str,
) -> (Vec<PoolIoStatRecord>, Vec<DiskIoStatRecord>) {
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() % 2 != 0 {
        // Malformed/single-sample output; nothing we can safely attribute
        // to "the second sample".
        return (Vec::new(), Vec::new());
    }
    let second_sample = &lines[lines.len() / 2..];

    let mut pool_rows = Vec::new();
    let mut disk_rows = Vec::new();
    let mut current_pool = String::new();
    let mut current_pool_type: Option<String> = None;

    for line in second_sample {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.is_empty() {
            continue;
        }
        let first = cols[0].trim();

        if is_topology_row(first) {
            current_pool_type = Some(first.to_string());
            continue;
        }

        if is_device_row(first) {
            if cols.len() < 7 {
                continue;
            }
            disk_rows.push(DiskIoStatRecord {
                host: host.to_string(),
                timestamp,
                pool: current_pool.clone(),
                device_name: first.to_string(),
                read_ops: cols[3].parse().ok(),
                write_ops: cols[4].parse().ok(),
                read_bandwidth_bytes: parse_unit(cols[5]),
                write_bandwidth_bytes: parse_unit(cols[6]),
            });
            continue;
        }

        // Anything else with enough columns starts a new pool section.
        if cols.len() >= 7 {
            current_pool = first.to_string();
            current_pool_type = None;
            pool_rows.push(PoolIoStatRecord {
                host: host.to_string(),
                timestamp,
                pool: current_pool.clone(),
                pool_type: current_pool_type.clone(),
                read_ops: cols[3].parse().ok(),
                write_ops: cols[4].parse().ok(),
                read_bandwidth_bytes: parse_unit(cols[5]),
                write_bandwidth_bytes: parse_unit(cols[6]),
            });
        }
    }

    // Patch pool_type in after the fact: it's only known once a topology
    // row under the pool has been seen, which happens after the pool row
    // is pushed.
    for pool_row in &mut pool_rows {
        if pool_row.pool_type.is_none() {
            pool_row.pool_type = second_sample
                .iter()
                .skip_while(|l| !l.starts_with(&pool_row.pool))
                .skip(1)
                .take_while(|l| !is_device_row(l.split('\t').next().unwrap_or("")) || is_topology_row(l.split('\t').next().unwrap_or("")))
                .find_map(|l| {
                    let first = l.split('\t').next().unwrap_or("").trim();
                    is_topology_row(first).then(|| first.to_string())
                });
        }
    }

    (pool_rows, disk_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_parse_unit_powers_of_1024() {
        assert_eq!(parse_unit("1K"), Some(1024));
        assert_eq!(parse_unit("1.5G"), Some((1.5 * 1024f64.powi(3)) as u64));
        assert_eq!(parse_unit("2T"), Some(2 * 1024u64.pow(4)));
        assert_eq!(parse_unit("500"), Some(500));
    }

    #[test]
    fn test_parse_unit_floors_fractional_bytes() {
        assert_eq!(parse_unit("1.0005K"), Some(1024));
        assert_eq!(parse_unit("6.05G"), Some((6.05 * 1024f64.powi(3)).floor() as u64));
    }

    #[test]
    fn test_parse_unit_null_markers() {
        assert_eq!(parse_unit("-"), None);
        assert_eq!(parse_unit("none"), None);
        assert_eq!(parse_unit("NONE"), None);
    }

    #[test]
    fn test_capacity_percentage() {
        assert_eq!(capacity_percentage(50, 50), 50.0);
        assert_eq!(capacity_percentage(0, 0), 0.0);
        assert_eq!(capacity_percentage(1, 3), 25.0);
    }

    #[test]
    fn test_parse_zpool_list_line() {
        let line = "rpool\t100G\t40G\t60G\t40%\t10%\tONLINE";
        let rec = parse_zpool_list_line("host1", ts(), line).unwrap();
        assert_eq!(rec.name, "rpool");
        assert_eq!(rec.health, "ONLINE");
        assert_eq!(rec.alloc_bytes, Some(40 * 1024u64.pow(3)));
        assert_eq!(rec.capacity_pct, 40.0);
        assert_eq!(rec.fragmentation_pct, Some(10.0));
    }

    #[test]
    fn test_parse_zfs_list_line_nested_dataset() {
        let line = "rpool/zones/web01\t5G\t95G\t3G\t/zones/web01\t-\toff";
        let rec = parse_zfs_list_line("host1", ts(), line).unwrap();
        assert_eq!(rec.pool, "rpool");
        assert_eq!(rec.mountpoint.as_deref(), Some("/zones/web01"));
        assert_eq!(rec.quota_bytes, None);
        assert_eq!(rec.compression.as_deref(), Some("off"));
    }

    #[test]
    fn test_parse_zfs_get_all() {
        let out = "compression\toff\nquota\t10G\nmountpoint\t/zones/web01\n";
        let props = parse_zfs_get_all(out);
        assert_eq!(props.get("compression").map(String::as_str), Some("off"));
        assert_eq!(props.get("quota").map(String::as_str), Some("10G"));
    }

    #[test]
    fn test_parse_format_disk_line_full_descriptor() {
        let line = "       0. c0t0d0 <ATA-Samsung SSD 860-2B6Q-128.04GB>";
        let rec = parse_format_disk_line("host1", ts(), line).unwrap();
        assert_eq!(rec.device_name, "c0t0d0");
        assert_eq!(rec.vendor.as_deref(), Some("ATA"));
        assert_eq!(rec.disk_type, "ssd");
        assert_eq!(rec.interface_type, "nvme");
    }

    #[test]
    fn test_parse_arcstats_hit_ratio() {
        let out = "zfs:0:arcstats:hits 900\nzfs:0:arcstats:misses 100\nzfs:0:arcstats:size 1073741824\n";
        let rec = parse_arcstats("host1", ts(), out);
        assert_eq!(rec.hits, 900);
        assert_eq!(rec.misses, 100);
        assert_eq!(rec.hit_ratio, "90.00");
        assert_eq!(rec.size_bytes, Some(1073741824));
    }

    #[test]
    fn test_parse_arcstats_no_samples_zero_ratio() {
        let rec = parse_arcstats("host1", ts(), "");
        assert_eq!(rec.hit_ratio, "0.00");
    }

    #[test]
    fn test_parse_zpool_iostat_second_sample_only() {
        let output = "\
rpool\t40G\t60G\t5\t10\t1M\t2M
mirror\t-\t-\t-\t-\t-\t-
c0t0d0\t-\t-\t5\t10\t1M\t2M
c0t1d0\t-\t-\t5\t10\t1M\t2M

rpool\t41G\t59G\t7\t12\t2M\t3M
mirror\t-\t-\t-\t-\t-\t-
c0t0d0\t-\t-\t7\t12\t2M\t3M
c0t1d0\t-\t-\t7\t12\t2M\t3M
";
        let (pools, disks) = parse_zpool_iostat_verbose("host1", ts(), output);
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].read_ops, Some(7));
        assert_eq!(pools[0].pool_type.as_deref(), Some("mirror"));
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].read_ops, Some(7));
        assert_eq!(disks[0].pool, "rpool");
    }
}
