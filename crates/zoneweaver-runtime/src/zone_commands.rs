//! zonecfg/zoneadm/zadm command wrappers backing the Task Engine's zone
//! lifecycle operation handlers (`start`, `stop`, `restart`, `delete`,
//! `discover`, `zone_create`, `zone_modify`).

use crate::command::{CommandRunner, RunOptions};
use crate::error::{Result, RuntimeError};
use chrono::Utc;
use zoneweaver_core::{Zone, ZoneStatus};

/// `zoneadm -z <zone> boot`
pub async fn start(runner: &dyn CommandRunner, zone_name: &str) -> Result<()> {
    let out = runner.run_default("zoneadm", &["-z", zone_name, "boot"]).await;
    require_success(out, zone_name)
}

/// `zoneadm -z <zone> shutdown`
pub async fn stop(runner: &dyn CommandRunner, zone_name: &str) -> Result<()> {
    let out = runner.run_default("zoneadm", &["-z", zone_name, "shutdown"]).await;
    require_success(out, zone_name)
}

pub async fn restart(runner: &dyn CommandRunner, zone_name: &str) -> Result<()> {
    stop(runner, zone_name).await?;
    start(runner, zone_name).await
}

/// `zonecfg -z <zone> delete -F`. Halts first, best-effort, since a running
/// or installed zone can't be deleted directly.
pub async fn delete(runner: &dyn CommandRunner, zone_name: &str) -> Result<()> {
    let _ = runner.run_default("zoneadm", &["-z", zone_name, "halt"]).await;
    let _ = runner.run_default("zoneadm", &["-z", zone_name, "uninstall", "-F"]).await;
    let out = runner.run_default("zonecfg", &["-z", zone_name, "delete", "-F"]).await;
    require_success(out, zone_name)
}

/// `zonecfg -z <zone> -f <tmpfile>`, applying the ordered command lines
/// built by [`generate_zonecfg`].
pub async fn zone_create(runner: &dyn CommandRunner, zone_name: &str, lines: &[String]) -> Result<()> {
    let tmp_path = format!("/tmp/zonecfg-{zone_name}.cmd");
    tokio::fs::write(&tmp_path, lines.join("\n") + "\n")
        .await
        .map_err(|e| RuntimeError::zone_operation_failed(zone_name, format!("writing zonecfg file: {e}")))?;

    let result = runner.run_default("zonecfg", &["-z", zone_name, "-f", &tmp_path]).await;
    let _ = tokio::fs::remove_file(&tmp_path).await;
    require_success(result, zone_name)
}

pub async fn zone_modify(runner: &dyn CommandRunner, zone_name: &str, lines: &[String]) -> Result<()> {
    zone_create(runner, zone_name, lines).await
}

fn require_success(out: crate::command::CommandOutput, zone_name: &str) -> Result<()> {
    if out.success {
        Ok(())
    } else {
        Err(RuntimeError::zone_operation_failed(
            zone_name,
            out.error.unwrap_or(out.stderr),
        ))
    }
}

/// Build the ordered `zonecfg` command-file lines for a zone's
/// configuration, in the order `zonecfg` expects: create, brand/zonepath/
/// ip-type, one `add net` block per interface, capped-cpu, capped-memory,
/// one `add fs` block per mount, then `verify`/`commit`.
pub struct ZoneCfgInput<'a> {
    pub brand: &'a str,
    pub zonepath: &'a str,
    pub autoboot: bool,
    pub nets: &'a [(String, String)], // (physical, address)
    pub vcpus: Option<u32>,
    pub ram_mb: Option<u64>,
}

pub fn generate_zonecfg(input: &ZoneCfgInput) -> Vec<String> {
    let mut lines = vec![
        "create".to_string(),
        format!("set brand={}", input.brand),
        format!("set zonepath={}", input.zonepath),
        "set ip-type=exclusive".to_string(),
        format!("set autoboot={}", input.autoboot),
    ];

    for (physical, address) in input.nets {
        lines.push("add net".to_string());
        lines.push(format!("set physical={physical}"));
        if !address.is_empty() {
            lines.push(format!("set address={address}"));
        }
        lines.push("end".to_string());
    }

    if let Some(vcpus) = input.vcpus {
        lines.push("add capped-cpu".to_string());
        lines.push(format!("set ncpus={:.1}", vcpus as f64));
        lines.push("end".to_string());
    }

    if let Some(ram_mb) = input.ram_mb {
        lines.push("add capped-memory".to_string());
        lines.push(format!("set physical={ram_mb}m"));
        lines.push("end".to_string());
    }

    lines.push("verify".to_string());
    lines.push("commit".to_string());
    lines
}

/// One line of `zoneadm list -cp`: `zoneid:zonename:state:zonepath:uuid:brand:ip-type`.
pub fn parse_zoneadm_line(line: &str) -> Result<Zone> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 6 {
        return Err(RuntimeError::parse_error("zoneadm list -cp", format!("malformed line: {line}")));
    }

    let zone_name = fields[1].to_string();
    let status = ZoneStatus::parse(fields[2]).ok_or_else(|| {
        RuntimeError::parse_error("zoneadm list -cp", format!("unknown zone state `{}`", fields[2]))
    })?;

    Ok(Zone {
        name: zone_name,
        status,
        is_orphaned: false,
        last_seen: Utc::now(),
        configuration: String::new(),
        vm_type: fields.get(5).unwrap_or(&"").to_string(),
        partition_id: None,
    })
}

/// `zoneadm list -cp`, skipping the global zone.
pub async fn discover(runner: &dyn CommandRunner) -> Result<Vec<Zone>> {
    let out = runner.run_default("zoneadm", &["list", "-cp"]).await;
    if !out.success {
        return Err(RuntimeError::internal_error(format!(
            "zoneadm list -cp failed: {}",
            out.error.unwrap_or(out.stderr)
        )));
    }

    let mut zones = Vec::new();
    for line in out.stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let zone = parse_zoneadm_line(line)?;
        if zone.name == "global" {
            continue;
        }
        zones.push(zone);
    }
    Ok(zones)
}

/// `zadm show <zone>` as raw JSON text, for `vnc.enabled` lookups and
/// priority/autoboot introspection elsewhere in the runtime.
pub async fn zadm_show(runner: &dyn CommandRunner, zone_name: &str) -> Result<String> {
    let out = runner.run("zadm", &["show", zone_name], RunOptions::default()).await;
    if !out.success {
        return Err(RuntimeError::zone_operation_failed(zone_name, out.error.unwrap_or(out.stderr)));
    }
    Ok(out.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCommandRunner;

    #[test]
    fn test_generate_zonecfg_basic() {
        let input = ZoneCfgInput {
            brand: "lipkg",
            zonepath: "/zones/web01",
            autoboot: true,
            nets: &[("net0".to_string(), "10.0.0.2/24".to_string())],
            vcpus: Some(2),
            ram_mb: Some(2048),
        };
        let lines = generate_zonecfg(&input);
        assert_eq!(lines[0], "create");
        assert!(lines.contains(&"set brand=lipkg".to_string()));
        assert!(lines.contains(&"add net".to_string()));
        assert!(lines.contains(&"set physical=net0".to_string()));
        assert_eq!(lines.last().unwrap(), "commit");
    }

    #[test]
    fn test_generate_zonecfg_no_optional_fields() {
        let input = ZoneCfgInput {
            brand: "lipkg",
            zonepath: "/zones/web01",
            autoboot: false,
            nets: &[],
            vcpus: None,
            ram_mb: None,
        };
        let lines = generate_zonecfg(&input);
        assert!(!lines.iter().any(|l| l.contains("capped-cpu")));
        assert!(!lines.iter().any(|l| l.contains("add net")));
    }

    #[test]
    fn test_parse_zoneadm_line_running() {
        let line = "1:web01:running:/zones/web01:5f2c1234-abcd-ef01-2345-6789abcdef01:lipkg:excl";
        let zone = parse_zoneadm_line(line).unwrap();
        assert_eq!(zone.name, "web01");
        assert_eq!(zone.status, ZoneStatus::Running);
        assert_eq!(zone.vm_type, "lipkg");
    }

    #[test]
    fn test_parse_zoneadm_line_unbooted() {
        let line = "-:db01:installed:/zones/db01:5f2c1234-abcd-ef01-2345-6789abcdef02:lipkg:excl";
        let zone = parse_zoneadm_line(line).unwrap();
        assert_eq!(zone.status, ZoneStatus::Installed);
    }

    #[test]
    fn test_parse_zoneadm_line_malformed() {
        let result = parse_zoneadm_line("garbage");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_zoneadm_line_unknown_state() {
        let line = "1:web01:teleporting:/zones/web01:uuid:lipkg:excl";
        assert!(parse_zoneadm_line(line).is_err());
    }

    #[tokio::test]
    async fn test_discover_skips_global_zone() {
        let runner = MockCommandRunner::new();
        runner.on_success(
            "zoneadm",
            &["list", "-cp"],
            "0:global:running:/:uuid0:ipkg:shared\n1:web01:running:/zones/web01:uuid1:lipkg:excl\n",
        );

        let zones = discover(&runner).await.unwrap();
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].name, "web01");
    }

    #[tokio::test]
    async fn test_start_failure_surfaces_stderr() {
        let runner = MockCommandRunner::new();
        runner.on_failure("zoneadm", &["-z", "web01", "boot"], "zone already running", 1);
        let err = start(&runner, "web01").await.unwrap_err();
        assert!(matches!(err, RuntimeError::ZoneOperationFailed { .. }));
    }
}
