//! DB↔`/etc/ipf/ipnat.conf` reconciliation, DHCP-hosts file authoring, and
//! the SMF refresh cycles both share.

use crate::command::CommandRunner;
use crate::error::{Result, RuntimeError};
use regex::Regex;
use std::sync::OnceLock;
use zoneweaver_core::{DhcpHost, DhcpSubnetConfig, NatRule, NatRuleType, DHCP_SUBNET_ID};

/// One non-comment, non-blank line of `/etc/ipf/ipnat.conf`.
pub fn parse_ipnat_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Build the canonical single-line form for a rule, by `type`.
pub fn render_rule(rule_type: NatRuleType, bridge: &str, subnet: &str, target: &str, protocol: &str) -> String {
    match rule_type {
        NatRuleType::Map => format!("map {bridge} {subnet} -> {target} portmap {protocol} auto"),
        NatRuleType::Bimap => format!("bimap {bridge} {subnet} -> {target}"),
        NatRuleType::Rdr => format!("rdr {bridge} {subnet} -> {target}"),
    }
}

/// Reconcile the DB's view of NAT rules against the actual file content:
/// import file lines the DB doesn't know about (tagged `system_import`),
/// and report DB rows whose `raw_rule` no longer prefixes any file line so
/// the caller can delete them.
pub struct Reconciliation {
    pub to_import: Vec<String>,
    pub stale_db_ids: Vec<String>,
}

pub fn reconcile(db_rules: &[NatRule], file_contents: &str) -> Reconciliation {
    let file_lines = parse_ipnat_lines(file_contents);

    let to_import = file_lines
        .iter()
        .filter(|line| !db_rules.iter().any(|r| line.starts_with(&r.raw_rule)))
        .cloned()
        .collect();

    let stale_db_ids = db_rules
        .iter()
        .filter(|r| !file_lines.iter().any(|line| line.starts_with(&r.raw_rule)))
        .map(|r| r.id.clone())
        .collect();

    Reconciliation { to_import, stale_db_ids }
}

/// Regenerate the whole file contents by joining every DB row, appending
/// `# description` when present.
pub fn render_ipnat_file(rules: &[NatRule]) -> String {
    let mut out = String::new();
    for rule in rules {
        out.push_str(&rule.raw_rule);
        if let Some(desc) = rule.description.as_deref().filter(|d| !d.is_empty()) {
            out.push_str(" # ");
            out.push_str(desc);
        }
        out.push('\n');
    }
    out
}

/// Atomic write: write to a sibling temp path, then rename over the target.
pub async fn atomic_write(path: &str, contents: &str) -> Result<()> {
    let tmp_path = format!("{path}.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| RuntimeError::internal_error(format!("writing {tmp_path}: {e}")))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| RuntimeError::internal_error(format!("renaming {tmp_path} -> {path}: {e}")))
}

/// `refresh → disable → enable`, tolerating "service does not exist"/"not
/// running" on the initial refresh.
pub async fn refresh_smf_service(runner: &dyn CommandRunner, fmri: &str) -> Result<()> {
    let _ = runner.run_default("svcadm", &["refresh", fmri]).await;
    let disable = runner.run_default("svcadm", &["disable", fmri]).await;
    if !disable.success && !disable.stderr.to_ascii_lowercase().contains("not running") {
        return Err(RuntimeError::network_error(format!(
            "svcadm disable {fmri} failed: {}",
            disable.error.unwrap_or(disable.stderr)
        )));
    }
    let enable = runner.run_default("svcadm", &["enable", fmri]).await;
    if !enable.success {
        return Err(RuntimeError::network_error(format!(
            "svcadm enable {fmri} failed: {}",
            enable.error.unwrap_or(enable.stderr)
        )));
    }
    Ok(())
}

/// Run the full NAT sync cycle for one mutation: reconcile, apply `apply`
/// to the reconciled rule set, write the file, refresh ipfilter.
pub async fn sync_nat_rules(
    runner: &dyn CommandRunner,
    conf_path: &str,
    current_file_contents: &str,
    rules_after_mutation: &[NatRule],
) -> Result<()> {
    let rendered = render_ipnat_file(rules_after_mutation);
    if rendered == current_file_contents {
        return refresh_smf_service(runner, "network/ipfilter").await;
    }
    atomic_write(conf_path, &rendered).await?;
    refresh_smf_service(runner, "network/ipfilter").await
}

/// `routeadm -u {-e|-d} ipv4-forwarding` plus a per-interface
/// `ipadm set-ifprop` call. Per-interface failures accumulate; overall
/// success means at most a minority of interfaces failed.
pub async fn configure_forwarding(runner: &dyn CommandRunner, enable: bool, interfaces: &[String]) -> Result<Vec<String>> {
    let flag = if enable { "-e" } else { "-d" };
    let routeadm = runner.run_default("routeadm", &["-u", flag, "ipv4-forwarding"]).await;
    if !routeadm.success {
        return Err(RuntimeError::network_error(format!(
            "routeadm failed: {}",
            routeadm.error.unwrap_or(routeadm.stderr)
        )));
    }

    let value = if enable { "on" } else { "off" };
    let mut failures = Vec::new();
    for iface in interfaces {
        let prop = format!("forwarding={value}");
        let out = runner.run_default("ipadm", &["set-ifprop", "-p", &prop, "-m", "ipv4", iface]).await;
        if !out.success {
            failures.push(iface.clone());
        }
    }

    if failures.len() * 2 > interfaces.len() && !interfaces.is_empty() {
        return Err(RuntimeError::network_error(format!(
            "forwarding configuration failed on a majority of interfaces: {failures:?}"
        )));
    }
    Ok(failures)
}

// ---------------------------------------------------------------------
// DHCP (§4.K, §6): `/etc/dhcpd.conf` subnet block + static host
// reservations. Parsing is regex-based rather than the NAT file's
// line-prefix matching since blocks carry several fields in no fixed
// order. Patterns are compiled once via `OnceLock`, same as the PTY
// multiplexer's ANSI-stripping regex.
// ---------------------------------------------------------------------

fn dhcp_subnet_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)subnet\s+\S+\s+netmask\s+\S+\s*\{.*?\}").unwrap())
}

fn dhcp_host_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)host\s+\S+\s*\{.*?\}").unwrap())
}

fn dhcp_subnet_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"subnet\s+(\S+)\s+netmask\s+(\S+)").unwrap())
}

fn dhcp_routers_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"option\s+routers\s+([^;]+);").unwrap())
}

fn dhcp_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"range\s+(\S+)\s+(\S+);").unwrap())
}

fn dhcp_dns_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"option\s+domain-name-servers\s+([^;]+);").unwrap())
}

fn dhcp_host_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"host\s+(\S+)\s*\{").unwrap())
}

fn dhcp_hardware_ethernet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"hardware\s+ethernet\s+([^;]+);").unwrap())
}

fn dhcp_fixed_address_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"fixed-address\s+([^;]+);").unwrap())
}

/// Every `subnet { ... }` and `host { ... }` block found verbatim in a
/// `dhcpd.conf`-style file, for reconciliation against the DB's canonical
/// renderings.
pub fn parse_dhcpd_blocks(contents: &str) -> (Vec<String>, Vec<String>) {
    let subnets = dhcp_subnet_block_regex().find_iter(contents).map(|m| m.as_str().to_string()).collect();
    let hosts = dhcp_host_block_regex().find_iter(contents).map(|m| m.as_str().to_string()).collect();
    (subnets, hosts)
}

/// Decode one subnet block's fields, tolerating any field order inside
/// the braces. `None` if a required field is missing.
pub fn parse_dhcp_subnet_block(block: &str) -> Option<(String, String, String, String, String, String)> {
    let header = dhcp_subnet_header_regex().captures(block)?;
    let routers = dhcp_routers_regex().captures(block)?[1].trim().to_string();
    let range = dhcp_range_regex().captures(block)?;
    let dns = dhcp_dns_regex().captures(block)?[1].trim().to_string();
    Some((header[1].to_string(), header[2].to_string(), routers, range[1].to_string(), range[2].to_string(), dns))
}

/// Decode one host block's fields. `None` if a required field is missing.
pub fn parse_dhcp_host_block(block: &str) -> Option<(String, String, String)> {
    let name = dhcp_host_name_regex().captures(block)?[1].to_string();
    let mac = dhcp_hardware_ethernet_regex().captures(block)?[1].trim().to_string();
    let ip = dhcp_fixed_address_regex().captures(block)?[1].trim().to_string();
    Some((name, mac, ip))
}

/// Canonical single-line subnet block, matching the literal form dhcpd.conf
/// is rendered in.
pub fn render_dhcp_subnet_block(net: &str, netmask: &str, routers: &str, range_start: &str, range_end: &str, dns: &str) -> String {
    format!("subnet {net} netmask {netmask} {{ option routers {routers}; range {range_start} {range_end}; option domain-name-servers {dns}; }}")
}

/// One line of a `dhcpd.conf`-style hosts file: `host <name> { hardware ethernet <mac>; fixed-address <ip>; }`.
pub fn render_dhcp_host_line(name: &str, mac: &str, ip: &str) -> String {
    format!("host {name} {{ hardware ethernet {mac}; fixed-address {ip}; }}")
}

/// Regenerate the whole `dhcpd.conf` from the subnet row (if any) and
/// every host row.
pub fn render_dhcpd_file(subnet: Option<&DhcpSubnetConfig>, hosts: &[DhcpHost]) -> String {
    let mut out = String::new();
    if let Some(s) = subnet {
        out.push_str(&render_dhcp_subnet_block(&s.net, &s.netmask, &s.routers, &s.range_start, &s.range_end, &s.dns));
        out.push('\n');
    }
    for h in hosts {
        out.push_str(&render_dhcp_host_line(&h.hostname, &h.mac_address, &h.ip_address));
        out.push('\n');
    }
    out
}

/// Reconcile DB state against the file: surface an unknown subnet/host
/// block to import (tagged `system_import`) and flag DB rows whose
/// `raw_block` no longer prefixes any block the file still has, mirroring
/// NAT's [`reconcile`].
pub struct DhcpReconciliation {
    pub subnet_to_import: Option<DhcpSubnetConfig>,
    pub stale_subnet: bool,
    pub hosts_to_import: Vec<DhcpHost>,
    pub stale_host_ids: Vec<String>,
}

pub fn reconcile_dhcp(db_subnet: Option<&DhcpSubnetConfig>, db_hosts: &[DhcpHost], file_contents: &str) -> DhcpReconciliation {
    let (subnet_blocks, host_blocks) = parse_dhcpd_blocks(file_contents);

    let stale_subnet = match db_subnet {
        Some(s) => !subnet_blocks.iter().any(|b| b.starts_with(&s.raw_block)),
        None => false,
    };

    let subnet_to_import = if db_subnet.is_none() {
        subnet_blocks.iter().find_map(|b| {
            parse_dhcp_subnet_block(b).map(|(net, netmask, routers, range_start, range_end, dns)| DhcpSubnetConfig {
                id: DHCP_SUBNET_ID.to_string(),
                net,
                netmask,
                routers,
                range_start,
                range_end,
                dns,
                raw_block: b.clone(),
            })
        })
    } else {
        None
    };

    let hosts_to_import = host_blocks
        .iter()
        .filter(|b| !db_hosts.iter().any(|h| b.starts_with(&h.raw_block)))
        .filter_map(|b| {
            parse_dhcp_host_block(b).map(|(name, mac, ip)| DhcpHost {
                id: uuid::Uuid::new_v4().to_string(),
                hostname: name,
                mac_address: mac,
                ip_address: ip,
                raw_block: b.clone(),
                created_by: "system_import".to_string(),
            })
        })
        .collect();

    let stale_host_ids = db_hosts
        .iter()
        .filter(|h| !host_blocks.iter().any(|b| b.starts_with(&h.raw_block)))
        .map(|h| h.id.clone())
        .collect();

    DhcpReconciliation { subnet_to_import, stale_subnet, hosts_to_import, stale_host_ids }
}

/// Which SMF instance actually manages the DHCP server on this host:
/// `dhcp/server:ipv4` on newer ISC-backed builds, `dhcp:ipv4` on older
/// ones. Probed via `svcs` rather than assumed, mirroring
/// `orchestrator::smf::zones_service_online`'s query idiom.
pub async fn resolve_dhcp_fmri(runner: &dyn CommandRunner) -> Result<String> {
    for candidate in ["dhcp/server:ipv4", "dhcp:ipv4"] {
        let out = runner.run_default("svcs", &["-H", "-o", "fmri", candidate]).await;
        if out.success && !out.stdout.trim().is_empty() {
            return Ok(candidate.to_string());
        }
    }
    Err(RuntimeError::network_error("neither dhcp/server:ipv4 nor dhcp:ipv4 SMF instance exists on this host"))
}

/// Run the full DHCP sync cycle for one mutation: write the regenerated
/// file if it changed, then refresh whichever DHCP SMF instance exists.
pub async fn sync_dhcp_config(
    runner: &dyn CommandRunner,
    conf_path: &str,
    current_file_contents: &str,
    subnet_after_mutation: Option<&DhcpSubnetConfig>,
    hosts_after_mutation: &[DhcpHost],
) -> Result<()> {
    let rendered = render_dhcpd_file(subnet_after_mutation, hosts_after_mutation);
    if rendered != current_file_contents {
        atomic_write(conf_path, &rendered).await?;
    }
    let fmri = resolve_dhcp_fmri(runner).await?;
    refresh_smf_service(runner, &fmri).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCommandRunner;

    fn rule(id: &str, raw: &str) -> NatRule {
        NatRule {
            id: id.to_string(),
            rule_type: NatRuleType::Map,
            bridge: "vnic0".to_string(),
            subnet: "10.0.0.0/24".to_string(),
            target: "203.0.113.5".to_string(),
            protocol: "tcp/udp".to_string(),
            raw_rule: raw.to_string(),
            description: None,
            created_by: "admin".to_string(),
        }
    }

    #[test]
    fn test_parse_ipnat_lines_skips_comments_and_blanks() {
        let contents = "# header\nmap vnic0 10.0.0.0/24 -> 203.0.113.5 portmap tcp/udp auto\n\n";
        let lines = parse_ipnat_lines(contents);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_render_rule_forms() {
        assert_eq!(
            render_rule(NatRuleType::Map, "vnic0", "10.0.0.0/24", "203.0.113.5", "tcp/udp"),
            "map vnic0 10.0.0.0/24 -> 203.0.113.5 portmap tcp/udp auto"
        );
        assert_eq!(
            render_rule(NatRuleType::Bimap, "vnic0", "10.0.0.0/24", "203.0.113.5", "tcp/udp"),
            "bimap vnic0 10.0.0.0/24 -> 203.0.113.5"
        );
    }

    #[test]
    fn test_reconcile_imports_unknown_and_flags_stale() {
        let db_rules = vec![rule("r1", "map vnic0 10.0.0.0/24 -> 203.0.113.5 portmap tcp/udp auto")];
        let file = "map vnic0 10.0.0.0/24 -> 203.0.113.5 portmap tcp/udp auto\nrdr vnic1 10.0.1.0/24 -> 203.0.113.6\n";
        let recon = reconcile(&db_rules, file);
        assert_eq!(recon.to_import, vec!["rdr vnic1 10.0.1.0/24 -> 203.0.113.6".to_string()]);
        assert!(recon.stale_db_ids.is_empty());
    }

    #[test]
    fn test_reconcile_flags_stale_db_rows() {
        let db_rules = vec![rule("r1", "map vnic0 10.0.0.0/24 -> 203.0.113.5 portmap tcp/udp auto")];
        let recon = reconcile(&db_rules, "");
        assert_eq!(recon.stale_db_ids, vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_smf_tolerates_not_running() {
        let runner = MockCommandRunner::new();
        runner.on_failure("svcadm", &["disable", "network/ipfilter"], "svc not running", 1);
        runner.on_success("svcadm", &["enable", "network/ipfilter"], "");
        refresh_smf_service(&runner, "network/ipfilter").await.unwrap();
    }

    #[tokio::test]
    async fn test_configure_forwarding_minority_failure_tolerated() {
        let runner = MockCommandRunner::new();
        runner.on_success("routeadm", &["-u", "-e", "ipv4-forwarding"], "");
        runner.on_success("ipadm", &["set-ifprop", "-p", "forwarding=on", "-m", "ipv4", "net0"], "");
        runner.on_failure("ipadm", &["set-ifprop", "-p", "forwarding=on", "-m", "ipv4", "net1"], "no such prop", 1);
        runner.on_success("ipadm", &["set-ifprop", "-p", "forwarding=on", "-m", "ipv4", "net2"], "");

        let failures = configure_forwarding(&runner, true, &["net0".into(), "net1".into(), "net2".into()]).await.unwrap();
        assert_eq!(failures, vec!["net1".to_string()]);
    }

    fn subnet(raw: &str) -> DhcpSubnetConfig {
        DhcpSubnetConfig {
            id: DHCP_SUBNET_ID.to_string(),
            net: "10.0.0.0".to_string(),
            netmask: "255.255.255.0".to_string(),
            routers: "10.0.0.1".to_string(),
            range_start: "10.0.0.100".to_string(),
            range_end: "10.0.0.200".to_string(),
            dns: "10.0.0.1".to_string(),
            raw_block: raw.to_string(),
        }
    }

    fn host(id: &str, raw: &str) -> DhcpHost {
        DhcpHost {
            id: id.to_string(),
            hostname: "web01".to_string(),
            mac_address: "00:11:22:33:44:55".to_string(),
            ip_address: "10.0.0.50".to_string(),
            raw_block: raw.to_string(),
            created_by: "admin".to_string(),
        }
    }

    #[test]
    fn test_render_dhcp_subnet_block() {
        let block = render_dhcp_subnet_block("10.0.0.0", "255.255.255.0", "10.0.0.1", "10.0.0.100", "10.0.0.200", "10.0.0.1");
        assert_eq!(
            block,
            "subnet 10.0.0.0 netmask 255.255.255.0 { option routers 10.0.0.1; range 10.0.0.100 10.0.0.200; option domain-name-servers 10.0.0.1; }"
        );
    }

    #[test]
    fn test_render_dhcp_host_line() {
        assert_eq!(
            render_dhcp_host_line("web01", "00:11:22:33:44:55", "10.0.0.50"),
            "host web01 { hardware ethernet 00:11:22:33:44:55; fixed-address 10.0.0.50; }"
        );
    }

    #[test]
    fn test_parse_dhcpd_blocks_roundtrip() {
        let subnet_block = render_dhcp_subnet_block("10.0.0.0", "255.255.255.0", "10.0.0.1", "10.0.0.100", "10.0.0.200", "10.0.0.1");
        let host_block = render_dhcp_host_line("web01", "00:11:22:33:44:55", "10.0.0.50");
        let contents = format!("{subnet_block}\n{host_block}\n");

        let (subnets, hosts) = parse_dhcpd_blocks(&contents);
        assert_eq!(subnets, vec![subnet_block.clone()]);
        assert_eq!(hosts, vec![host_block.clone()]);

        let (net, netmask, routers, range_start, range_end, dns) = parse_dhcp_subnet_block(&subnet_block).unwrap();
        assert_eq!((net.as_str(), netmask.as_str(), routers.as_str()), ("10.0.0.0", "255.255.255.0", "10.0.0.1"));
        assert_eq!((range_start.as_str(), range_end.as_str()), ("10.0.0.100", "10.0.0.200"));
        assert_eq!(dns, "10.0.0.1");

        let (name, mac, ip) = parse_dhcp_host_block(&host_block).unwrap();
        assert_eq!((name.as_str(), mac.as_str(), ip.as_str()), ("web01", "00:11:22:33:44:55", "10.0.0.50"));
    }

    #[test]
    fn test_parse_dhcp_subnet_block_tolerates_field_order() {
        let block = "subnet 10.0.0.0 netmask 255.255.255.0 { range 10.0.0.100 10.0.0.200; option domain-name-servers 10.0.0.1; option routers 10.0.0.1; }";
        let (net, _netmask, routers, range_start, ..) = parse_dhcp_subnet_block(block).unwrap();
        assert_eq!(net, "10.0.0.0");
        assert_eq!(routers, "10.0.0.1");
        assert_eq!(range_start, "10.0.0.100");
    }

    #[test]
    fn test_reconcile_dhcp_imports_unknown_host_and_flags_stale() {
        let raw = render_dhcp_host_line("web01", "00:11:22:33:44:55", "10.0.0.50");
        let db_hosts = vec![host("h1", "host gone { hardware ethernet aa:bb:cc:dd:ee:ff; fixed-address 10.0.0.99; }")];
        let file = format!("{raw}\n");

        let recon = reconcile_dhcp(None, &db_hosts, &file);
        assert_eq!(recon.hosts_to_import.len(), 1);
        assert_eq!(recon.hosts_to_import[0].hostname, "web01");
        assert_eq!(recon.stale_host_ids, vec!["h1".to_string()]);
    }

    #[test]
    fn test_reconcile_dhcp_imports_unknown_subnet() {
        let raw = render_dhcp_subnet_block("10.0.0.0", "255.255.255.0", "10.0.0.1", "10.0.0.100", "10.0.0.200", "10.0.0.1");
        let file = format!("{raw}\n");

        let recon = reconcile_dhcp(None, &[], &file);
        let imported = recon.subnet_to_import.expect("subnet block should be imported");
        assert_eq!(imported.net, "10.0.0.0");
        assert_eq!(imported.raw_block, raw);
        assert!(!recon.stale_subnet);
    }

    #[test]
    fn test_reconcile_dhcp_flags_stale_subnet() {
        let db_subnet = subnet("subnet 10.0.0.0 netmask 255.255.255.0 { option routers 10.0.0.1; range 10.0.0.100 10.0.0.200; option domain-name-servers 10.0.0.1; }");
        let recon = reconcile_dhcp(Some(&db_subnet), &[], "");
        assert!(recon.stale_subnet);
    }

    #[tokio::test]
    async fn test_resolve_dhcp_fmri_prefers_server_instance() {
        let runner = MockCommandRunner::new();
        runner.on_success("svcs", &["-H", "-o", "fmri", "dhcp/server:ipv4"], "svc:/network/dhcp/server:ipv4\n");
        assert_eq!(resolve_dhcp_fmri(&runner).await.unwrap(), "dhcp/server:ipv4");
    }

    #[tokio::test]
    async fn test_resolve_dhcp_fmri_falls_back_to_legacy_instance() {
        let runner = MockCommandRunner::new();
        runner.on_failure("svcs", &["-H", "-o", "fmri", "dhcp/server:ipv4"], "not found", 1);
        runner.on_success("svcs", &["-H", "-o", "fmri", "dhcp:ipv4"], "svc:/network/dhcp:ipv4\n");
        assert_eq!(resolve_dhcp_fmri(&runner).await.unwrap(), "dhcp:ipv4");
    }

    #[tokio::test]
    async fn test_sync_dhcp_config_writes_and_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dhcpd.conf");
        let runner = MockCommandRunner::new();
        runner.on_success("svcs", &["-H", "-o", "fmri", "dhcp/server:ipv4"], "svc:/network/dhcp/server:ipv4\n");
        runner.on_success("svcadm", &["refresh", "dhcp/server:ipv4"], "");
        runner.on_success("svcadm", &["disable", "dhcp/server:ipv4"], "");
        runner.on_success("svcadm", &["enable", "dhcp/server:ipv4"], "");

        let db_subnet = subnet(render_dhcp_subnet_block("10.0.0.0", "255.255.255.0", "10.0.0.1", "10.0.0.100", "10.0.0.200", "10.0.0.1").as_str());
        sync_dhcp_config(&runner, &path.to_string_lossy(), "", Some(&db_subnet), &[]).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.contains("subnet 10.0.0.0 netmask 255.255.255.0"));
    }
}
