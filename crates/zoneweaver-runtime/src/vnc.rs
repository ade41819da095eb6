//! Per-zone lifecycle of external `zadm vnc` processes: port allocation,
//! PID-file ownership, HTTP health probing and reverse proxy, and
//! smart/periodic cleanup.

use crate::command::CommandRunner;
use crate::error::{Result, RuntimeError};
use crate::supervisor::ProcessSupervisor;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{info, warn};
use zoneweaver_core::{VncSession, VncStatus};

const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8100;
const STARTUP_PROBE_ATTEMPTS: usize = 15;
const STARTUP_PROBE_INTERVAL: std::time::Duration = std::time::Duration::from_millis(500);
const REUSE_PROBE_ATTEMPTS: usize = 3;
const DEFAULT_SESSION_TIMEOUT: chrono::Duration = chrono::Duration::seconds(1800);

/// The 5-line PID file written at `./vnc_sessions/<zone>.pid`.
#[derive(Debug, Clone)]
pub struct PidFileRecord {
    pub pid: u32,
    pub command: String,
    pub timestamp: DateTime<Utc>,
    pub zone: String,
    pub host_port: String,
}

impl PidFileRecord {
    pub fn to_file_contents(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}\n",
            self.pid,
            self.command,
            self.timestamp.to_rfc3339(),
            self.zone,
            self.host_port
        )
    }

    pub fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.lines();
        let pid = lines.next()?.trim().parse().ok()?;
        let command = lines.next()?.trim().to_string();
        let timestamp = DateTime::parse_from_rfc3339(lines.next()?.trim()).ok()?.with_timezone(&Utc);
        let zone = lines.next()?.trim().to_string();
        let host_port = lines.next()?.trim().to_string();
        Some(Self { pid, command, timestamp, zone, host_port })
    }
}

/// Tracks live-connection-id sets per zone for "is this the last client?"
/// decisions in smart cleanup. Process-local; need not persist.
#[derive(Default)]
pub struct ConnectionTracker {
    connections: RwLock<HashMap<String, HashSet<String>>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, zone: &str, conn_id: &str) {
        self.connections.write().await.entry(zone.to_string()).or_default().insert(conn_id.to_string());
    }

    pub async fn remove(&self, zone: &str, conn_id: &str) -> bool {
        let mut map = self.connections.write().await;
        if let Some(set) = map.get_mut(zone) {
            set.remove(conn_id);
            if set.is_empty() {
                map.remove(zone);
                return true;
            }
        }
        false
    }

    pub async fn is_last_client(&self, zone: &str) -> bool {
        self.connections.read().await.get(zone).map(|s| s.is_empty()).unwrap_or(true)
    }
}

pub struct VncSupervisor<R: CommandRunner> {
    supervisor: ProcessSupervisor<R>,
    pid_dir: PathBuf,
    http: reqwest::Client,
}

impl<R: CommandRunner + Clone> VncSupervisor<R> {
    pub fn new(runner: R, pid_dir: impl Into<PathBuf>) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(runner),
            pid_dir: pid_dir.into(),
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(3))
                .build()
                .expect("reqwest client"),
        }
    }

    fn pid_file_path(&self, zone_name: &str) -> PathBuf {
        self.pid_dir.join(format!("{zone_name}.pid"))
    }

    async fn read_pid_file(&self, zone_name: &str) -> Option<PidFileRecord> {
        let contents = tokio::fs::read_to_string(self.pid_file_path(zone_name)).await.ok()?;
        PidFileRecord::parse(&contents)
    }

    async fn write_pid_file(&self, record: &PidFileRecord) -> Result<()> {
        tokio::fs::write(self.pid_file_path(&record.zone), record.to_file_contents())
            .await
            .map_err(|e| RuntimeError::internal_error(format!("writing VNC PID file: {e}")))
    }

    async fn remove_pid_file(&self, zone_name: &str) {
        let _ = tokio::fs::remove_file(self.pid_file_path(zone_name)).await;
    }

    async fn probe_http(&self, port: u16) -> bool {
        self.http
            .get(format!("http://127.0.0.1:{port}/"))
            .send()
            .await
            .map(|r| r.status().is_success() || r.status().is_redirection())
            .unwrap_or(false)
    }

    async fn port_is_free(&self, port: u16) -> Result<bool> {
        let in_use_by_process = !self
            .supervisor
            .find_by_pattern(&format!(r"zadm vnc.*-w 0\.0\.0\.0:{port}\b"))
            .await?
            .is_empty();
        if in_use_by_process {
            return Ok(false);
        }
        Ok(TcpListener::bind(("127.0.0.1", port)).await.is_ok())
    }

    async fn find_free_port(&self, db_has_active: impl Fn(u16) -> bool) -> Result<u16> {
        for port in PORT_RANGE {
            if db_has_active(port) {
                continue;
            }
            if self.port_is_free(port).await? {
                return Ok(port);
            }
        }
        Err(RuntimeError::vnc_ports_exhausted(*PORT_RANGE.start(), *PORT_RANGE.end()))
    }

    /// Start (or reuse) a VNC session for `zone_name`. `db_has_active`
    /// tells the port scan which ports the database already considers
    /// `active`; `host_ip` is the address written into the session record.
    pub async fn start(&self, zone_name: &str, host_ip: &str, db_has_active: impl Fn(u16) -> bool) -> Result<VncSession> {
        if let Some(existing) = self.read_pid_file(zone_name).await {
            if self.supervisor.alive(existing.pid) {
                for _ in 0..REUSE_PROBE_ATTEMPTS {
                    let port: u16 = existing.host_port.rsplit(':').next().and_then(|p| p.parse().ok()).unwrap_or(0);
                    if self.probe_http(port).await {
                        return Ok(self.session_from_pid_record(&existing, port));
                    }
                }
                // Unresponsive despite a live PID: reclaim the session.
                self.supervisor.kill(existing.pid, false).await?;
            }
            self.remove_pid_file(zone_name).await;
        }

        let port = self.find_free_port(db_has_active).await?;
        let bind = format!("0.0.0.0:{port}");
        let pid = self.supervisor.spawn_detached("pfexec", &["zadm", "vnc", "-w", &bind, zone_name])?;

        let record = PidFileRecord {
            pid,
            command: format!("pfexec zadm vnc -w {bind} {zone_name}"),
            timestamp: Utc::now(),
            zone: zone_name.to_string(),
            host_port: format!("{host_ip}:{port}"),
        };
        self.write_pid_file(&record).await?;

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        if !self.supervisor.alive(pid) {
            self.remove_pid_file(zone_name).await;
            return Err(RuntimeError::zone_operation_failed(
                zone_name,
                "zadm vnc exited immediately after start (address in use?)",
            ));
        }

        let mut reachable = false;
        for _ in 0..STARTUP_PROBE_ATTEMPTS {
            if self.probe_http(port).await {
                reachable = true;
                break;
            }
            tokio::time::sleep(STARTUP_PROBE_INTERVAL).await;
        }

        if !reachable {
            self.supervisor.kill(pid, true).await?;
            self.remove_pid_file(zone_name).await;
            return Err(RuntimeError::zone_operation_failed(zone_name, "VNC console never became reachable"));
        }

        info!(zone = zone_name, port, "VNC session started");
        Ok(self.session_from_pid_record(&record, port))
    }

    fn session_from_pid_record(&self, record: &PidFileRecord, port: u16) -> VncSession {
        VncSession {
            id: uuid::Uuid::new_v4().to_string(),
            zone_name: record.zone.clone(),
            web_port: port,
            host_ip: record.host_port.rsplit_once(':').map(|(h, _)| h.to_string()).unwrap_or_default(),
            process_id: record.pid,
            status: VncStatus::Active,
            created_at: record.timestamp,
            last_accessed: Utc::now(),
        }
    }

    /// Adopt an orphan `zadm vnc` process that has no PID file (e.g. after
    /// a crash), writing a fresh PID file for it.
    pub async fn adopt_orphan(&self, zone_name: &str) -> Result<Option<VncSession>> {
        if self.read_pid_file(zone_name).await.is_some() {
            return Ok(None);
        }

        let pattern = format!(r"zadm vnc -w 0\.0\.0\.0:(\d+) {}\b", regex::escape(zone_name));
        let matches = self.supervisor.find_by_pattern(&pattern).await?;
        let Some(found) = matches.into_iter().next() else { return Ok(None) };

        let re = regex::Regex::new(&pattern).unwrap();
        let port: u16 = re
            .captures(&found.command)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| RuntimeError::internal_error("could not recover port from orphaned zadm vnc command line"))?;

        let record = PidFileRecord {
            pid: found.pid as u32,
            command: found.command,
            timestamp: Utc::now(),
            zone: zone_name.to_string(),
            host_port: format!("127.0.0.1:{port}"),
        };
        self.write_pid_file(&record).await?;
        info!(zone = zone_name, pid = found.pid, "adopted orphaned VNC process");
        Ok(Some(self.session_from_pid_record(&record, port)))
    }

    pub async fn kill(&self, zone_name: &str) -> Result<()> {
        if let Some(record) = self.read_pid_file(zone_name).await {
            self.supervisor.kill(record.pid, false).await?;
        }
        self.remove_pid_file(zone_name).await;
        Ok(())
    }

    /// Periodic cleanup: stale-pid-file GC plus callers of this method are
    /// expected to separately mark/delete DB rows past `session_timeout`.
    pub async fn periodic_cleanup(&self, zone_names: &[String]) -> Result<Vec<String>> {
        let mut stale = Vec::new();
        for zone in zone_names {
            if let Some(record) = self.read_pid_file(zone).await {
                if !self.supervisor.alive(record.pid) {
                    self.remove_pid_file(zone).await;
                    stale.push(zone.clone());
                }
            }
        }
        Ok(stale)
    }

    pub fn session_timeout() -> chrono::Duration {
        DEFAULT_SESSION_TIMEOUT
    }

    pub async fn proxy_path(&self, port: u16, path: &str) -> Result<(reqwest::StatusCode, Vec<u8>, Option<String>)> {
        let url = format!("http://127.0.0.1:{port}/{}", path.trim_start_matches('/'));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RuntimeError::network_error(format!("VNC proxy upstream failed: {e}")))?;
        let status = resp.status();
        let content_type = resp.headers().get("content-type").and_then(|v| v.to_str().ok()).map(str::to_string);
        let body = resp.bytes().await.map_err(|e| RuntimeError::network_error(e.to_string()))?.to_vec();
        Ok((status, body, content_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_file_roundtrip() {
        let record = PidFileRecord {
            pid: 1234,
            command: "pfexec zadm vnc -w 0.0.0.0:8001 web01".to_string(),
            timestamp: Utc::now(),
            zone: "web01".to_string(),
            host_port: "127.0.0.1:8001".to_string(),
        };
        let contents = record.to_file_contents();
        let parsed = PidFileRecord::parse(&contents).unwrap();
        assert_eq!(parsed.pid, 1234);
        assert_eq!(parsed.zone, "web01");
        assert_eq!(parsed.host_port, "127.0.0.1:8001");
    }

    #[test]
    fn test_pid_file_parse_rejects_truncated_file() {
        assert!(PidFileRecord::parse("1234\ncmd\n").is_none());
    }

    #[tokio::test]
    async fn test_connection_tracker_last_client() {
        let tracker = ConnectionTracker::new();
        tracker.add("web01", "conn-a").await;
        tracker.add("web01", "conn-b").await;
        assert!(!tracker.is_last_client("web01").await);
        tracker.remove("web01", "conn-a").await;
        assert!(!tracker.is_last_client("web01").await);
        assert!(tracker.remove("web01", "conn-b").await);
        assert!(tracker.is_last_client("web01").await);
    }
}
