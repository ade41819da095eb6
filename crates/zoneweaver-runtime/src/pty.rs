//! One shared PTY per zone console (`bash -c "pfexec zlogin -C <zone>"`),
//! fanned out to any number of subscribers (WebSocket viewers, the Recipe
//! Interpreter) and idle-GC'd after a period of disuse.

use crate::error::{Result, RuntimeError};
use chrono::{DateTime, Utc};
use nix::pty::{forkpty, Winsize};
use nix::unistd::ForkResult;
use regex::Regex;
use std::collections::HashMap;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, warn};

const BUFFER_CAP: usize = 100_000;
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const IDLE_GC_INTERVAL: Duration = Duration::from_secs(300);
const IDLE_GC_THRESHOLD: Duration = Duration::from_secs(600);

fn ansi_regex() -> &'static Regex {
    use std::sync::OnceLock;
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]|\x1b\][^\x07]*\x07|\x1b[@-_]").unwrap())
}

fn strip_ansi(input: &str) -> String {
    ansi_regex().replace_all(input, "").to_string()
}

fn tail_truncate(buf: &mut String, cap: usize) {
    if buf.len() > cap {
        let start = buf.len() - cap;
        // Don't split a UTF-8 code point.
        let safe_start = (start..buf.len()).find(|&i| buf.is_char_boundary(i)).unwrap_or(buf.len());
        *buf = buf[safe_start..].to_string();
    }
}

struct PtyHandle {
    master_fd: RawFd,
    child_pid: nix::unistd::Pid,
}

/// Live state for one zone's console PTY.
pub struct PtySession {
    zone_name: String,
    handle: Mutex<Option<PtyHandle>>,
    raw_buffer: RwLock<String>,
    stripped_buffer: RwLock<String>,
    subscribers: broadcast::Sender<Vec<u8>>,
    automation_active: std::sync::atomic::AtomicBool,
    pid: std::sync::atomic::AtomicI32,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
}

impl PtySession {
    fn new(zone_name: String) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(256);
        Arc::new(Self {
            zone_name,
            handle: Mutex::new(None),
            raw_buffer: RwLock::new(String::new()),
            stripped_buffer: RwLock::new(String::new()),
            subscribers: tx,
            automation_active: std::sync::atomic::AtomicBool::new(false),
            pid: std::sync::atomic::AtomicI32::new(0),
            created_at: Utc::now(),
            last_activity: RwLock::new(Utc::now()),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.pid.load(std::sync::atomic::Ordering::Relaxed) != 0
            && self
                .handle
                .try_lock()
                .map(|h| h.is_some())
                .unwrap_or(true)
    }

    async fn on_data(&self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk).to_string();
        {
            let mut raw = self.raw_buffer.write().await;
            raw.push_str(&text);
            tail_truncate(&mut raw, BUFFER_CAP);
        }
        {
            let mut stripped = self.stripped_buffer.write().await;
            stripped.push_str(&strip_ansi(&text));
            tail_truncate(&mut stripped, BUFFER_CAP);
        }
        *self.last_activity.write().await = Utc::now();
        // Subscriber exceptions are logged, not propagated: broadcast::send
        // itself cannot panic, so there is nothing here to catch besides a
        // "no receivers" condition, which is expected and harmless.
        let _ = self.subscribers.send(chunk.to_vec());
    }

    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let guard = self.handle.lock().await;
        let Some(handle) = guard.as_ref() else {
            return Err(RuntimeError::pty_error(&self.zone_name, "PTY is not alive"));
        };
        let fd = handle.master_fd;
        let owned = data.to_vec();
        tokio::task::spawn_blocking(move || nix::unistd::write(fd, &owned))
            .await
            .map_err(|e| RuntimeError::pty_error("", e.to_string()))?
            .map_err(|e| RuntimeError::pty_error("", e.to_string()))?;
        *self.last_activity.write().await = Utc::now();
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.subscribers.subscribe()
    }

    pub async fn clear_buffer(&self) {
        self.stripped_buffer.write().await.clear();
        self.raw_buffer.write().await.clear();
    }

    pub fn set_automation_active(&self, active: bool) {
        self.automation_active.store(active, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn automation_active(&self) -> bool {
        self.automation_active.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read().await
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.receiver_count()
    }

    /// Search the stripped buffer for `literal`, escaped into a regex
    /// unless `use_regex` is set, polling every 250ms until it matches or
    /// `min(now + timeout, global_deadline)` passes.
    pub async fn wait_for_pattern(
        &self,
        literal: &str,
        timeout_ms: u64,
        global_deadline: DateTime<Utc>,
        use_regex: bool,
    ) -> Result<String> {
        let pattern = if use_regex { literal.to_string() } else { regex::escape(literal) };
        let re = Regex::new(&pattern).map_err(|e| RuntimeError::pty_error(&self.zone_name, format!("bad pattern: {e}")))?;

        let local_deadline = Utc::now() + chrono::Duration::milliseconds(timeout_ms as i64);
        let deadline = local_deadline.min(global_deadline);

        loop {
            {
                let stripped = self.stripped_buffer.read().await;
                if let Some(m) = re.find(&stripped) {
                    return Ok(stripped[..m.end()].to_string());
                }
            }
            if Utc::now() >= deadline {
                return Err(RuntimeError::pty_error(
                    &self.zone_name,
                    format!("timed out waiting for pattern `{literal}`"),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn kill(&self) {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.take() {
            let _ = nix::unistd::write(handle.master_fd, b"~.\r\n");
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = nix::sys::signal::kill(handle.child_pid, nix::sys::signal::Signal::SIGKILL);
            let _ = nix::unistd::close(handle.master_fd);
        }
        self.pid.store(0, std::sync::atomic::Ordering::Relaxed);
    }
}

/// Process-wide registry of live zone console PTYs.
pub struct PtyMultiplexer {
    sessions: RwLock<HashMap<String, Arc<PtySession>>>,
}

impl Default for PtyMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl PtyMultiplexer {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Spawn (or return the existing) console PTY for `zone_name`.
    pub async fn open(&self, zone_name: &str, cols: u16, rows: u16) -> Result<Arc<PtySession>> {
        if let Some(existing) = self.sessions.read().await.get(zone_name) {
            if existing.is_alive() {
                return Ok(Arc::clone(existing));
            }
        }

        let session = PtySession::new(zone_name.to_string());
        let winsize = Winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        // SAFETY: forkpty's child branch only calls async-signal-safe
        // functions (execvp) before replacing the process image.
        let fork_result = unsafe { forkpty(Some(&winsize), None) }
            .map_err(|e| RuntimeError::pty_error(zone_name, format!("forkpty failed: {e}")))?;

        match fork_result.fork_result {
            ForkResult::Parent { child } => {
                let master_fd = fork_result.master.as_raw_fd();
                {
                    let mut guard = session.handle.lock().await;
                    *guard = Some(PtyHandle { master_fd, child_pid: child });
                }
                session.pid.store(child.as_raw(), std::sync::atomic::Ordering::Relaxed);
                std::mem::forget(fork_result.master);
                self.spawn_reader(Arc::clone(&session), master_fd);
                self.sessions.write().await.insert(zone_name.to_string(), Arc::clone(&session));
                debug!(zone = zone_name, pid = child.as_raw(), "opened console PTY");
                Ok(session)
            }
            ForkResult::Child => {
                let cmd = format!("pfexec zlogin -C {zone_name}");
                std::env::set_var("TERM", "xterm-color");
                let err = std::process::Command::new("bash").arg("-c").arg(&cmd).exec_replace();
                // exec_replace never returns on success.
                error!("exec of console shell failed: {err}");
                std::process::exit(127);
            }
        }
    }

    fn spawn_reader(&self, session: Arc<PtySession>, master_fd: RawFd) {
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 4096];
            loop {
                match nix::unistd::read(master_fd, &mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = buf[..n].to_vec();
                        let session = Arc::clone(&session);
                        tokio::runtime::Handle::current().block_on(async move {
                            session.on_data(&chunk).await;
                        });
                    }
                    Err(nix::errno::Errno::EAGAIN) => {
                        std::thread::sleep(Duration::from_millis(20));
                    }
                    Err(_) => break,
                }
            }
            tokio::runtime::Handle::current().block_on(session.kill());
        });
    }

    pub async fn get(&self, zone_name: &str) -> Option<Arc<PtySession>> {
        self.sessions.read().await.get(zone_name).cloned()
    }

    pub async fn close(&self, zone_name: &str) {
        if let Some(session) = self.sessions.write().await.remove(zone_name) {
            session.kill().await;
        }
    }

    /// Destroy any session with zero subscribers, automation inactive, and
    /// idle past the 10-minute threshold. Intended to run every 5 minutes.
    pub async fn idle_gc(&self) {
        let candidates: Vec<String> = {
            let sessions = self.sessions.read().await;
            let mut names = Vec::new();
            for (name, session) in sessions.iter() {
                if session.subscriber_count() > 0 || session.automation_active() {
                    continue;
                }
                if Utc::now() - session.last_activity().await > chrono::Duration::from_std(IDLE_GC_THRESHOLD).unwrap() {
                    names.push(name.clone());
                }
            }
            names
        };

        for name in candidates {
            warn!(zone = %name, "idle-GC closing console PTY");
            self.close(&name).await;
        }
    }

    pub fn idle_gc_interval() -> Duration {
        IDLE_GC_INTERVAL
    }
}

use std::os::unix::process::CommandExt as _;

trait ExecReplace {
    fn exec_replace(&mut self) -> std::io::Error;
}

impl ExecReplace for std::process::Command {
    fn exec_replace(&mut self) -> std::io::Error {
        self.exec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_removes_csi_sequences() {
        let input = "\x1b[31mhello\x1b[0m world";
        assert_eq!(strip_ansi(input), "hello world");
    }

    #[test]
    fn test_tail_truncate_caps_length() {
        let mut s = "a".repeat(150_000);
        tail_truncate(&mut s, BUFFER_CAP);
        assert_eq!(s.len(), BUFFER_CAP);
    }

    #[tokio::test]
    async fn test_on_data_appends_both_buffers() {
        let session = PtySession::new("web01".to_string());
        session.on_data(b"\x1b[32mlogin: \x1b[0m").await;
        assert_eq!(session.stripped_buffer.read().await.as_str(), "login: ");
        assert!(session.raw_buffer.read().await.contains("\x1b[32m"));
    }

    #[tokio::test]
    async fn test_wait_for_pattern_finds_literal() {
        let session = PtySession::new("web01".to_string());
        session.on_data(b"booting...\nlogin: ").await;
        let deadline = Utc::now() + chrono::Duration::seconds(5);
        let matched = session.wait_for_pattern("login:", 1000, deadline, false).await.unwrap();
        assert!(matched.ends_with("login:"));
    }

    #[tokio::test]
    async fn test_wait_for_pattern_times_out() {
        let session = PtySession::new("web01".to_string());
        let deadline = Utc::now() + chrono::Duration::seconds(5);
        let result = session.wait_for_pattern("never-appears", 100, deadline, false).await;
        assert!(result.is_err());
    }
}
