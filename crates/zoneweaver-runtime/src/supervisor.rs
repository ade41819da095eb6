use crate::command::{CommandRunner, RunOptions};
use crate::error::{Result, RuntimeError};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

/// One line of `ps auxww` output, as returned by [`ProcessSupervisor::find_by_pattern`].
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: i32,
    pub command: String,
}

/// Spawns, signals, and reaps detached processes — primarily `zadm vnc`
/// sessions, which the VNC Supervisor keeps alive across task completions
/// and must be able to find and kill again later by pid or by command-line
/// pattern after a restart.
pub struct ProcessSupervisor<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> ProcessSupervisor<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Spawn `program args...` detached from this process (own session),
    /// returning its pid immediately without waiting for it to exit.
    pub fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<u32> {
        let mut cmd = std::process::Command::new(program);
        cmd.args(args);
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::null());

        // SAFETY: setsid() is async-signal-safe and the closure runs in the
        // forked child before exec, with no other threads sharing its state.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .map_err(|e| RuntimeError::internal_error(format!("failed to spawn {program}: {e}")))?;
        let pid = child.id().ok_or_else(|| RuntimeError::internal_error("spawned process has no pid"))?;
        debug!(pid, program, "spawned detached process");
        // Intentionally leak the Child handle: we track liveness by pid via
        // signal-0 probes, not by holding a waitable handle.
        std::mem::forget(child);
        Ok(pid)
    }

    /// True if `pid` is alive, probed via `kill(pid, 0)`.
    pub fn alive(&self, pid: u32) -> bool {
        signal::kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    /// Send `signal` to `pid` without waiting for it to act on it.
    pub fn signal(&self, pid: u32, sig: Signal) -> Result<()> {
        signal::kill(Pid::from_raw(pid as i32), sig)
            .map_err(|e| RuntimeError::internal_error(format!("kill({pid}, {sig}) failed: {e}")))
    }

    /// Terminate `pid`: SIGTERM, wait up to 2s polling for exit, then
    /// SIGKILL if it is still alive. `force` skips straight to SIGKILL.
    pub async fn kill(&self, pid: u32, force: bool) -> Result<()> {
        if !self.alive(pid) {
            return Ok(());
        }

        if force {
            self.signal(pid, Signal::SIGKILL)?;
            return Ok(());
        }

        self.signal(pid, Signal::SIGTERM)?;
        let deadline = Duration::from_secs(2);
        let step = Duration::from_millis(100);
        let mut waited = Duration::ZERO;
        while waited < deadline {
            tokio::time::sleep(step).await;
            waited += step;
            if !self.alive(pid) {
                return Ok(());
            }
        }

        warn!(pid, "process still alive after SIGTERM, sending SIGKILL");
        self.signal(pid, Signal::SIGKILL)?;
        Ok(())
    }

    /// Scrape `ps auxww` for every line whose command column matches `pattern`.
    pub async fn find_by_pattern(&self, pattern: &str) -> Result<Vec<ProcessInfo>> {
        let re = Regex::new(pattern).map_err(|e| RuntimeError::internal_error(format!("bad pattern `{pattern}`: {e}")))?;
        let out = self
            .runner
            .run("ps", &["auxww"], RunOptions::default().unprivileged())
            .await;
        if !out.success {
            return Err(RuntimeError::internal_error(format!(
                "ps auxww failed: {}",
                out.error.unwrap_or_default()
            )));
        }

        let mut matches = Vec::new();
        for line in out.stdout.lines().skip(1) {
            let mut fields = line.split_whitespace();
            let Some(pid_str) = fields.next() else { continue };
            let Ok(pid) = pid_str.parse::<i32>() else { continue };
            // ps auxww: USER PID %CPU %MEM VSZ RSS TT S STIME TIME COMMAND...
            let command = line.splitn(11, char::is_whitespace).last().unwrap_or("").trim().to_string();
            if re.is_match(&command) {
                matches.push(ProcessInfo { pid, command });
            }
        }
        Ok(matches)
    }

    /// `pgrep -f pattern`, returning the matched pids.
    pub async fn pgrep_pattern(&self, pattern: &str) -> Result<Vec<u32>> {
        let out = self.runner.run("pgrep", &["-f", pattern], RunOptions::default().unprivileged()).await;
        if out.exit_code == Some(1) {
            // pgrep exits 1 when nothing matches; that's not an error here.
            return Ok(Vec::new());
        }
        if !out.success {
            return Err(RuntimeError::internal_error(format!(
                "pgrep -f {pattern} failed: {}",
                out.error.unwrap_or_default()
            )));
        }
        Ok(out.stdout.lines().filter_map(|l| l.trim().parse::<u32>().ok()).collect())
    }

    pub async fn kill_by_pattern(&self, pattern: &str, force: bool) -> Result<usize> {
        let pids = self.pgrep_pattern(pattern).await?;
        for pid in &pids {
            self.kill(*pid, force).await?;
        }
        Ok(pids.len())
    }
}

use std::os::unix::process::CommandExt;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SystemCommandRunner;

    #[test]
    fn test_alive_for_current_process() {
        let sup = ProcessSupervisor::new(SystemCommandRunner::new());
        assert!(sup.alive(std::process::id()));
    }

    #[test]
    fn test_alive_for_bogus_pid() {
        let sup = ProcessSupervisor::new(SystemCommandRunner::new());
        assert!(!sup.alive(999_999));
    }

    #[tokio::test]
    async fn test_spawn_detached_and_kill() {
        let sup = ProcessSupervisor::new(SystemCommandRunner::new());
        let pid = sup.spawn_detached("/bin/sleep", &["30"]).unwrap();
        assert!(sup.alive(pid));
        sup.kill(pid, true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!sup.alive(pid));
    }

    #[tokio::test]
    async fn test_find_by_pattern_matches_ps_output() {
        let sup = ProcessSupervisor::new(SystemCommandRunner::new());
        let pid = sup.spawn_detached("/bin/sleep", &["30"]).unwrap();
        let matches = sup.find_by_pattern("sleep 30").await.unwrap();
        assert!(matches.iter().any(|p| p.pid == pid as i32));
        sup.kill(pid, true).await.unwrap();
    }
}
