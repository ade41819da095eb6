use crate::command::{CommandOutput, CommandRunner, RunOptions};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Canned command runner for tests. Maps an exact `"program arg1 arg2 ..."`
/// line (privileged or not, `pfexec` stripped) to the response it should
/// produce, and records every invocation so tests can assert on call order
/// without shelling out to `zoneadm`/`zfs`/`zadm` for real.
#[derive(Default)]
pub struct MockCommandRunner {
    responses: Mutex<HashMap<String, CommandOutput>>,
    calls: Mutex<Vec<String>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn cmd_line(program: &str, args: &[&str]) -> String {
        let mut line = program.to_string();
        for a in args {
            line.push(' ');
            line.push_str(a);
        }
        line
    }

    /// Register the output to return the next time `program args...` is run.
    pub fn on(&self, program: &str, args: &[&str], output: CommandOutput) {
        self.responses
            .lock()
            .unwrap()
            .insert(Self::cmd_line(program, args), output);
    }

    pub fn on_success(&self, program: &str, args: &[&str], stdout: impl Into<String>) {
        self.on(
            program,
            args,
            CommandOutput {
                success: true,
                stdout: stdout.into(),
                stderr: String::new(),
                exit_code: Some(0),
                error: None,
            },
        );
    }

    pub fn on_failure(&self, program: &str, args: &[&str], stderr: impl Into<String>, exit_code: i32) {
        self.on(
            program,
            args,
            CommandOutput {
                success: false,
                stdout: String::new(),
                stderr: stderr.into(),
                exit_code: Some(exit_code),
                error: None,
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, program: &str, args: &[&str], _opts: RunOptions) -> CommandOutput {
        let line = Self::cmd_line(program, args);
        self.calls.lock().unwrap().push(line.clone());
        debug!(command = %line, "mock command invoked");

        self.responses.lock().unwrap().get(&line).cloned().unwrap_or(CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: format!("mock: no canned response registered for `{line}`"),
            exit_code: Some(127),
            error: Some(format!("unregistered mock command: {line}")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registered_response_is_returned() {
        let runner = MockCommandRunner::new();
        runner.on_success("zoneadm", &["list", "-cp"], "1:web01:running:/zones/web01:...");

        let out = runner.run_default("zoneadm", &["list", "-cp"]).await;
        assert!(out.success);
        assert!(out.stdout.contains("web01"));
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_command_fails_cleanly() {
        let runner = MockCommandRunner::new();
        let out = runner.run_default("zoneadm", &["list"]).await;
        assert!(!out.success);
        assert!(out.error.unwrap().contains("unregistered"));
    }

    #[tokio::test]
    async fn test_calls_are_recorded_in_order() {
        let runner = MockCommandRunner::new();
        runner.on_success("zoneadm", &["boot", "web01"], "");
        runner.on_success("zlogin", &["-C", "web01"], "");

        runner.run_default("zoneadm", &["boot", "web01"]).await;
        runner.run_default("zlogin", &["-C", "web01"]).await;

        assert_eq!(runner.calls(), vec!["zoneadm boot web01", "zlogin -C web01"]);
    }
}
