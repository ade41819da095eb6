//! Expect-style execution of a `Recipe` (§3 data model) against a zone's
//! console PTY from [`crate::pty`].

use crate::error::{Result, RuntimeError};
use crate::pty::PtySession;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use zoneweaver_core::{Recipe, RecipeStep, TemplateMethod};

const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Default, Clone)]
pub struct StepOutcome {
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub success: bool,
    pub output: Vec<String>,
    pub errors: Vec<String>,
    pub log: Vec<String>,
}

/// Substitute `{{name}}` placeholders from `vars`; unknown placeholders are
/// left untouched.
fn resolve(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find("}}") {
            let name = after[..end].trim();
            match vars.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    out.push_str("{{");
                    out.push_str(name);
                    out.push_str("}}");
                }
            }
            rest = &after[end + 2..];
        } else {
            out.push_str("{{");
            rest = after;
            break;
        }
    }
    out.push_str(rest);
    out
}

fn shell_single_quote_escape(value: &str) -> String {
    value.replace('\'', r"'\''")
}

pub struct RecipeInterpreter {
    global_timeout: chrono::Duration,
}

impl RecipeInterpreter {
    pub fn new(global_timeout: chrono::Duration) -> Self {
        Self { global_timeout }
    }

    pub async fn execute(
        &self,
        recipe: &Recipe,
        pty: Arc<PtySession>,
        caller_variables: HashMap<String, String>,
    ) -> Result<ExecutionReport> {
        let mut vars = recipe.variables.clone();
        vars.extend(caller_variables);
        vars.entry("login_prompt".to_string()).or_insert_with(|| recipe.login_prompt.clone());
        vars.entry("shell_prompt".to_string()).or_insert_with(|| recipe.shell_prompt.clone());
        vars.entry("boot_string".to_string()).or_insert_with(|| recipe.boot_string.clone());

        let recipe_deadline = Utc::now() + chrono::Duration::seconds(recipe.timeout_seconds as i64);
        let global_deadline = recipe_deadline.min(Utc::now() + self.global_timeout);

        let mut report = ExecutionReport { success: true, ..Default::default() };

        if !recipe.boot_string.is_empty() {
            let resolved = resolve(&recipe.boot_string, &vars);
            report.log.push(format!("waiting for boot string: {resolved}"));
            if let Err(e) = pty
                .wait_for_pattern(&resolved, recipe.timeout_seconds * 1000, global_deadline, false)
                .await
            {
                report.success = false;
                report.errors.push(e.to_string());
                self.finish(&pty).await;
                return Ok(report);
            }
            pty.write(b"\r\n").await?;
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }

        for step in &recipe.steps {
            let outcome = self.run_step(&pty, step, &vars, global_deadline).await;
            if let Some(out) = &outcome.output {
                report.output.push(out.clone());
            }
            if let Some(err) = &outcome.error {
                report.errors.push(err.clone());
            }
            report.log.push(format!("step {step:?} -> success={}", outcome.success));
            if !outcome.success {
                report.success = false;
                break;
            }
        }

        self.finish(&pty).await;
        Ok(report)
    }

    async fn finish(&self, pty: &PtySession) {
        pty.set_automation_active(false);
    }

    async fn run_step(
        &self,
        pty: &PtySession,
        step: &RecipeStep,
        vars: &HashMap<String, String>,
        global_deadline: DateTime<Utc>,
    ) -> StepOutcome {
        match step {
            RecipeStep::Wait { pattern, timeout_ms, regex } => {
                let resolved = resolve(pattern, vars);
                let timeout_ms = timeout_ms.unwrap_or(DEFAULT_STEP_TIMEOUT_MS);
                match pty.wait_for_pattern(&resolved, timeout_ms, global_deadline, *regex).await {
                    Ok(matched) => StepOutcome { success: true, output: Some(matched), error: None },
                    Err(e) => StepOutcome { success: false, output: None, error: Some(e.to_string()) },
                }
            }
            RecipeStep::Send { value } => {
                let resolved = resolve(value, vars);
                match pty.write(resolved.as_bytes()).await {
                    Ok(()) => StepOutcome { success: true, ..Default::default() },
                    Err(e) => StepOutcome { success: false, error: Some(e.to_string()), ..Default::default() },
                }
            }
            RecipeStep::Command { value, expect_prompt, check_exit_code, timeout_ms } => {
                let timeout_ms = timeout_ms.unwrap_or(DEFAULT_STEP_TIMEOUT_MS);
                self.run_command_step(pty, value, expect_prompt.as_deref(), *check_exit_code, timeout_ms, vars, global_deadline)
                    .await
            }
            RecipeStep::Template { dest, content, method, expect_prompt } => {
                self.run_template_step(pty, dest, content, *method, expect_prompt.as_deref(), vars, global_deadline)
                    .await
            }
            RecipeStep::Delay { seconds } => {
                tokio::time::sleep(std::time::Duration::from_secs(*seconds)).await;
                StepOutcome { success: true, ..Default::default() }
            }
        }
    }

    async fn run_command_step(
        &self,
        pty: &PtySession,
        value: &str,
        expect_prompt: Option<&str>,
        check_exit_code: bool,
        timeout_ms: u64,
        vars: &HashMap<String, String>,
        global_deadline: DateTime<Utc>,
    ) -> StepOutcome {
        pty.clear_buffer().await;
        let resolved = resolve(value, vars);
        let marker = format!("ZWEC_{}", Utc::now().timestamp_millis());
        let full = format!("{resolved}; echo \"{marker}:$?\"\r\n");

        if let Err(e) = pty.write(full.as_bytes()).await {
            return StepOutcome { success: false, error: Some(e.to_string()), ..Default::default() };
        }

        let pattern = format!(r"{marker}:\d+");
        let matched = match pty.wait_for_pattern(&pattern, timeout_ms, global_deadline, true).await {
            Ok(m) => m,
            Err(e) => return StepOutcome { success: false, error: Some(e.to_string()), ..Default::default() },
        };

        let exit_code: i32 = matched
            .rsplit(':')
            .next()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(-1);

        if check_exit_code && exit_code != 0 {
            return StepOutcome {
                success: false,
                output: Some(matched.clone()),
                error: Some(format!("command `{resolved}` exited {exit_code}")),
            };
        }

        let prompt = expect_prompt.map(|p| resolve(p, vars)).unwrap_or_else(|| vars.get("shell_prompt").cloned().unwrap_or_default());
        if !prompt.is_empty() {
            let prompt_deadline = Utc::now() + chrono::Duration::seconds(5);
            let _ = pty.wait_for_pattern(&prompt, 5000, prompt_deadline.min(global_deadline), false).await;
        }

        StepOutcome { success: true, output: Some(matched), error: None }
    }

    async fn run_template_step(
        &self,
        pty: &PtySession,
        dest: &str,
        content: &str,
        method: TemplateMethod,
        expect_prompt: Option<&str>,
        vars: &HashMap<String, String>,
        global_deadline: DateTime<Utc>,
    ) -> StepOutcome {
        let resolved_dest = resolve(dest, vars);
        let resolved_content = resolve(content, vars);

        let write_result = match method {
            TemplateMethod::EchoRedirect => {
                let mut lines = resolved_content.lines();
                let mut ok = true;
                if let Some(first) = lines.next() {
                    let cmd = format!("echo '{}' > {}\r\n", shell_single_quote_escape(first), resolved_dest);
                    ok = pty.write(cmd.as_bytes()).await.is_ok();
                }
                for line in lines {
                    if !ok {
                        break;
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    let cmd = format!("echo '{}' >> {}\r\n", shell_single_quote_escape(line), resolved_dest);
                    ok = pty.write(cmd.as_bytes()).await.is_ok();
                }
                ok
            }
            TemplateMethod::Heredoc => {
                let marker = format!("ZWEOD_{}", Utc::now().timestamp_millis());
                let mut body = format!("cat > {resolved_dest} << '{marker}'\r\n");
                body.push_str(&resolved_content);
                if !resolved_content.ends_with('\n') {
                    body.push_str("\r\n");
                }
                body.push_str(&marker);
                body.push_str("\r\n");
                pty.write(body.as_bytes()).await.is_ok()
            }
        };

        if !write_result {
            return StepOutcome { success: false, error: Some("failed writing template to PTY".to_string()), ..Default::default() };
        }

        let prompt = expect_prompt.map(|p| resolve(p, vars)).unwrap_or_else(|| vars.get("shell_prompt").cloned().unwrap_or_default());
        if !prompt.is_empty() {
            if let Err(e) = pty.wait_for_pattern(&prompt, 5000, global_deadline, false).await {
                return StepOutcome { success: false, error: Some(e.to_string()), ..Default::default() };
            }
        }

        StepOutcome { success: true, ..Default::default() }
    }
}

impl From<RuntimeError> for StepOutcome {
    fn from(e: RuntimeError) -> Self {
        StepOutcome { success: false, output: None, error: Some(e.to_string()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_substitutes_known_variables() {
        let mut vars = HashMap::new();
        vars.insert("shell_prompt".to_string(), "# ".to_string());
        assert_eq!(resolve("prompt is {{shell_prompt}}", &vars), "prompt is # ");
    }

    #[test]
    fn test_resolve_leaves_unknown_placeholders() {
        let vars = HashMap::new();
        assert_eq!(resolve("{{mystery}}", &vars), "{{mystery}}");
    }

    #[test]
    fn test_shell_single_quote_escape() {
        assert_eq!(shell_single_quote_escape("it's"), r"it'\''s");
    }
}
