//! Shell tool — execute commands with timeout and output capture.

use crate::registry::{Tool, ToolFailure};
use crate::schema::{Field, Schema};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Execute shell commands. Captures stdout + stderr.
pub struct ShellTool {
    /// Working directory for commands
    pub cwd: Option<String>,
    /// Max execution time per command
    pub timeout: Duration,
    /// Max output bytes to capture (prevents OOM on huge outputs)
    pub max_output_bytes: usize,
    /// Substrings that are always blocked (e.g., "rm -rf /")
    pub deny_patterns: Vec<String>,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self {
            cwd: None,
            timeout: Duration::from_secs(120),
            max_output_bytes: 256 * 1024, // 256KB
            deny_patterns: vec![
                "rm -rf /".into(),
                "rm -rf /*".into(),
                "mkfs".into(),
                "dd if=".into(),
                ":(){:|:&};:".into(), // fork bomb
            ],
        }
    }
}

impl ShellTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_deny_patterns(mut self, patterns: Vec<String>) -> Self {
        self.deny_patterns = patterns;
        self
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout/stderr. Use for running \
         scripts, checking system state, and one-off automation."
    }

    fn schema(&self) -> Schema {
        Schema::object(vec![
            Field::required("command", Schema::String).describe("The shell command to execute")
        ])
    }

    async fn execute(&self, args: Value, cancel: CancellationToken) -> Result<Value, ToolFailure> {
        let command = args["command"]
            .as_str()
            .ok_or_else(|| ToolFailure::new("missing 'command' parameter"))?;

        for pattern in &self.deny_patterns {
            if command.contains(pattern.as_str()) {
                return Err(ToolFailure::new(format!(
                    "command blocked by safety policy: contains '{}'",
                    pattern
                )));
            }
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let output = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ToolFailure::new("cancelled"));
            }
            _ = tokio::time::sleep(self.timeout) => {
                return Err(ToolFailure::new(format!(
                    "command timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
            output = cmd.output() => {
                output.map_err(|e| ToolFailure::new(format!("failed to execute: {}", e)))?
            }
        };

        let mut stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let mut stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stdout.len() > self.max_output_bytes {
            stdout.truncate(self.max_output_bytes);
            stdout.push_str("\n... (output truncated)");
        }
        if stderr.len() > self.max_output_bytes {
            stderr.truncate(self.max_output_bytes);
            stderr.push_str("\n... (output truncated)");
        }

        let exit_code = output.status.code().unwrap_or(-1);

        // Return output even on failure — the model needs error output to
        // self-correct.
        let text = if stderr.is_empty() {
            format!("Exit code: {}\n{}", exit_code, stdout)
        } else {
            format!(
                "Exit code: {}\nSTDOUT:\n{}\nSTDERR:\n{}",
                exit_code, stdout, stderr
            )
        };
        Ok(Value::String(text))
    }
}
