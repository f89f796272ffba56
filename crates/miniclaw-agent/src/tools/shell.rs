//! Shell tool — run a command through `sh -c` and report its output.
//!
//! The tool never fails on a command's behalf: refusals, spawn errors,
//! timeouts, and non-zero exits all come back as `{stdout, stderr, exitCode}`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use miniclaw_core::config::BashConfig;
use miniclaw_core::types::ToolInput;
use miniclaw_core::utils::expand_home;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{info, warn};

use super::base::{require_string, Tool};

/// Per-stream output cap (characters).
const MAX_OUTPUT_LEN: usize = 10_000;

/// Exit code reported when a command exceeds its time limit.
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Destructive command patterns that are always refused.
const DENY_PATTERNS: &[&str] = &[
    r"\brm\s+-[rf]{1,2}\b",
    r"\b(mkfs|diskpart)\b",
    r"\bdd\s+if=",
    r">\s*/dev/sd",
    r"\b(shutdown|reboot|poweroff)\b",
    r":\(\)\s*\{.*\};\s*:", // fork bomb
];

// ─────────────────────────────────────────────
// BashTool
// ─────────────────────────────────────────────

/// Execute shell commands in a subprocess.
pub struct BashTool {
    /// Program names allowed to run; `"*"` disables the check.
    allowed_commands: Vec<String>,
    timeout: Duration,
    /// `None` runs in the current directory.
    working_dir: Option<PathBuf>,
    /// Compiled deny regexes (built once at construction).
    deny_regexes: Vec<Regex>,
    /// Splits a command line into its simple commands.
    separator: Option<Regex>,
}

impl BashTool {
    pub fn new(
        allowed_commands: Vec<String>,
        timeout: Duration,
        working_dir: Option<PathBuf>,
    ) -> Self {
        let deny_regexes = DENY_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        Self {
            allowed_commands,
            timeout,
            working_dir,
            deny_regexes,
            separator: Regex::new(r"\|\||&&|[;|\n]").ok(),
        }
    }

    pub fn from_config(config: &BashConfig) -> Self {
        Self::new(
            config.allowed_commands.clone(),
            Duration::from_secs(config.timeout_seconds),
            config.working_dir.as_deref().map(expand_home),
        )
    }

    /// Why `command` may not run, if it may not.
    fn guard_command(&self, command: &str) -> Option<String> {
        let lower = command.to_lowercase();
        if self.deny_regexes.iter().any(|re| re.is_match(&lower)) {
            warn!(command = command, "command blocked by safety guard");
            return Some("Command blocked by safety guard (dangerous pattern detected)".into());
        }

        if self.allowed_commands.iter().any(|c| c == "*") {
            return None;
        }

        let segments: Vec<&str> = match &self.separator {
            Some(re) => re.split(command).collect(),
            None => vec![command],
        };
        for segment in segments {
            let Some(program) = program_name(segment) else {
                continue;
            };
            if !self.allowed_commands.iter().any(|c| c == program) {
                warn!(command = command, program = program, "command not allowed");
                return Some(format!("Command '{program}' is not in allowed_commands"));
            }
        }
        None
    }
}

/// First word of a simple command, skipping `VAR=value` prefixes and any
/// leading directory.
fn program_name(segment: &str) -> Option<&str> {
    let word = segment
        .split_whitespace()
        .find(|w| !(w.contains('=') && !w.starts_with('=')))?;
    Some(word.rsplit('/').next().unwrap_or(word))
}

fn truncate_output(text: String) -> String {
    let total = text.chars().count();
    if total <= MAX_OUTPUT_LEN {
        return text;
    }
    let mut kept: String = text.chars().take(MAX_OUTPUT_LEN).collect();
    kept.push_str(&format!("\n... (truncated, {} more chars)", total - MAX_OUTPUT_LEN));
    kept
}

fn shell_result(stdout: String, stderr: String, exit_code: i32) -> Value {
    json!({
        "stdout": truncate_output(stdout),
        "stderr": truncate_output(stderr),
        "exitCode": exit_code,
    })
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its stdout, stderr, and exit code."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, params: ToolInput) -> anyhow::Result<Value> {
        let command = require_string(&params, "command")?;

        if let Some(reason) = self.guard_command(&command) {
            return Ok(shell_result(String::new(), reason, 1));
        }

        info!(command = %command, "executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command.as_str()]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command.as_str()]);
            c
        };
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => {
                warn!(command = %command, error = %e, "failed to spawn command");
                return Ok(shell_result(
                    String::new(),
                    format!("Failed to spawn command: {e}"),
                    1,
                ));
            }
        };

        // Dropping the wait future on timeout kills the child.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(shell_result(
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
                output.status.code().unwrap_or(-1),
            )),
            Ok(Err(e)) => Ok(shell_result(String::new(), format!("Command failed: {e}"), 1)),
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "command timed out");
                Ok(shell_result(
                    String::new(),
                    format!("Command timed out after {} seconds", self.timeout.as_secs()),
                    TIMEOUT_EXIT_CODE,
                ))
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
