//! Bounded subprocess execution.
//!
//! Every external CLI keyrack talks to (the cloud CLI, the password-manager
//! CLI) is run through [`run_tool`], which pipes stdout/stderr, enforces an
//! explicit timeout, and kills the child on drop so a hung tool can never
//! hang a keyrack invocation.
//!
//! A non-zero exit is *not* a hard failure here -- callers interpret it
//! ("session expired", "item not found") from the captured output.  Only a
//! spawn failure or a timeout is an error.

use std::process::Stdio;
use std::time::Duration;

use tracing::debug;

use keyrack_core::error::{Error, Result};

/// Captured outcome of one subprocess run.
#[derive(Debug)]
pub struct ToolOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stdout with trailing whitespace stripped.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim_end()
    }

    /// First stderr line, for use in human-readable reasons.
    pub fn stderr_first_line(&self) -> &str {
        self.stderr.lines().next().unwrap_or("").trim()
    }
}

/// Run `tool` with `args`, waiting at most `timeout`.
///
/// # Errors
///
/// [`Error::ExternalTool`] if the process cannot be spawned,
/// [`Error::Timeout`] if it does not finish in time.
pub async fn run_tool(tool: &str, args: &[&str], timeout: Duration) -> Result<ToolOutput> {
    debug!(tool, ?args, timeout_secs = timeout.as_secs(), "running external tool");

    let child = tokio::process::Command::new(tool)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::ExternalTool {
            tool: tool.to_string(),
            reason: format!("failed to spawn: {e}"),
        })?;

    // `wait_with_output` takes ownership, so on timeout the child is dropped
    // and killed via `kill_on_drop(true)`.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| Error::Timeout {
            tool: tool.to_string(),
        })?
        .map_err(|e| Error::ExternalTool {
            tool: tool.to_string(),
            reason: format!("wait failed: {e}"),
        })?;

    let result = ToolOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(tool, success = result.success, "external tool finished");
    Ok(result)
}
