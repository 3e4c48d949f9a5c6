use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{ToolError, ToolResult};

pub const SHORTCUT_TIMEOUT: Duration = Duration::from_secs(30);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives the host's `open` and `shortcuts` command line tools.
#[derive(Debug, Clone)]
pub struct MacOsAdapter {
    open_cmd: Vec<String>,
    shortcuts_cmd: Vec<String>,
    command_timeout: Duration,
    shortcut_timeout: Duration,
}

struct CommandOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

impl MacOsAdapter {
    pub fn new() -> Self {
        Self {
            open_cmd: vec!["open".to_string()],
            shortcuts_cmd: vec!["shortcuts".to_string()],
            command_timeout: COMMAND_TIMEOUT,
            shortcut_timeout: SHORTCUT_TIMEOUT,
        }
    }

    /// Replaces the `open` and `shortcuts` invocations. Each command is a program
    /// followed by leading arguments, e.g. `["sh", "/tmp/fake-shortcuts.sh"]`.
    pub fn with_commands(open_cmd: Vec<String>, shortcuts_cmd: Vec<String>) -> Self {
        Self {
            open_cmd,
            shortcuts_cmd,
            ..Self::new()
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_shortcut_timeout(mut self, timeout: Duration) -> Self {
        self.shortcut_timeout = timeout;
        self
    }

    pub async fn open_url_scheme(&self, url: &str) -> ToolResult<String> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ToolError::invalid("url", "url must not be empty"));
        }

        let output = run(
            &self.open_cmd,
            &[url],
            None,
            self.command_timeout,
            format!("opening {}", url),
        )
        .await?;

        if !output.success {
            return Err(ToolError::external(output.diagnostic()));
        }
        Ok(format!("Opened: {}", url))
    }

    pub async fn open_application(&self, app_name: &str) -> ToolResult<String> {
        let app_name = app_name.trim();
        if app_name.is_empty() {
            return Err(ToolError::invalid("app_name", "app_name must not be empty"));
        }

        let output = run(
            &self.open_cmd,
            &["-a", app_name],
            None,
            self.command_timeout,
            format!("opening {}", app_name),
        )
        .await?;

        if !output.success {
            return Err(ToolError::external(format!(
                "opening {}: {}",
                app_name,
                output.diagnostic()
            )));
        }
        Ok(format!("Opened: {}", app_name))
    }

    pub async fn run_shortcut(&self, name: &str, input_text: Option<&str>) -> ToolResult<String> {
        if name.trim().is_empty() {
            return Err(ToolError::invalid("name", "shortcut name must not be empty"));
        }

        let output = run(
            &self.shortcuts_cmd,
            &["run", name],
            input_text,
            self.shortcut_timeout,
            format!("shortcut '{}'", name),
        )
        .await?;

        if !output.success {
            return Err(ToolError::external(output.diagnostic()));
        }

        let stdout = output.stdout.trim();
        if stdout.is_empty() {
            Ok(format!("Shortcut '{}' executed", name))
        } else {
            Ok(stdout.to_string())
        }
    }

    pub async fn list_shortcuts(&self) -> ToolResult<String> {
        let output = run(
            &self.shortcuts_cmd,
            &["list"],
            None,
            self.command_timeout,
            "listing shortcuts".to_string(),
        )
        .await?;

        if !output.success {
            return Err(ToolError::external(output.diagnostic()));
        }
        Ok(output.stdout.trim().to_string())
    }
}

impl Default for MacOsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

async fn run(
    command: &[String],
    args: &[&str],
    input: Option<&str>,
    timeout: Duration,
    what: String,
) -> ToolResult<CommandOutput> {
    let (program, leading) = command
        .split_first()
        .ok_or_else(|| ToolError::Transport(format!("{}: no command configured", what)))?;

    let mut cmd = Command::new(program);
    cmd.args(leading)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(program = %program, ?args, "spawning");

    let mut child = cmd
        .spawn()
        .map_err(|e| ToolError::Transport(format!("failed to run {}: {}", program, e)))?;

    // stdin is fed while stdout and stderr drain
    let exchange = async move {
        let stdin = child.stdin.take();
        let feed = async move {
            if let (Some(text), Some(mut stdin)) = (input, stdin) {
                match stdin.write_all(text.as_bytes()).await {
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        fed?;
        output
    };

    // Dropping the timed-out future drops the child, and kill_on_drop reaps it.
    let output = match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ToolError::Transport(format!("{} failed: {}", what, e)));
        }
        Err(_) => {
            tracing::warn!(what = %what, ?timeout, "command timed out");
            return Err(ToolError::Timeout {
                what,
                after: timeout,
            });
        }
    };

    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
