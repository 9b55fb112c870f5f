use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Backend, BackendError, BackendOutput};
use crate::core::config::SwarmConfig;

const PROBE_PROMPT: &str = "Say \"ok\"";
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Drives the `claude` command-line tool in non-interactive print mode.
pub struct ClaudeCli {
    command: String,
    timeout: Duration,
}

impl ClaudeCli {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SwarmConfig) -> Self {
        Self::new(config.backend_command.clone(), config.backend_timeout())
    }

    async fn invoke(
        &self,
        prompt: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<BackendOutput, BackendError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(["--print", "--output-format", "text"])
            .arg(prompt)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "Invoking {} in {:?} ({} prompt chars)",
            self.command,
            cwd,
            prompt.chars().count()
        );
        let child = cmd.spawn()?;

        // Dropping the wait future on timeout kills the child.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!("{} timed out after {:?}", self.command, timeout);
                return Err(BackendError::Timeout {
                    ms: timeout.as_millis() as u64,
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if exit_code != 0 && text.is_empty() {
            text = String::from_utf8_lossy(&output.stderr).trim().to_string();
        }
        Ok(BackendOutput {
            output: text,
            exit_code,
        })
    }
}

#[async_trait]
impl Backend for ClaudeCli {
    async fn run(&self, prompt: &str, cwd: &Path) -> Result<BackendOutput, BackendError> {
        self.invoke(prompt, cwd, self.timeout).await
    }

    async fn is_available(&self) -> bool {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        match self.invoke(PROBE_PROMPT, &cwd, PROBE_TIMEOUT).await {
            Ok(result) => result.success(),
            Err(e) => {
                debug!("Backend probe failed: {}", e);
                false
            }
        }
    }
}
