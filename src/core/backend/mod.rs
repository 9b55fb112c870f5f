//! Language-model execution backend: prompt plus working directory in, text
//! plus exit status out.

mod claude;
#[cfg(test)]
pub mod mock;

pub use claude::ClaudeCli;

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::core::text::truncate_chars;

/// Appended to prompts whose answer must be machine-readable.
pub const JSON_INSTRUCTION: &str =
    "Respond ONLY with valid JSON. No markdown, no explanation, just the JSON object.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutput {
    pub output: String,
    pub exit_code: i32,
}

impl BackendOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend timed out after {ms}ms")]
    Timeout { ms: u64 },
    #[error("failed to launch backend: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("backend response is not valid JSON: {0}")]
    InvalidJson(String),
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Runs one prompt. A non-zero exit is reported through
    /// `BackendOutput::exit_code`, not as an error.
    async fn run(&self, prompt: &str, cwd: &Path) -> Result<BackendOutput, BackendError>;

    /// Short liveness probe used before a session is started.
    async fn is_available(&self) -> bool;
}

/// Runs `prompt` in JSON mode and parses the answer, tolerating prose or a
/// fenced block around the payload.
pub async fn run_json(backend: &dyn Backend, prompt: &str, cwd: &Path) -> Result<Value, BackendError> {
    let json_prompt = format!("{}\n\n{}", prompt, JSON_INSTRUCTION);
    let result = backend.run(&json_prompt, cwd).await?;
    parse_json_response(&result.output)
}

pub fn parse_json_response(text: &str) -> Result<Value, BackendError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    extract_json_block(trimmed)
        .and_then(|block| serde_json::from_str(block).ok())
        .ok_or_else(|| BackendError::InvalidJson(truncate_chars(trimmed, 200).to_string()))
}

/// Extracts a JSON payload from model output: a fenced ```json block first,
/// then the first `{...}` or `[...]` span.
pub(crate) fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            let block = text[content_start..content_start + end].trim();
            if !block.is_empty() {
                return Some(block);
            }
        }
    }
    let re = regex::Regex::new(r"\{[\s\S]*\}|\[[\s\S]*\]").ok()?;
    re.find(text).map(|m| m.as_str())
}
