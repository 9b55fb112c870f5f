use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{Level, info, warn};

use crate::core::orchestrator::OrchestratorSettings;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Upper bound on specialists; informational while execution is single-flight.
    pub max_agents: usize,
    /// Extra attempts after the first failed one.
    pub max_retries: u32,
    pub token_budget: usize,
    pub backend_command: String,
    pub backend_timeout_ms: u64,
    pub log_level: String,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_agents: 5,
            max_retries: 3,
            token_budget: 8000,
            backend_command: "claude".to_string(),
            backend_timeout_ms: 300_000,
            log_level: "info".to_string(),
        }
    }
}

impl SwarmConfig {
    /// Reads `config.toml` from `data_dir`. A missing or malformed file
    /// yields the defaults.
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Self {
        let config_path = data_dir.as_ref().join(CONFIG_FILE);
        if !config_path.exists() {
            return Self::default();
        }
        let content = match tokio::fs::read_to_string(&config_path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Could not read {:?}: {}. Using defaults.", config_path, e);
                return Self::default();
            }
        };
        match toml::from_str::<SwarmConfig>(&content) {
            Ok(config) => {
                info!(
                    "Loaded config: max_retries={}, token_budget={}, backend={}",
                    config.max_retries, config.token_budget, config.backend_command
                );
                config
            }
            Err(e) => {
                warn!("Invalid {:?}: {}. Using defaults.", config_path, e);
                Self::default()
            }
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, data_dir: P) -> Result<()> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir).await?;
        tokio::fs::write(data_dir.join(CONFIG_FILE), toml::to_string(self)?).await?;
        Ok(())
    }

    /// Falls back to INFO for unknown level names.
    pub fn tracing_level(&self) -> Level {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" | "warning" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            max_retries: self.max_retries,
            token_budget: self.token_budget,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SwarmConfig::load(dir.path()).await;
        assert_eq!(config, SwarmConfig::default());
        assert_eq!(config.backend_timeout(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "max_retries = 1\nlog_level = \"debug\"\n",
        )
        .unwrap();
        let config = SwarmConfig::load(dir.path()).await;
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.token_budget, 8000);
        assert_eq!(config.backend_command, "claude");
        assert_eq!(config.tracing_level(), Level::DEBUG);
        assert_eq!(config.orchestrator_settings().max_retries, 1);
    }

    #[tokio::test]
    async fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "max_retries = \"lots\"").unwrap();
        assert_eq!(SwarmConfig::load(dir.path()).await, SwarmConfig::default());
    }

    #[tokio::test]
    async fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let config = SwarmConfig {
            token_budget: 1234,
            backend_command: "/usr/local/bin/claude".into(),
            ..Default::default()
        };
        config.save(dir.path()).await.unwrap();
        assert_eq!(SwarmConfig::load(dir.path()).await, config);
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let config = SwarmConfig {
            log_level: "chatty".into(),
            ..Default::default()
        };
        assert_eq!(config.tracing_level(), Level::INFO);
    }
}
