//! # Configuration Management Module
//!
//! TOML configuration for the `missiond` binary.
//!
//! ## Configuration Structure
//!
//! - [`SchedulerConfig`] - auto-scheduler pacing (`[scheduler]`)
//! - [`ContentConfig`] - where mission templates live and which keys start unlocked (`[content]`)
//! - [`LoggingConfig`] - log level and optional log file (`[logging]`)
//!
//! Every section and field has a default, so an empty file is a valid configuration.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use missiond::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     println!("Missions: {}", config.content.missions_path);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [scheduler]
//! enabled = true
//! poll_interval_ms = 100
//! min_seconds_between_missions = 5
//! start_delay_seconds = 4
//!
//! [content]
//! missions_path = "data/missions"
//! initial_unlocks = ["ACT1"]
//!
//! [logging]
//! level = "info"
//! file = "missiond.log"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

pub use crate::missions::SchedulerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// A JSON file, or a directory scanned for `*.json` templates.
    #[serde(default = "default_missions_path")]
    pub missions_path: String,
    /// Unlock keys set before the first mission is considered.
    #[serde(default = "default_initial_unlocks")]
    pub initial_unlocks: Vec<String>,
}

fn default_missions_path() -> String {
    "data/missions".to_string()
}

fn default_initial_unlocks() -> Vec<String> {
    vec!["ACT1".to_string()]
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            missions_path: default_missions_path(),
            initial_unlocks: default_initial_unlocks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.poll_interval_ms, 100);
        assert_eq!(config.scheduler.min_seconds_between_missions, 5);
        assert_eq!(config.scheduler.start_delay_seconds, 4);
        assert_eq!(config.content.missions_path, "data/missions");
        assert_eq!(config.content.initial_unlocks, vec!["ACT1"]);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: Config = toml::from_str(
            r#"
            [scheduler]
            min_seconds_between_missions = 30

            [content]
            initial_unlocks = []
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.min_seconds_between_missions, 30);
        assert_eq!(config.scheduler.poll_interval_ms, 100);
        assert!(config.content.initial_unlocks.is_empty());
        assert_eq!(config.content.missions_path, "data/missions");
    }

    #[test]
    fn scheduler_durations() {
        let scheduler = SchedulerConfig {
            poll_interval_ms: 250,
            min_seconds_between_missions: 7,
            ..Default::default()
        };
        assert_eq!(scheduler.poll_interval(), std::time::Duration::from_millis(250));
        assert_eq!(scheduler.min_gap(), std::time::Duration::from_secs(7));
    }

    #[tokio::test]
    async fn create_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded.content.missions_path, "data/missions");
        assert_eq!(loaded.scheduler.start_delay_seconds, 4);
    }

    #[tokio::test]
    async fn load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[scheduler]\npoll_interval_ms = \"fast\"\n").unwrap();
        let err = Config::load(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
