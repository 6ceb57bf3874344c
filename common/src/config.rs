use serde::{Deserialize, Serialize};
use std::fs;
use anyhow::{Context, Result};

use crate::matching::DEFAULT_MATCH_THRESHOLD;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

/// Inputs imported once at startup, in addition to on-demand imports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub applications_path: Option<String>,
    #[serde(default)]
    pub rubric_path: Option<String>,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
}

fn default_socket_path() -> String { "/tmp/sid-agent.sock".to_string() }
fn default_db_path() -> String { "./sid.db".to_string() }
fn default_match_threshold() -> f64 { DEFAULT_MATCH_THRESHOLD }

impl Default for IpcConfig {
    fn default() -> Self {
        Self { socket_path: default_socket_path() }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            applications_path: None,
            rubric_path: None,
            match_threshold: default_match_threshold(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if !(0.0..=1.0).contains(&config.ingest.match_threshold) {
            anyhow::bail!(
                "ingest.match_threshold must be within [0, 1], got {}",
                config.ingest.match_threshold
            );
        }
        Ok(config)
    }

    /// `--config` flag, then `SID_CONFIG`, then `./config/default.toml`.
    pub fn resolve_path(flag: Option<&str>) -> String {
        flag.map(str::to_string).unwrap_or_else(Self::default_path)
    }

    pub fn default_path() -> String {
        std::env::var("SID_CONFIG")
            .unwrap_or_else(|_| "./config/default.toml".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.ipc.socket_path, "/tmp/sid-agent.sock");
        assert_eq!(config.storage.db_path, "./sid.db");
        assert_eq!(config.ingest.applications_path, None);
        assert_eq!(config.ingest.match_threshold, DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [ipc]
            socket_path = "/run/sid.sock"

            [ingest]
            applications_path = "scan.json"
            match_threshold = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(config.ipc.socket_path, "/run/sid.sock");
        assert_eq!(config.ingest.applications_path.as_deref(), Some("scan.json"));
        assert_eq!(config.ingest.match_threshold, 0.9);
        assert_eq!(config.storage.db_path, "./sid.db");
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        assert!(Config::parse("[ingest]\nmatch_threshold = 1.5\n").is_err());
    }

    #[test]
    fn flag_wins_over_environment() {
        assert_eq!(Config::resolve_path(Some("/etc/sid.toml")), "/etc/sid.toml");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load("/nonexistent/sid.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/sid.toml"));
    }
}
