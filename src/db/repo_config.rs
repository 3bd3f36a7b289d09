//! Application configuration file support.
//!
//! This module provides utilities for reading configuration from TOML files
//! (`esr.toml`). Configuration is loaded once in the binaries and passed to
//! components at construction; there is no ambient global state.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::factory::RepositoryType;
use super::repository::RepositoryError;
use super::SqliteConfig;

/// Application configuration from file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub repository: RepositorySettings,
    #[serde(default)]
    pub sqlite: SqliteSettings,
    #[serde(default)]
    pub collector: CollectorSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

/// Repository type settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySettings {
    #[serde(rename = "type")]
    pub repo_type: String,
}

/// SQLite connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SqliteSettings {
    #[serde(default)]
    pub database_path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Collector settings for the upstream ESR API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default = "default_rate_limit_threshold")]
    pub rate_limit_threshold: i64,
    #[serde(default = "default_collector_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_collector_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout_sec")]
    pub request_timeout_sec: u64,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_keys: Vec::new(),
            rate_limit_threshold: default_rate_limit_threshold(),
            retry_delay_ms: default_collector_retry_delay_ms(),
            max_retries: default_collector_max_retries(),
            request_timeout_sec: default_request_timeout_sec(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_base_url() -> String {
    "https://api.fas.usda.gov/api/esr".to_string()
}

fn default_rate_limit_threshold() -> i64 {
    50
}

fn default_collector_retry_delay_ms() -> u64 {
    5000
}

fn default_collector_max_retries() -> u32 {
    2
}

fn default_request_timeout_sec() -> u64 {
    120
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(AppConfig)` if successful
    /// * `Err(RepositoryError)` if file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RepositoryError::configuration(format!("Failed to read config file: {}", e))
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse config file: {}", e))
        })?;

        Ok(config)
    }

    /// Load configuration from the default locations.
    ///
    /// Honors `ESR_CONFIG` if set, then searches for `esr.toml` in the current
    /// and parent directories.
    pub fn from_default_location() -> Result<Self, RepositoryError> {
        if let Ok(path) = std::env::var("ESR_CONFIG") {
            return Self::from_file(path);
        }

        let search_paths = vec![PathBuf::from("esr.toml"), PathBuf::from("../esr.toml")];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(RepositoryError::configuration(
            "No esr.toml found in standard locations",
        ))
    }

    /// Get the repository type from configuration.
    pub fn repository_type(&self) -> Result<RepositoryType, String> {
        RepositoryType::from_str(&self.repository.repo_type)
    }

    /// Convert to SqliteConfig if this is a SQLite configuration.
    #[cfg(feature = "sqlite-repo")]
    pub fn to_sqlite_config(&self) -> Result<Option<SqliteConfig>, RepositoryError> {
        let repo_type = self.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;

        if repo_type != RepositoryType::Sqlite {
            return Ok(None);
        }

        if self.sqlite.database_path.is_empty() {
            return Err(RepositoryError::configuration(
                "Sqlite repository requires 'sqlite.database_path' setting",
            ));
        }

        Ok(Some(SqliteConfig {
            database_path: self.sqlite.database_path.clone(),
            max_pool_size: self.sqlite.max_connections,
            connection_timeout_sec: self.sqlite.connect_timeout,
            max_retries: self.sqlite.max_retries,
            retry_delay_ms: self.sqlite.retry_delay_ms,
        }))
    }

    /// Convert to SqliteConfig when the feature is disabled.
    #[cfg(not(feature = "sqlite-repo"))]
    pub fn to_sqlite_config(&self) -> Result<Option<SqliteConfig>, RepositoryError> {
        let repo_type = self.repository_type().map_err(|e| {
            RepositoryError::configuration(format!("Invalid repository type: {}", e))
        })?;

        if repo_type == RepositoryType::Sqlite {
            return Err(RepositoryError::configuration(
                "Sqlite repository feature not enabled",
            ));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_config() {
        let toml = r#"
[repository]
type = "local"
"#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.repository.repo_type, "local");
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Local);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.collector.rate_limit_threshold, 50);
    }

    #[test]
    fn test_parse_collector_config() {
        let toml = r#"
[repository]
type = "local"

[collector]
api_keys = ["key-a", "key-b"]
rate_limit_threshold = 25
max_retries = 4
"#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.collector.api_keys.len(), 2);
        assert_eq!(config.collector.rate_limit_threshold, 25);
        assert_eq!(config.collector.max_retries, 4);
        assert_eq!(config.collector.base_url, "https://api.fas.usda.gov/api/esr");
    }

    #[cfg(feature = "sqlite-repo")]
    #[test]
    fn test_parse_sqlite_config() {
        let toml = r#"
[repository]
type = "sqlite"

[sqlite]
database_path = "data/esr_data.db"
max_connections = 20
connect_timeout = 15
max_retries = 5
retry_delay_ms = 250
"#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.repository_type().unwrap(), RepositoryType::Sqlite);

        let sqlite = config.to_sqlite_config().unwrap().unwrap();
        assert_eq!(sqlite.database_path, "data/esr_data.db");
        assert_eq!(sqlite.max_pool_size, 20);
        assert_eq!(sqlite.connection_timeout_sec, 15);
        assert_eq!(sqlite.max_retries, 5);
        assert_eq!(sqlite.retry_delay_ms, 250);
    }

    #[cfg(feature = "sqlite-repo")]
    #[test]
    fn test_sqlite_requires_database_path() {
        let toml = r#"
[repository]
type = "sqlite"

[sqlite]
database_path = ""
"#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert!(config.to_sqlite_config().is_err());
    }
}
