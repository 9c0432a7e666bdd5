//! Configuration management for kbflow
//!
//! Loads the TOML configuration, applies `KBFLOW_` environment overrides and
//! validates the result before anything else in the process reads it.

use crate::error::{KbError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

/// Supported configuration schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub fusion: FusionSettings,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Relational store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

fn default_pool_size() -> u32 {
    16
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_connection_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = Config::default_data_dir().unwrap_or_else(|_| PathBuf::from(".kbflow"));

        Self {
            database_path: data_dir.join("projects.sqlite"),
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

/// Workflow search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Deadline for a single vector-store call
    pub timeout_ms: u64,
    /// Minimum similarity passed through to the vector store
    pub score_threshold: f32,
    /// Default result count for precision-oriented workflows (RCCA)
    pub precision_results: usize,
    /// Default result count for breadth-oriented workflows
    pub breadth_results: usize,
    /// Upper bound on query length accepted by the tool handlers
    pub max_query_chars: usize,
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            score_threshold: 0.0,
            precision_results: 10,
            breadth_results: 20,
            max_query_chars: 2000,
        }
    }
}

/// Hybrid (dense + sparse) fusion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionSettings {
    pub enabled: bool,
    pub rrf_k: f64,
    /// Bias toward the semantic list; the keyword list gets `1 - semantic_weight`
    pub semantic_weight: f64,
    /// How many candidates to pull from each list per requested result
    pub candidate_multiplier: usize,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rrf_k: 60.0,
            semantic_weight: 0.7,
            candidate_multiplier: 2,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(KbError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| KbError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KbError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| KbError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: KBFLOW_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("KBFLOW_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATABASE_PATH" => {
                self.storage.database_path = PathBuf::from(value);
            }
            "SEARCH__TIMEOUT_MS" => {
                self.search.timeout_ms = parse_env(path, value)?;
            }
            "SEARCH__SCORE_THRESHOLD" => {
                self.search.score_threshold = parse_env(path, value)?;
            }
            "FUSION__ENABLED" => {
                self.fusion.enabled = parse_env(path, value)?;
            }
            "FUSION__SEMANTIC_WEIGHT" => {
                self.fusion.semantic_weight = parse_env(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| KbError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("kbflow").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| KbError::Config("Cannot determine data directory".to_string()))?;

        Ok(data_dir.join("kbflow"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| KbError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig::default(),
            search: SearchConfig::default(),
            fusion: FusionSettings::default(),
        }
    }
}
