//! Layered configuration loading: defaults, project YAML files, then environment.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::{MatchKeyKind, MergeStrategyType};

/// Project-local directory holding configuration and the default database.
pub const CONFIG_DIR: &str = ".launch-merge";

const ENV_PREFIX: &str = "LAUNCH_MERGE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `logging.level` is not a tracing level.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// `logging.format` is not `json` or `pretty`.
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// `logging.rotation` is not a known policy.
    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    /// `database.path` is empty.
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    /// `database.max_connections` is zero.
    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    /// A configured strategy name is unknown.
    #[error("Unknown merge strategy in configuration: {0}")]
    UnknownStrategy(String),

    /// `merge.default_strategy` is not enabled.
    #[error("Default strategy '{0}' is not among the enabled strategies")]
    DefaultStrategyDisabled(String),

    /// `merge.match_key` is unknown.
    #[error("Invalid match key: {0}. Must be one of: name_and_type, unique_id, code_ref, parameters")]
    InvalidMatchKey(String),

    /// A cross-field rule failed, such as no enabled strategy.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .launch-merge/config.yaml (project config, created by init)
    /// 3. .launch-merge/local.yaml (project local overrides, optional)
    /// 4. Environment variables (LAUNCH_MERGE_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let dir = Path::new(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.merge.enabled_strategies.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "At least one merge strategy must be enabled".to_string(),
            ));
        }

        let mut enabled = Vec::with_capacity(config.merge.enabled_strategies.len());
        for name in &config.merge.enabled_strategies {
            let kind = MergeStrategyType::parse(name).map_err(|_| ConfigError::UnknownStrategy(name.clone()))?;
            enabled.push(kind);
        }

        let default = MergeStrategyType::parse(&config.merge.default_strategy)
            .map_err(|_| ConfigError::UnknownStrategy(config.merge.default_strategy.clone()))?;
        if !enabled.contains(&default) {
            return Err(ConfigError::DefaultStrategyDisabled(config.merge.default_strategy.clone()));
        }

        if MatchKeyKind::from_str(&config.merge.match_key).is_none() {
            return Err(ConfigError::InvalidMatchKey(config.merge.match_key.clone()));
        }

        Ok(())
    }
}
