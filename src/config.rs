//! Configuration for the building health agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::FeatureSchema;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ordered metric names every sample must carry
    pub metrics: Vec<String>,

    /// Rolling window size for feature derivation (1 = raw readings)
    pub window_size: usize,

    /// Path of the persisted model artifact
    pub model_path: PathBuf,

    /// Path for agent state
    pub data_path: PathBuf,

    /// Port the HTTP surface binds to
    pub port: u16,

    /// Capacity of the rolling sample archive the trainer snapshots
    pub archive_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("buildhealth-agent");

        Self {
            metrics: FeatureSchema::building_defaults().names().to_vec(),
            window_size: 1,
            model_path: data_dir.join("model.json"),
            data_path: data_dir,
            port: 5000,
            archive_capacity: 2048,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("buildhealth-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(parent) = self.model_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// The feature schema this deployment runs with.
    pub fn feature_schema(&self) -> FeatureSchema {
        FeatureSchema::new(self.metrics.iter().cloned())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.is_empty() {
            return Err(ConfigError::ParseError(
                "at least one metric must be configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(
            config.metrics,
            ["temperature", "humidity", "pressure", "vibration"]
        );
        assert_eq!(config.window_size, 1);
        assert_eq!(config.port, 5000);
        assert_eq!(config.feature_schema().len(), 4);
    }

    #[test]
    fn test_empty_metric_list_rejected() {
        let mut config = Config::default();
        config.metrics.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.metrics, config.metrics);
        assert_eq!(restored.model_path, config.model_path);
    }
}
