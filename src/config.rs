//! Configuration parsing and validation.
//!
//! Handles loading configuration from YAML files and validating it before
//! the engine or ledgers are constructed. Configuration is an explicit
//! struct handed to constructors, never ambient state.

use std::path::Path;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::{ConfigError, EmptyDatabasePathSnafu, ReadFileSnafu, YamlParseSnafu};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Checkpoint behavior (optional, defaults to infinite retries).
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

/// Location of the checkpoint database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Filesystem path of the SQLite database file.
    pub path: String,
}

/// Checkpoint engine behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Maximum automatic redelivery attempts before a failure is durably
    /// recorded. `None` means retry forever: callers relying on transport
    /// redelivery must set a maximum to ever reach the failure ledger.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;
        let config: Config = serde_yaml::from_str(&contents).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.database.path.trim().is_empty(), EmptyDatabasePathSnafu);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_yaml_parsing() {
        let yaml = r#"
database:
  path: "/var/lib/permafrost/checkpoint.db"

checkpoint:
  max_retries: 3
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.path, "/var/lib/permafrost/checkpoint.db");
        assert_eq!(config.checkpoint.max_retries, Some(3));
    }

    #[test]
    fn test_max_retries_defaults_to_unlimited() {
        let yaml = r#"
database:
  path: "checkpoint.db"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.checkpoint.max_retries, None);
    }

    #[test]
    fn test_from_file_loads_and_validates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "database:\n  path: \"checkpoint.db\"\ncheckpoint:\n  max_retries: 5\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.database.path, "checkpoint.db");
        assert_eq!(config.checkpoint.max_retries, Some(5));
    }

    #[test]
    fn test_from_file_missing_file_is_a_read_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("missing.yaml");
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_from_file_rejects_empty_database_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "database:\n  path: \"\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDatabasePath));
    }

    #[test]
    fn test_empty_database_path_is_rejected() {
        let config = Config {
            database: DatabaseConfig {
                path: "  ".to_string(),
            },
            checkpoint: CheckpointConfig::default(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }
}
