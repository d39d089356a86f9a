//! Configuration loader

use std::path::Path;

use echat_utils::{server_config_file, EchatError, Result};

use super::ServerConfig;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Result<ServerConfig> {
        let path = server_config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(ServerConfig::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<ServerConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| EchatError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration from string
    pub fn parse(content: &str, path: &Path) -> Result<ServerConfig> {
        toml::from_str(content).map_err(|e| EchatError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate configuration
    pub fn validate(config: &ServerConfig) -> Result<()> {
        if config.listen_addr.trim().is_empty() {
            return Err(EchatError::config("listen_addr must not be empty"));
        }

        if config.heartbeat_interval_secs == 0 {
            return Err(EchatError::config(
                "heartbeat_interval_secs must be at least 1",
            ));
        }

        if config.idle_timeout_secs < config.heartbeat_interval_secs {
            return Err(EchatError::config(
                "idle_timeout_secs must not be shorter than heartbeat_interval_secs",
            ));
        }

        Ok(())
    }

    /// Load and validate
    pub fn load_and_validate() -> Result<ServerConfig> {
        let config = Self::load()?;
        Self::validate(&config)?;
        Ok(config)
    }
}
