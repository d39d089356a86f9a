//! Configuration loader

use std::path::Path;

use echat_utils::{client_config_file, EchatError, Result};

use super::ClientConfig;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<ClientConfig> {
        let path = client_config_file();
        if path.exists() {
            Self::load_from_path(&path)
        } else {
            Ok(ClientConfig::default())
        }
    }

    pub fn load_from_path(path: &Path) -> Result<ClientConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| EchatError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<ClientConfig> {
        toml::from_str(content).map_err(|e| EchatError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn validate(config: &ClientConfig) -> Result<()> {
        if config.server_addr.trim().is_empty() {
            return Err(EchatError::config("server_addr must not be empty"));
        }
        if config.heartbeat_interval_secs == 0 {
            return Err(EchatError::config(
                "heartbeat_interval_secs must be at least 1",
            ));
        }
        Ok(())
    }
}
