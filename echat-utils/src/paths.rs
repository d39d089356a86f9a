//! Path utilities for echat
//!
//! Handles XDG Base Directory specification compliance for config and
//! state directories.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application identifier for XDG directories
const APP_NAME: &str = "echat";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the configuration directory
///
/// Location: `$XDG_CONFIG_HOME/echat` or `~/.config/echat`
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| home_dir().join(".config").join(APP_NAME))
}

/// Server configuration file (`server.toml` in the config dir)
pub fn server_config_file() -> PathBuf {
    config_dir().join("server.toml")
}

/// Client configuration file (`client.toml` in the config dir)
pub fn client_config_file() -> PathBuf {
    config_dir().join("client.toml")
}

/// Get the state directory
///
/// Location: `$XDG_STATE_HOME/echat` or `~/.local/state/echat`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| home_dir().join(".local").join("state").join(APP_NAME))
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/echat/log`
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_files_are_toml() {
        assert!(server_config_file().to_string_lossy().ends_with("server.toml"));
        assert!(client_config_file().to_string_lossy().ends_with("client.toml"));
    }

    #[test]
    fn test_config_dir_names_app() {
        assert!(config_dir().to_string_lossy().contains(APP_NAME));
    }

    #[test]
    fn test_log_dir_under_state_dir() {
        assert!(log_dir().starts_with(state_dir()));
    }
}
