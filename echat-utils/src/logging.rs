//! Logging infrastructure for echat
//!
//! Provides unified logging setup using the tracing ecosystem.

use std::fs::File;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{paths, EchatError, Result};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "ECHAT_LOG";

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stderr,
    /// Log file under the XDG state dir
    File,
    Both,
}

impl LogOutput {
    pub fn writes_stderr(self) -> bool {
        matches!(self, LogOutput::Stderr | LogOutput::Both)
    }

    pub fn writes_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

/// Filter from `ECHAT_LOG`, or `default` when unset
fn env_filter_or(default: &str) -> String {
    std::env::var(LOG_ENV).unwrap_or_else(|_| default.to_string())
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub output: LogOutput,
    /// `EnvFilter` directives, e.g. `info` or `echat_net=debug,tokio=warn`
    pub filter: String,
    /// Emit span enter/exit events
    pub span_events: bool,
    /// Include source file and line
    pub file_line: bool,
    /// Log file name; `echat.log` when unset
    pub file_name: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "info".into(),
            span_events: false,
            file_line: false,
            file_name: None,
        }
    }
}

impl LogConfig {
    /// Console client: stdout carries the chat, so logs go to a file
    pub fn client() -> Self {
        Self {
            output: LogOutput::File,
            filter: env_filter_or("info"),
            file_name: Some("echat-client.log".into()),
            ..Self::default()
        }
    }

    pub fn server() -> Self {
        Self {
            filter: env_filter_or("info"),
            file_line: true,
            ..Self::default()
        }
    }

    /// Everything at debug, with spans, on stderr
    pub fn development() -> Self {
        Self {
            filter: "debug".into(),
            span_events: true,
            file_line: true,
            ..Self::default()
        }
    }

    pub fn file_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or("echat.log")
    }
}

/// Initialize logging with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize logging with custom configuration
///
/// Fails with a config error if the filter does not parse, and with an
/// internal error if a global subscriber is already installed.
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| EchatError::config(format!("Invalid log filter '{}': {}", config.filter, e)))?;

    let span_events = if config.span_events {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    let stderr_layer = config.output.writes_stderr().then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_span_events(span_events.clone())
            .with_file(config.file_line)
            .with_line_number(config.file_line)
    });

    let file_layer = if config.output.writes_file() {
        let file = open_log_file(config.file_name())?;
        Some(
            fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_span_events(span_events)
                .with_file(config.file_line)
                .with_line_number(config.file_line),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| EchatError::internal(format!("Failed to init logging: {}", e)))?;

    tracing::debug!(filter = %config.filter, output = ?config.output, "logging initialized");
    Ok(())
}

fn open_log_file(file_name: &str) -> Result<File> {
    let log_dir = paths::log_dir();
    std::fs::create_dir_all(&log_dir).map_err(|e| EchatError::FileWrite {
        path: log_dir.clone(),
        source: e,
    })?;

    let log_path = log_dir.join(file_name);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| EchatError::FileWrite {
            path: log_path,
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "info");
        assert_eq!(config.file_name(), "echat.log");
    }

    #[test]
    fn test_output_targets() {
        assert!(LogOutput::Stderr.writes_stderr());
        assert!(!LogOutput::Stderr.writes_file());
        assert!(!LogOutput::File.writes_stderr());
        assert!(LogOutput::Both.writes_stderr() && LogOutput::Both.writes_file());
    }

    #[test]
    fn test_log_config_client_logs_to_file() {
        let config = LogConfig::client();
        assert!(config.output.writes_file());
        assert!(!config.output.writes_stderr());
        assert_eq!(config.file_name(), "echat-client.log");
    }

    #[test]
    fn test_log_config_server_logs_to_stderr() {
        let config = LogConfig::server();
        assert_eq!(config.output, LogOutput::Stderr);
        assert!(config.file_line);
    }

    #[test]
    fn test_log_config_development() {
        let config = LogConfig::development();
        assert_eq!(config.filter, "debug");
        assert!(config.span_events);
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let config = LogConfig {
            filter: "echat=loud".into(),
            ..LogConfig::default()
        };
        let result = init_logging_with_config(config);
        assert!(matches!(result, Err(EchatError::Config(_))));
    }
}
