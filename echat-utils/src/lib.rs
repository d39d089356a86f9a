//! echat-utils: Common utilities shared across echat crates
//!
//! This crate provides:
//! - Unified error types ([`EchatError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{EchatError, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};
pub use paths::{client_config_file, config_dir, log_dir, server_config_file, state_dir};
