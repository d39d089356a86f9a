//! Command-line arguments for the echat client

use clap::Parser;
use std::path::PathBuf;

/// echat - console chat client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file
    ///
    /// Defaults to `client.toml` in the echat config directory.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Server address, overriding the configuration file
    ///
    /// Example: 127.0.0.1:10002
    #[arg(long, short = 'a', env = "ECHAT_ADDR")]
    pub addr: Option<String>,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
