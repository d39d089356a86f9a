//! Command-line arguments for echat-server

use clap::Parser;
use std::path::PathBuf;

/// echat-server - channel chat over TCP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file
    ///
    /// Defaults to `server.toml` in the echat config directory. A missing
    /// default file means built-in defaults.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Listen address, overriding the configuration file
    ///
    /// Example: 0.0.0.0:10002
    #[arg(long, short = 'l', env = "ECHAT_LISTEN")]
    pub listen: Option<String>,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["echat-server"]);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "echat-server",
            "-c",
            "/etc/echat/server.toml",
            "--listen",
            "127.0.0.1:9000",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/etc/echat/server.toml")));
        assert_eq!(args.listen.as_deref(), Some("127.0.0.1:9000"));
    }
}
