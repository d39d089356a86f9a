//! Configuration schema

use std::time::Duration;

use echat_net::ConnectionConfig;
use echat_protocol::ByteOrder;
use serde::{Deserialize, Serialize};

/// Root client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address to dial
    pub server_addr: String,
    /// Seconds between keepalive heartbeats
    pub heartbeat_interval_secs: u64,
    /// Byte order of the frame length header
    pub byte_order: ByteOrder,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:10002".into(),
            heartbeat_interval_secs: 5,
            byte_order: ByteOrder::Little,
        }
    }
}

impl ClientConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_interval: self.heartbeat_interval(),
            byte_order: self.byte_order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr, "127.0.0.1:10002");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.connection_config().byte_order, ByteOrder::Little);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str("byte_order = \"big\"").unwrap();
        assert_eq!(config.byte_order, ByteOrder::Big);
        assert_eq!(config.server_addr, "127.0.0.1:10002");
    }
}
