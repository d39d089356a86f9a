//! Configuration schema

use std::time::Duration;

use echat_net::ConnectionConfig;
use echat_protocol::ByteOrder;
use serde::{Deserialize, Serialize};

/// Root server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub listen_addr: String,
    /// Seconds between heartbeat checks on each connection
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence after which a client is disconnected
    pub idle_timeout_secs: u64,
    /// Byte order of the frame length header
    pub byte_order: ByteOrder,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:10002".into(),
            heartbeat_interval_secs: 5,
            idle_timeout_secs: 30,
            byte_order: ByteOrder::Little,
        }
    }
}

impl ServerConfig {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            byte_order: self.byte_order,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:10002");
        assert_eq!(config.heartbeat_interval_secs, 5);
        assert_eq!(config.idle_timeout(), Duration::from_secs(30));
        assert_eq!(config.byte_order, ByteOrder::Little);
    }

    #[test]
    fn test_connection_config() {
        let config = ServerConfig {
            heartbeat_interval_secs: 2,
            byte_order: ByteOrder::Big,
            ..ServerConfig::default()
        };
        let conn = config.connection_config();
        assert_eq!(conn.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(conn.byte_order, ByteOrder::Big);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ServerConfig = toml::from_str("idle_timeout_secs = 60").unwrap();
        assert_eq!(config.idle_timeout_secs, 60);
        assert_eq!(config.listen_addr, "0.0.0.0:10002");
    }

    #[test]
    fn test_byte_order_is_lowercase() {
        let config: ServerConfig = toml::from_str(r#"byte_order = "big""#).unwrap();
        assert_eq!(config.byte_order, ByteOrder::Big);
        assert!(toml::from_str::<ServerConfig>(r#"byte_order = "Big""#).is_err());
    }
}
