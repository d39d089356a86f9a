//! Engine error type

use echat_protocol::CodecError;
use echat_utils::EchatError;

/// Errors raised by the connection engine
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // === State machine ===

    #[error("Unknown state: {0}")]
    UnknownState(String),

    #[error("Handler already registered for message {0}")]
    DuplicateHandler(u32),

    #[error("Handler failed: {0}")]
    Handler(String),

    // === Scheduler ===

    #[error("Schedule {0} not found")]
    ScheduleNotFound(u64),

    #[error("Repeating schedule requires a non-zero period")]
    InvalidPeriod,

    // === Connection lifecycle ===

    #[error("Heartbeat check failed on connection {0}")]
    HeartbeatTimeout(u32),

    #[error("Send queue of connection {connection_id} overflowed (capacity {capacity})")]
    QueueOverflow { connection_id: u32, capacity: usize },

    #[error("Session initialization failed: {0}")]
    SessionInit(String),

    #[error("Already started")]
    AlreadyStarted,

    #[error("Not connected")]
    NotConnected,
}

impl NetError {
    /// Create a handler error
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    /// Create a session initialization error
    pub fn session_init(msg: impl Into<String>) -> Self {
        Self::SessionInit(msg.into())
    }
}

impl From<NetError> for EchatError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Io(e) => EchatError::Io(e),
            NetError::Codec(e) => EchatError::protocol(e.to_string()),
            NetError::NotConnected => EchatError::ConnectionClosed,
            other @ (NetError::HeartbeatTimeout(_)
            | NetError::QueueOverflow { .. }
            | NetError::SessionInit(_)) => EchatError::connection(other.to_string()),
            other => EchatError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            NetError::UnknownState("Attic".into()).to_string(),
            "Unknown state: Attic"
        );
        assert_eq!(
            NetError::QueueOverflow {
                connection_id: 3,
                capacity: 10240
            }
            .to_string(),
            "Send queue of connection 3 overflowed (capacity 10240)"
        );
    }

    #[test]
    fn test_codec_error_converts() {
        let err: NetError = CodecError::FrameTooShort { length: 2 }.into();
        assert!(matches!(err, NetError::Codec(CodecError::FrameTooShort { length: 2 })));
    }

    #[test]
    fn test_into_echat_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(EchatError::from(NetError::Io(io)), EchatError::Io(_)));
        assert!(matches!(
            EchatError::from(NetError::HeartbeatTimeout(1)),
            EchatError::Connection(_)
        ));
        assert!(matches!(
            EchatError::from(NetError::NotConnected),
            EchatError::ConnectionClosed
        ));
        assert!(matches!(
            EchatError::from(NetError::DuplicateHandler(4)),
            EchatError::Internal(_)
        ));
    }

    #[test]
    fn test_codec_error_becomes_protocol_error() {
        let err = EchatError::from(NetError::Codec(CodecError::FrameTooShort { length: 2 }));
        match err {
            EchatError::Protocol(msg) => assert!(msg.contains('2'), "{}", msg),
            other => panic!("Expected Protocol variant, got {:?}", other),
        }
    }
}
