//! Session boundary between the engine and business logic
//!
//! The engine calls every method from the connection's dispatch loop, so a
//! session is never touched by two tasks at once.

use bytes::Bytes;

use crate::connection::ConnectionHandle;
use crate::NetError;

/// Protocol identity bound to one connection
pub trait Session: Send + Sized + 'static {
    /// Called once before any I/O starts; an error aborts the connection
    fn initialize(&mut self, connection: ConnectionHandle<Self>) -> Result<(), NetError>;

    /// Called once after every connection task has stopped
    fn uninitialized(&mut self);

    /// One inbound frame payload
    fn on_recv_message(&mut self, data: Bytes);

    /// Periodic liveness check; `false` tears the connection down
    fn check_heartbeat(&mut self) -> bool;
}

/// Creates one session per accepted or dialed connection
pub trait SessionFactory: Send + Sync + 'static {
    type Session: Session;

    fn create_session(&self) -> Self::Session;
}
