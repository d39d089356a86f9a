//! echat-net: Generic TCP session engine
//!
//! Turns a byte stream into framed messages, dispatches them into a
//! per-connection session, and runs a per-connection scheduler with
//! heartbeat-based liveness checks. Business logic plugs in through
//! [`Session`], [`SessionFactory`] and the [`StateHost`] state machine.

pub mod client;
pub mod connection;
pub mod error;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod state;

pub use client::{Client, CLIENT_CONNECTION_ID};
pub use connection::{
    Connection, ConnectionConfig, ConnectionHandle, MIN_HEARTBEAT_INTERVAL, RECV_QUEUE_CAPACITY,
    SEND_QUEUE_CAPACITY,
};
pub use error::NetError;
pub use scheduler::{Delivery, ScheduleKind, Scheduler, SchedulerCallback};
pub use server::{accept_backoff, is_transient, Server, ACCEPT_RETRY_INTERVALS};
pub use session::{Session, SessionFactory};
pub use state::{MessageHandler, State, StateHost, StateMachine};
