//! echat-server: Chat service built on the echat-net engine
//!
//! Each accepted connection gets a [`ServerSession`] that walks through the
//! Threshold → Lobby → Channel states. Users and channels live in one shared
//! [`ChatWorld`].

pub mod config;
pub mod sessions;

pub use config::{ConfigLoader, ServerConfig};
pub use sessions::{ChatSessionFactory, ChatWorld, ServerSession, ServerState, SharedWorld};
