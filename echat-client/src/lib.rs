//! echat-client: Console chat client
//!
//! A [`ClientSession`] mirrors the server's Threshold → Lobby → Channel
//! states. Console commands are parsed by [`console`] and executed in order
//! on the session's dispatch task; everything worth showing comes back as a
//! [`ClientEvent`].

pub mod config;
pub mod console;
pub mod session;

pub use config::{ClientConfig, ConfigLoader};
pub use console::{parse_command, Command, CommandQueue, ParseError};
pub use session::{ClientEvent, ClientSession, ClientSessionFactory, ClientState};
