//! Client session, its states and the events it reports

mod client;
mod events;
mod states;

pub use client::{ClientSession, ClientSessionFactory};
pub use events::ClientEvent;
pub use states::ClientState;
