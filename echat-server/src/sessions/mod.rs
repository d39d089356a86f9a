//! Chat sessions, states and shared registries

mod channel;
mod session;
mod states;
mod world;

pub use channel::{Channel, LATEST_MSG_COUNT};
pub use session::{ChatSessionFactory, ServerSession};
pub use states::ServerState;
pub use world::{ChatWorld, SharedWorld, User};
