//! Client configuration

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::ClientConfig;
