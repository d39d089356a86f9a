//! Configuration management for the echat server

mod loader;
mod schema;

pub use loader::ConfigLoader;
pub use schema::ServerConfig;
