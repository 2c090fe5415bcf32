pub mod client;
pub mod commands;
pub mod dispatcher;
pub mod event_bridge;
pub mod handlers;
pub mod protocol;
pub mod server;

pub use server::{start, ServerConfig, ServerHandle};
