//! Connector layer: server accept loop, client dialer, shared configuration.

mod client;
mod config;
mod server;

pub use client::{ClientConnection, ClientConnector};
pub use config::Config;
pub use server::ServerConnector;
