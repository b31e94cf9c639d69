//! Networking: configuration, transport middleware, handlers, and the server
//! lifecycle.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod module;

pub use config::NetworkConfig;
pub use module::NetworkModule;
