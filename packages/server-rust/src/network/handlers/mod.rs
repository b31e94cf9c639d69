//! Operational handlers shared by every deployment of the server.

pub mod health;

pub use health::liveness_handler;
