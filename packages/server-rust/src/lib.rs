//! `sqltag` server -- axum middleware that opens a tag scope per request,
//! plus a sample catalog service whose SQL carries the request's tags.

pub mod cli;
pub mod network;
pub mod sample;
pub mod tagging;

pub use network::{NetworkConfig, NetworkModule};
pub use tagging::{AuthenticatedUser, TaggingConfig, TaggingLayer};
