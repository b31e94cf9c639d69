//! Per-request tag scopes for HTTP services.
//!
//! - [`config`]: What the middleware attaches, and the key allow-list
//! - [`endpoint`]: Route pattern to controller/action resolution
//! - [`correlation`]: Correlation id extraction and generation
//! - [`layer`]: The Tower layer that opens one scope per request

pub mod config;
pub mod correlation;
pub mod endpoint;
pub mod layer;

pub use config::{ConfigError, TaggingConfig, DEFAULT_CORRELATION_ID_HEADER};
pub use endpoint::{Endpoint, EndpointCatalog, DEFAULT_SCOPE_NAME};
pub use layer::{AuthenticatedUser, TaggingLayer, TaggingService};
