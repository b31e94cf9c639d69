//! Configuration for the request tagging middleware.

use std::collections::BTreeSet;

use http::header::{HeaderName, InvalidHeaderName};

/// Default request/response header carrying the correlation id.
pub const DEFAULT_CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Errors from validating a [`TaggingConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid correlation id header {header:?}: {source}")]
    InvalidHeader {
        header: String,
        #[source]
        source: InvalidHeaderName,
    },
}

/// Controls which request details the tagging middleware attaches to the
/// request scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggingConfig {
    /// Master switch. When off, requests pass through without a scope.
    pub enabled: bool,
    /// Attach the authenticated user's name as `User`.
    pub include_user: bool,
    /// Attach the request path as `Path`.
    pub include_endpoint: bool,
    /// Attach (and, when generated, echo) a `CorrelationId`.
    pub include_correlation_id: bool,
    /// Header the correlation id is read from and echoed on.
    pub correlation_id_header: String,
    /// Keys the middleware may attach. Empty allows every key.
    pub allowed_metadata_keys: BTreeSet<String>,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_user: true,
            include_endpoint: true,
            include_correlation_id: true,
            correlation_id_header: DEFAULT_CORRELATION_ID_HEADER.to_string(),
            allowed_metadata_keys: BTreeSet::new(),
        }
    }
}

impl TaggingConfig {
    /// Whether the middleware may attach `key`.
    #[must_use]
    pub fn allows(&self, key: &str) -> bool {
        self.allowed_metadata_keys.is_empty() || self.allowed_metadata_keys.contains(key)
    }

    /// Parses the configured correlation header name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHeader`] when the name is not a valid
    /// HTTP header name.
    pub fn correlation_header(&self) -> Result<HeaderName, ConfigError> {
        HeaderName::try_from(self.correlation_id_header.as_str()).map_err(|source| {
            ConfigError::InvalidHeader {
                header: self.correlation_id_header.clone(),
                source,
            }
        })
    }
}
