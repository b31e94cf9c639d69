//! Command-line and environment configuration for the sample server binary.

use std::collections::BTreeSet;
use std::time::Duration;

use clap::Parser;

use crate::network::NetworkConfig;
use crate::tagging::{TaggingConfig, DEFAULT_CORRELATION_ID_HEADER};

/// Sample catalog server with request-scoped SQL query tagging.
#[derive(Debug, Clone, Parser)]
#[command(name = "sample-server", version, about)]
pub struct ServerArgs {
    /// Bind address.
    #[arg(long, env = "SQLTAG_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on (0 = OS-assigned).
    #[arg(long, env = "SQLTAG_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Request timeout in seconds.
    #[arg(long, env = "SQLTAG_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Disable request tagging entirely.
    #[arg(long, env = "SQLTAG_DISABLE_TAGGING")]
    pub disable_tagging: bool,

    /// Do not attach the authenticated user.
    #[arg(long, env = "SQLTAG_EXCLUDE_USER")]
    pub exclude_user: bool,

    /// Do not attach the request path.
    #[arg(long, env = "SQLTAG_EXCLUDE_ENDPOINT")]
    pub exclude_endpoint: bool,

    /// Do not attach or generate a correlation id.
    #[arg(long, env = "SQLTAG_EXCLUDE_CORRELATION_ID")]
    pub exclude_correlation_id: bool,

    /// Header carrying the correlation id.
    #[arg(long, env = "SQLTAG_CORRELATION_ID_HEADER", default_value = DEFAULT_CORRELATION_ID_HEADER)]
    pub correlation_id_header: String,

    /// Metadata keys the middleware may attach (comma separated; empty = all).
    #[arg(long, env = "SQLTAG_ALLOWED_METADATA_KEYS", value_delimiter = ',')]
    pub allowed_metadata_keys: Vec<String>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "SQLTAG_LOG_JSON")]
    pub log_json: bool,
}

impl ServerArgs {
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    #[must_use]
    pub fn tagging_config(&self) -> TaggingConfig {
        TaggingConfig {
            enabled: !self.disable_tagging,
            include_user: !self.exclude_user,
            include_endpoint: !self.exclude_endpoint,
            include_correlation_id: !self.exclude_correlation_id,
            correlation_id_header: self.correlation_id_header.clone(),
            allowed_metadata_keys: self
                .allowed_metadata_keys
                .iter()
                .map(|key| key.trim())
                .filter(|key| !key.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>(),
        }
    }
}
