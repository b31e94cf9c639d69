//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` validates configuration
//! and allocates shared state, `start()` binds the TCP listener, and
//! `serve()` starts accepting connections.

use std::future::Future;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::liveness_handler;
use super::middleware::build_http_layers;
use crate::sample::{self, demo_identity, SampleState};
use crate::tagging::{ConfigError, TaggingConfig, TaggingLayer};

/// Manages the HTTP server lifecycle for the sample service.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- validates tagging config and allocates the sample database
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    tagging: TaggingLayer,
    state: SampleState,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the tagging configuration is invalid.
    pub fn new(config: NetworkConfig, tagging: TaggingConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            config,
            tagging: TaggingLayer::new(tagging, sample::endpoints())?,
            state: SampleState::seeded(),
            listener: None,
        })
    }

    /// Returns the shared sample state (database and query log).
    #[must_use]
    pub fn state(&self) -> SampleState {
        self.state.clone()
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Layer order (outermost to innermost): tracing, timeout, demo identity,
    /// request tagging. Tagging runs per route so the matched route pattern
    /// is available to name the scope.
    pub fn build_router(&self) -> Router {
        Router::new()
            .merge(sample::routes())
            .route("/health/live", get(liveness_handler))
            .layer(self.tagging.clone())
            .layer(from_fn(demo_identity))
            .layer(build_http_layers(&self.config))
            .with_state(self.state.clone())
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until the shutdown future resolves, then waits for
    /// in-flight requests to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");

        info!("Serving HTTP connections");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Server stopped");
        Ok(())
    }
}
