//! Tower middleware that opens one tag scope per HTTP request.
//!
//! Each request runs inside its own isolated scope stack, so concurrent
//! requests never observe each other's tags. The scope is released when the
//! request future completes, fails, or is dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::MatchedPath;
use http::header::HeaderName;
use http::{HeaderValue, Request, Response};
use sqltag_core::scope::{self, ACTION_KEY};
use tower::{Layer, Service};
use tracing::debug;

use super::config::{ConfigError, TaggingConfig};
use super::correlation::{generate_correlation_id, read_correlation_id};
use super::endpoint::EndpointCatalog;

/// Metadata key for the HTTP method.
pub const METHOD_KEY: &str = "Method";
/// Metadata key for the request path.
pub const PATH_KEY: &str = "Path";
/// Metadata key for the authenticated user name.
pub const USER_KEY: &str = "User";
/// Metadata key for the correlation id.
pub const CORRELATION_ID_KEY: &str = "CorrelationId";

/// Identity of the caller, inserted into request extensions by an upstream
/// authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub name: String,
}

// ---------------------------------------------------------------------------
// TaggingLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps services with per-request tag scopes.
#[derive(Debug, Clone)]
pub struct TaggingLayer {
    config: Arc<TaggingConfig>,
    correlation_header: HeaderName,
    endpoints: Arc<EndpointCatalog>,
}

impl TaggingLayer {
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configured correlation header is not
    /// a valid header name.
    pub fn new(config: TaggingConfig, endpoints: EndpointCatalog) -> Result<Self, ConfigError> {
        let correlation_header = config.correlation_header()?;
        Ok(Self {
            config: Arc::new(config),
            correlation_header,
            endpoints: Arc::new(endpoints),
        })
    }
}

impl<S> Layer<S> for TaggingLayer {
    type Service = TaggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TaggingService {
            inner,
            config: Arc::clone(&self.config),
            correlation_header: self.correlation_header.clone(),
            endpoints: Arc::clone(&self.endpoints),
        }
    }
}

// ---------------------------------------------------------------------------
// TaggingService
// ---------------------------------------------------------------------------

/// Service wrapper that runs each request inside a fresh tag scope.
#[derive(Debug, Clone)]
pub struct TaggingService<S> {
    inner: S,
    config: Arc<TaggingConfig>,
    correlation_header: HeaderName,
    endpoints: Arc<EndpointCatalog>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TaggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The instance polled ready is the one that must serve this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if !self.config.enabled {
            return Box::pin(inner.call(req));
        }

        let tags = RequestTags::collect(
            &req,
            &self.config,
            &self.endpoints,
            &self.correlation_header,
        );
        let header = self.correlation_header.clone();

        Box::pin(scope::isolated(async move {
            let request_scope = scope::begin(tags.name, tags.action.as_deref());
            for (key, value) in tags.metadata {
                request_scope.set_metadata(key, value);
            }
            debug!(tag = %request_scope.tag(), "request scope opened");

            let mut response = inner.call(req).await?;
            if let Some(value) = tags.echo {
                response.headers_mut().insert(header, value);
            }
            Ok(response)
        }))
    }
}

/// Everything the scope needs, extracted before the request moves on.
#[derive(Debug)]
struct RequestTags {
    name: String,
    action: Option<String>,
    metadata: Vec<(&'static str, String)>,
    /// Generated correlation id to send back to the caller.
    echo: Option<HeaderValue>,
}

impl RequestTags {
    fn collect<B>(
        req: &Request<B>,
        config: &TaggingConfig,
        endpoints: &EndpointCatalog,
        correlation_header: &HeaderName,
    ) -> Self {
        let pattern = req.extensions().get::<MatchedPath>().map(MatchedPath::as_str);
        let (name, action) = endpoints.resolve(req.method(), pattern);

        let mut tags = Self {
            name,
            action: action.filter(|_| config.allows(ACTION_KEY)),
            metadata: Vec::new(),
            echo: None,
        };

        tags.push(config, METHOD_KEY, req.method().as_str().to_string());

        if config.include_endpoint {
            let path = match req.uri().path() {
                "" => "/",
                path => path,
            };
            tags.push(config, PATH_KEY, path.to_string());
        }

        if config.include_user {
            if let Some(user) = req
                .extensions()
                .get::<AuthenticatedUser>()
                .filter(|user| !user.name.is_empty())
            {
                tags.push(config, USER_KEY, user.name.clone());
            }
        }

        if config.include_correlation_id {
            let id = match read_correlation_id(req.headers(), correlation_header) {
                Some(id) => id,
                None => {
                    let id = generate_correlation_id();
                    tags.echo = HeaderValue::from_str(&id).ok();
                    id
                }
            };
            tags.push(config, CORRELATION_ID_KEY, id);
        }

        tags
    }

    fn push(&mut self, config: &TaggingConfig, key: &'static str, value: String) {
        if config.allows(key) {
            self.metadata.push((key, value));
        } else {
            debug!(key, "metadata key not in allow-list, skipped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
