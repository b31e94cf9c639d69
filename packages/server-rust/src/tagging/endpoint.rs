//! Resolves a request to the controller/action names used for its scope.

use std::collections::HashMap;

use http::Method;

/// Scope name used when a request matches no registered endpoint.
pub const DEFAULT_SCOPE_NAME: &str = "Request";

/// Logical controller/action pair for one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub controller: String,
    pub action: String,
}

/// Maps `(method, route pattern)` to an [`Endpoint`].
///
/// Route patterns are the strings passed to `Router::route`
/// (`/api/products/{id}`), matched against axum's `MatchedPath`.
#[derive(Debug, Clone, Default)]
pub struct EndpointCatalog {
    routes: HashMap<(Method, String), Endpoint>,
}

impl EndpointCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint, replacing any previous entry for the same route.
    #[must_use]
    pub fn with(
        mut self,
        method: Method,
        pattern: impl Into<String>,
        controller: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        self.routes.insert(
            (method, pattern.into()),
            Endpoint {
                controller: controller.into(),
                action: action.into(),
            },
        );
        self
    }

    #[must_use]
    pub fn get(&self, method: &Method, pattern: &str) -> Option<&Endpoint> {
        self.routes.get(&(method.clone(), pattern.to_string()))
    }

    /// Scope name and optional action for a request.
    ///
    /// Unknown routes, or requests without a matched pattern, get
    /// [`DEFAULT_SCOPE_NAME`] and no action. An empty controller name also
    /// falls back to the default.
    #[must_use]
    pub fn resolve(&self, method: &Method, pattern: Option<&str>) -> (String, Option<String>) {
        let Some(endpoint) = pattern.and_then(|p| self.get(method, p)) else {
            return (DEFAULT_SCOPE_NAME.to_string(), None);
        };

        let name = if endpoint.controller.is_empty() {
            DEFAULT_SCOPE_NAME.to_string()
        } else {
            endpoint.controller.clone()
        };
        let action = Some(endpoint.action.clone()).filter(|a| !a.is_empty());
        (name, action)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
