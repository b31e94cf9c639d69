//! Demo identity: trusts a request header as the authenticated user.
//!
//! Stands in for a real authentication layer so the tagging middleware has
//! an [`AuthenticatedUser`] to pick up. Not for production use.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::tagging::AuthenticatedUser;

/// Header naming the demo user.
pub const DEMO_USER_HEADER: &str = "x-demo-user";

/// Inserts [`AuthenticatedUser`] when [`DEMO_USER_HEADER`] carries a name.
pub async fn demo_identity(mut req: Request, next: Next) -> Response {
    let name = req
        .headers()
        .get(DEMO_USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    if let Some(name) = name {
        req.extensions_mut().insert(AuthenticatedUser { name });
    }
    next.run(req).await
}
