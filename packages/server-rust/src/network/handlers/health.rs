//! Liveness endpoint handler.

use axum::http::StatusCode;

/// Liveness probe -- always returns 200 OK.
///
/// Only checks that the process is running and responsive.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}
