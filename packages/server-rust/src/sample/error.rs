//! Errors returned by the sample handlers and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sqltag_core::MetadataError;

/// Errors returned by the sample handlers.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u32 },
    #[error("{0}")]
    BadRequest(String),
    #[error("invalid query metadata: {0}")]
    Metadata(#[from] MetadataError),
}

impl SampleError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            SampleError::NotFound { .. } => StatusCode::NOT_FOUND,
            SampleError::BadRequest(_) => StatusCode::BAD_REQUEST,
            SampleError::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SampleError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
