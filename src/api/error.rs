//! Error response shapes for the HTTP surface.
//!
//! `/function/<name>` failures are returned as short plain text to match the
//! literal bodies the end-to-end test scenarios expect; every other
//! endpoint (admin, observability) returns the small JSON envelope the
//! platform's own `control-plane` API uses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// JSON error for admin/observability endpoints.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

/// Plain-text error for `/function/<name>`, matching the expected literal
/// scenario bodies exactly (no JSON envelope).
pub struct DispatchError {
    pub status: StatusCode,
    pub body: &'static str,
}

impl DispatchError {
    pub const fn new(status: StatusCode, body: &'static str) -> Self {
        Self { status, body }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        (self.status, self.body).into_response()
    }
}
