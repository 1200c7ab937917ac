//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, ErrorKind, InventoryError};
use domain::DomainError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No authenticated user on the request.
    #[error("Missing {0} header")]
    Unauthenticated(&'static str),

    /// The body could not be parsed.
    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthenticated(_) | ApiError::BadRequest(_) => ErrorKind::ValidationError,
            ApiError::Checkout(e) => e.kind(),
            ApiError::Inventory(e) => e.kind(),
            ApiError::Domain(e) => e.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            _ => status_for(self.kind()),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Checkout(e) => e.details(),
            ApiError::Inventory(e) => e.details(),
            _ => None,
        }
    }
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ValidationError | ErrorKind::EmptyCart | ErrorKind::InventoryInvalid => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientStock | ErrorKind::Conflict | ErrorKind::NotAvailable => {
            StatusCode::CONFLICT
        }
        ErrorKind::DependencyUnavailable | ErrorKind::OrchestratorUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = %self.kind(), "request failed");
        }

        let mut body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        if let Some(details) = self.details() {
            body["details"] = details;
        }
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
