//! API error type with HTTP response mapping.
//!
//! Every failure is rendered as
//! `{"error": {"kind": "...", "message": "...", "fields": [...]}}`, where
//! `kind` is the stable code from [`ErrorKind`] and `fields` only appears
//! for validation failures.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, ErrorKind};
use projections::ProjectionError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    /// Failure from a checkout, fulfillment or payment operation.
    Checkout(CheckoutError),
    /// The read side could not be brought up to date.
    Projection(ProjectionError),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Checkout(CheckoutError::validation(message))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Checkout(err) => err.kind(),
            ApiError::Projection(_) => ErrorKind::Internal,
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::SignatureInvalid => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InsufficientStock
        | ErrorKind::InvalidCoupon
        | ErrorKind::CartEmpty
        | ErrorKind::InvalidTransition => StatusCode::CONFLICT,
        ErrorKind::TransientDependency => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        let mut error = match &self {
            ApiError::Checkout(err) if kind != ErrorKind::Internal => json!({
                "kind": kind.as_str(),
                "message": err.to_string(),
            }),
            ApiError::Checkout(err) => {
                tracing::error!(error = %err, "internal server error");
                json!({ "kind": kind.as_str(), "message": "internal server error" })
            }
            ApiError::Projection(err) => {
                tracing::error!(error = %err, "read model unavailable");
                json!({ "kind": kind.as_str(), "message": "internal server error" })
            }
        };
        if let ApiError::Checkout(err) = &self
            && !err.fields().is_empty()
        {
            error["fields"] = json!(err.fields());
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if kind.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Projection(err)
    }
}
