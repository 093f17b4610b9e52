//! Maps `PrintarrError` onto the `{error, message, retry_after?}` response
//! shape and an HTTP status code, via the error category every variant
//! already carries (spec.md §7 error handling; `PrintarrError::category`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use printarr_core::error::{ErrorCategory, PrintarrError};
use serde::Serialize;

pub struct ApiError(pub PrintarrError);

impl From<PrintarrError> for ApiError {
    fn from(err: PrintarrError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

fn status_and_code(category: ErrorCategory) -> (StatusCode, &'static str) {
    match category {
        ErrorCategory::Validation => (StatusCode::BAD_REQUEST, "validation_error"),
        ErrorCategory::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        ErrorCategory::Conflict => (StatusCode::CONFLICT, "conflict"),
        ErrorCategory::AuthRequired => (StatusCode::UNAUTHORIZED, "auth_required"),
        ErrorCategory::AuthFailed => (StatusCode::UNAUTHORIZED, "auth_failed"),
        ErrorCategory::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        ErrorCategory::Upstream => (StatusCode::BAD_GATEWAY, "upstream_error"),
        ErrorCategory::Transient => (StatusCode::SERVICE_UNAVAILABLE, "transient_error"),
        ErrorCategory::Permanent => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let category = self.0.category();
        let (status, code) = status_and_code(category);
        let retry_after = match &self.0 {
            PrintarrError::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        };
        (status, Json(ErrorBody { error: code, message: self.0.to_string(), retry_after })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
