use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::form::FieldErrors;

/// Errors surfaced by the HTTP handlers. The body is always
/// `{"detail": "<message>"}`, plus per-field `errors` for validation.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed form data: {0}")]
    MalformedForm(String),

    #[error("Malformed form data: {}", .0.body_text())]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    Validation(FieldErrors),

    #[error("{0}")]
    Unauthorized(#[from] AuthError),

    #[error("{0}")]
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MalformedForm(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Multipart(err) => err.status(),
            AppError::Unauthorized(err) if err.is_forbidden() => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
        };

        let body = match &self {
            AppError::Validation(errors) => json!({
                "detail": errors.to_string(),
                "errors": errors,
            }),
            other => json!({ "detail": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
