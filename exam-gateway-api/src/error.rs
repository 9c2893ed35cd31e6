use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::security::{CsrfError, RateLimitError};

/// Message returned for every rejected field, malformed or adversarial alike.
pub const INVALID_INPUT_MESSAGE: &str = "Invalid input";

#[derive(Error, Debug)]
pub enum ApiError {
    /// The detail is for logs only; clients always see the generic message.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Csrf(#[from] CsrfError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<exam_gateway_core::CoreError> for ApiError {
    fn from(err: exam_gateway_core::CoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Csrf(err) => return err.into_response(),
            ApiError::RateLimited(err) => return err.into_response(),
            ApiError::Validation(detail) => {
                tracing::debug!(detail = %detail, "Rejected request input");
                (StatusCode::BAD_REQUEST, INVALID_INPUT_MESSAGE)
            }
            ApiError::BadRequest(detail) => {
                tracing::debug!(detail = %detail, "Rejected malformed request");
                (StatusCode::BAD_REQUEST, INVALID_INPUT_MESSAGE)
            }
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
