//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::BlinkyError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Malformed or out-of-range request body
    InvalidRequest(String),

    /// The registry actor is gone or did not answer
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, format!("Bad request: {msg}\n")),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {msg}\n"),
            ),
        };

        (status, message).into_response()
    }
}

impl From<BlinkyError> for ApiError {
    fn from(err: BlinkyError) -> Self {
        match err {
            BlinkyError::ProtocolViolation(msg) => ApiError::InvalidRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}
