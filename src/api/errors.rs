use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core::errors::{ErrorKind, ProctorError};

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(String),
    BadRequest { detail: String, code: Option<&'static str> },
    NotFound(String),
    Conflict { detail: String, code: Option<&'static str> },
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    pub(crate) fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest { detail: detail.into(), code: None }
    }
}

impl From<ProctorError> for ApiError {
    fn from(err: ProctorError) -> Self {
        let code = err.code();
        match err.kind() {
            ErrorKind::Validation => Self::BadRequest { detail: err.to_string(), code },
            ErrorKind::NotFound => Self::NotFound(err.to_string()),
            ErrorKind::StateConflict => Self::Conflict { detail: err.to_string(), code },
            ErrorKind::Forbidden => Self::Forbidden(err.to_string()),
            ErrorKind::Internal => Self::internal(err, "Storage operation failed"),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::bad_request(err.to_string())
    }
}

fn error_body(status: StatusCode, detail: String, code: Option<&'static str>) -> Response {
    (status, Json(ErrorResponse { status: status.as_u16(), detail, code })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let mut response =
                    error_body(StatusCode::UNAUTHORIZED, message.to_string(), None);
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => error_body(StatusCode::FORBIDDEN, message, None),
            ApiError::BadRequest { detail, code } => {
                error_body(StatusCode::BAD_REQUEST, detail, code)
            }
            ApiError::NotFound(message) => error_body(StatusCode::NOT_FOUND, message, None),
            ApiError::Conflict { detail, code } => error_body(StatusCode::CONFLICT, detail, code),
            ApiError::Internal(message) => {
                error_body(StatusCode::INTERNAL_SERVER_ERROR, message, None)
            }
        }
    }
}
