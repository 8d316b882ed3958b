//! HTTP error mapping. Bodies stay generic; details go to the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pobweb_vfs::VfsError;
use thiserror::Error;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found")]
    NotFound,

    #[error("already exists")]
    Conflict,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("storage unavailable")]
    Unavailable,
}

impl ApiError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::BadRequest(_) => "Bad Request",
            Self::NotFound => "Not Found",
            Self::Conflict => "Conflict",
            Self::PayloadTooLarge => "Payload Too Large",
            Self::Unavailable => "Service Unavailable",
        };
        (self.status_code(), body).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        if e.is_unauthenticated() {
            Self::Unauthorized
        } else {
            Self::Forbidden
        }
    }
}

impl From<VfsError> for ApiError {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound { .. } => Self::NotFound,
            VfsError::Conflict { .. } => Self::Conflict,
            VfsError::InvalidSubject { .. } => Self::Forbidden,
            VfsError::TooLarge { .. } => Self::PayloadTooLarge,
            VfsError::InvalidPath { .. }
            | VfsError::InvalidNamespace { .. }
            | VfsError::InvalidMetadata { .. } => Self::BadRequest(e.to_string()),
            VfsError::Backend(inner) => {
                tracing::error!(event = "backend_failure", error = %inner);
                Self::Unavailable
            }
        }
    }
}
