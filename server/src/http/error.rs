//! API error type; every failure is answered with `{"detail": "..."}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;
use tracing::{error, warn};

use crate::clients::ClientError;

#[derive(Debug, ThisError)]
pub enum ApiError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Invalid token payload: missing {0}")]
    MissingClaim(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("Upstream service error")]
    Upstream(#[from] ClientError),
    #[error("Internal server error")]
    Database(#[from] sqlx::Error),
    #[error("Internal server error")]
    Internal(#[from] eyre::Report),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::BadRequest(detail.into())
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::Forbidden(detail.into())
    }

    pub const fn status(&self) -> StatusCode {
        match *self {
            Self::NotAuthenticated | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InvalidToken | Self::MissingClaim(_) | Self::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Upstream(ref err) => warn!(error = %err, "Upstream request failed"),
            Self::Database(ref err) => error!(error = %err, "Database error"),
            Self::Internal(ref err) => error!(error = ?err, "Internal error"),
            _ => {}
        }
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
