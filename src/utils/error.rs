use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Authorization error: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(_) | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_type, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                ("database_error", "Internal server error".to_string())
            }
            AppError::Auth(msg) => {
                tracing::debug!("Auth error: {}", msg);
                ("auth_error", msg)
            }
            AppError::Unauthorized(msg) => {
                tracing::debug!("Unauthorized: {}", msg);
                ("unauthorized", msg)
            }
            AppError::Forbidden(msg) => {
                tracing::debug!("Forbidden: {}", msg);
                ("forbidden", msg)
            }
            AppError::NotFound(msg) => {
                tracing::debug!("Not found: {}", msg);
                ("not_found", msg)
            }
            AppError::BadRequest(msg) => {
                tracing::debug!("Bad request: {}", msg);
                ("bad_request", msg)
            }
            AppError::Validation(msg) => ("validation_error", msg),
            AppError::PayloadTooLarge(msg) => {
                tracing::debug!("Payload too large: {}", msg);
                ("payload_too_large", msg)
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                ("internal_error", "File not accessible".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("internal_error", "Internal server error".to_string())
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
