use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No content received from AI")]
    EmptyAiResponse,

    #[error("Failed to parse AI response: {0}")]
    InvalidAiResponse(String),

    #[error("AI provider error: {0}")]
    Upstream(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Realtime error: {0}")]
    Realtime(String),

    #[error("Internal server error")]
    InternalServerError,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Flat message shown to the end user.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound => "Not Found".to_string(),
            AppError::BadRequest(msg) | AppError::Unauthorized(msg) => msg.clone(),
            AppError::Config(msg) => msg.clone(),
            AppError::EmptyAiResponse => "No content received from AI".to_string(),
            AppError::InvalidAiResponse(_) => "Failed to parse AI response".to_string(),
            AppError::Upstream(msg) | AppError::Backend(msg) | AppError::Realtime(msg) => msg.clone(),
            AppError::Database(_) | AppError::Migration(_) => "Failed to save todos".to_string(),
            AppError::Http(_) => "Upstream request failed".to_string(),
            AppError::InternalServerError => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.user_message(),
        });

        (status, body).into_response()
    }
}
