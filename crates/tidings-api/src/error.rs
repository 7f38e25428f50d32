//! Tidings — API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tidings_core::error::FeedError;
use tracing::error;

/// Startup errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migrations failed to apply.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The span exporter could not be built.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Short error label.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `FeedError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub FeedError);

impl From<FeedError> for ApiError {
    fn from(err: FeedError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, label, message) = match &self.0 {
            FeedError::NotFound { .. } => (StatusCode::NOT_FOUND, "Not found", self.0.to_string()),
            FeedError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "Bad request", self.0.to_string())
            }
            FeedError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Unauthorized", self.0.to_string())
            }
            FeedError::Infrastructure(_) => {
                error!(error = %self.0, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    "internal server error".to_owned(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error: label,
                message,
            }),
        )
            .into_response()
    }
}
