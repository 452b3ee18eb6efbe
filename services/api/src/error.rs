//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use crate::config::ConfigError;
use crate::web::protocol::ApiResponse;
use attendance_core::AttendanceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the attendance engine.
    #[error("Attendance error: {0}")]
    Attendance(#[from] AttendanceError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error while applying database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Attendance(e) => match e {
                AttendanceError::Validation(_) => StatusCode::BAD_REQUEST,
                AttendanceError::NotFound(_) | AttendanceError::EmptyResult(_) => {
                    StatusCode::NOT_FOUND
                }
                AttendanceError::Conflict(_) => StatusCode::CONFLICT,
                AttendanceError::Store(_) | AttendanceError::Export(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing message. Server-side failures are not described in detail.
    fn public_message(&self) -> String {
        match self {
            ApiError::Attendance(
                e @ (AttendanceError::Validation(_)
                | AttendanceError::NotFound(_)
                | AttendanceError::EmptyResult(_)
                | AttendanceError::Conflict(_)),
            ) => e.to_string(),
            ApiError::Attendance(AttendanceError::Store(_)) => {
                "The attendance store is unavailable, please try again".to_string()
            }
            _ => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        let body: ApiResponse<()> = ApiResponse::failure(self.public_message());
        (status, Json(body)).into_response()
    }
}
