use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub detail: String,
}

/// Errors surfaced by the engine. Expected negative evaluation outcomes
/// (unknown flag, missing subject, excluded cohort) are not errors; they come
/// back as regular evaluation results.
#[derive(Error, Debug)]
pub enum FlagError {
    #[error("flag key must not be empty")]
    EmptyFlagKey,
    #[error("rollout percentage {0} is out of range, must be within [0, 100]")]
    InvalidRolloutPercentage(i16),
    #[error("no flag found for key {0}")]
    FlagNotFound(String),
    #[error("a flag with key {0} already exists")]
    FlagAlreadyExists(String),
    #[error("flag {0} was modified concurrently, retry the update")]
    UpdateConflict(String),
    #[error("failed to parse stored data")]
    DataParsingError,
    #[error("database unavailable")]
    DatabaseUnavailable,
    #[error("database error: {0}")]
    DatabaseError(String),
}

impl FlagError {
    /// Returns (error_code, status_code) for this error, so the error code
    /// and HTTP status always stay consistent.
    fn error_metadata(&self) -> (&'static str, StatusCode) {
        match self {
            // Validation errors (400)
            FlagError::EmptyFlagKey => ("empty_flag_key", StatusCode::BAD_REQUEST),
            FlagError::InvalidRolloutPercentage(_) => {
                ("invalid_rollout_percentage", StatusCode::BAD_REQUEST)
            }

            // Admin lookups and races (404 / 409)
            FlagError::FlagNotFound(_) => ("flag_not_found", StatusCode::NOT_FOUND),
            FlagError::FlagAlreadyExists(_) => ("flag_already_exists", StatusCode::CONFLICT),
            FlagError::UpdateConflict(_) => ("update_conflict", StatusCode::CONFLICT),

            // Infrastructure errors (500 / 503)
            FlagError::DataParsingError => {
                ("data_parsing_error", StatusCode::INTERNAL_SERVER_ERROR)
            }
            FlagError::DatabaseError(_) => ("database_error", StatusCode::INTERNAL_SERVER_ERROR),
            FlagError::DatabaseUnavailable => {
                ("database_unavailable", StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    }
}

impl IntoResponse for FlagError {
    fn into_response(self) -> Response {
        let (code, status) = self.error_metadata();
        let body = Json(ErrorResponse {
            code: code.to_string(),
            detail: self.to_string(),
        });
        (status, body).into_response()
    }
}
