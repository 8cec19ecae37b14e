use std::path::PathBuf;
use thiserror::Error;

#[cfg(feature = "api")]
use actix_web::{http::StatusCode, HttpResponse, ResponseError};

#[cfg(feature = "api")]
use crate::models::ErrorResponse;

/// Lookup failures surfaced to callers of the session cache
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("No results found for round {0}")]
    RoundNotFound(u32),

    #[error("No data for driver {driver} in round {round}")]
    DriverNotFound { round: u32, driver: String },
}

/// Reasons a single round failed to load; logged, never surfaced
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("upstream fetch failed for round {round}: {source}")]
    Upstream {
        round: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("round {round} failed validation: {reason}")]
    Validation { round: u32, reason: String },
}

/// Lap-time model artifact and inference errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model artifact not found at {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse preprocessor: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("feature schema mismatch: {0}")]
    Schema(String),

    #[error("encoded width mismatch: expected {expected}, got {actual}")]
    Width { expected: usize, actual: usize },

    #[error("model produced a non-finite value: {0}")]
    NonFinite(f32),

    #[error("inference backend error: {0}")]
    Backend(String),

    #[error("no inference backend compiled in")]
    BackendDisabled,
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Invalid request data
    ValidationError(String),
    /// Requested round or driver is unavailable
    NotFound(String),
    /// Internal server error
    InternalError(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        AppError::NotFound(err.to_string())
    }
}

#[cfg(feature = "api")]
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_code, message) = match self {
            AppError::ValidationError(msg) => ("validation_error", msg.clone()),
            AppError::NotFound(msg) => ("not_found", msg.clone()),
            AppError::InternalError(msg) => ("internal_error", msg.clone()),
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: error_code.to_string(),
            message,
        })
    }
}

/// Validation functions
pub fn validate_round(round: u32, total_rounds: u32) -> Result<(), AppError> {
    if !(1..=total_rounds).contains(&round) {
        return Err(AppError::ValidationError(format!(
            "Round must be between 1 and {}, got {}",
            total_rounds, round
        )));
    }
    Ok(())
}

pub fn validate_gap(gap: f64) -> Result<(), AppError> {
    if !gap.is_finite() || gap < 0.0 {
        return Err(AppError::ValidationError(format!(
            "Gap must be a non-negative number of seconds, got {}",
            gap
        )));
    }
    Ok(())
}

pub fn validate_driver_code(code: &str) -> Result<(), AppError> {
    let trimmed = code.trim();
    if trimmed.is_empty() || trimmed.len() > 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::ValidationError(format!(
            "Driver code must be 1-3 letters, got {:?}",
            code
        )));
    }
    Ok(())
}

pub fn validate_total_laps(current_lap: u32, total_laps: u32) -> Result<(), AppError> {
    if total_laps == 0 {
        return Err(AppError::ValidationError(
            "Total laps must be greater than 0".to_string(),
        ));
    }
    if current_lap > total_laps {
        return Err(AppError::ValidationError(format!(
            "Current lap {} exceeds total laps {}",
            current_lap, total_laps
        )));
    }
    Ok(())
}
