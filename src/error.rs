// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::models::question::Category;

/// Global Application Error Enum.
/// Every layer (bank, store, scoring, engine, handlers) reports through it.
#[derive(Debug)]
pub enum AppError {
    // Unknown lab / question / attempt / student id
    NotFound(String),

    // Duplicate open attempt for the same (student, lab)
    Conflict(String),

    // Operation on a finalized attempt, or on an engine without a session
    InvalidState(String),

    // Answer submitted after the session clock ran out
    Expired(String),

    // The bank cannot satisfy a lab's category quota
    InsufficientQuestions {
        lab_id: i64,
        category: Category,
        required: i64,
        available: i64,
    },

    // Question index outside the sampled set
    OutOfRange { index: usize, len: usize },

    // Malformed input (validation, answer shape)
    BadRequest(String),

    // Underlying persistence failure
    Storage(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InsufficientQuestions {
                lab_id,
                category,
                required,
                available,
            } => write!(
                f,
                "lab {} needs {} {} question(s), only {} available",
                lab_id,
                required,
                category.as_str(),
                available
            ),
            AppError::OutOfRange { index, len } => {
                write!(f, "question index {} out of range (0..{})", index, len)
            }
            _ => write!(f, "{:?}", self),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::Expired(_) => StatusCode::GONE,
            AppError::InsufficientQuestions { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::OutOfRange { .. } | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error_message = match self {
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidState(msg)
            | AppError::Expired(msg)
            | AppError::BadRequest(msg) => msg,
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::Storage`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
