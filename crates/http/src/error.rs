//! Error handling for the shelf HTTP layer

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Category reported for client-fixable request problems.
pub const INVALID_INPUT: &str = "Invalid input data. Please check required fields.";
/// Category reported for store failures other than connectivity.
pub const INTERNAL_ERROR: &str = "Internal Server Error";
/// Category reported when the document store cannot be reached.
pub const DATABASE_UNAVAILABLE: &str = "Database connection failed";
/// Category reported when a request outlives the server's time limit.
pub const REQUEST_TIMEOUT: &str = "Request timed out";

/// Body of every failure response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// One of the fixed error categories
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Body of confirmations and not-found responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Application error types that map to HTTP responses
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid input: {details}")]
    Validation { details: String },

    #[error("malformed identifier '{value}'")]
    MalformedId { value: String },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("request exceeded {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Create a validation error
    pub fn validation(details: impl Into<String>) -> Self {
        Self::Validation {
            details: details.into(),
        }
    }

    pub fn malformed_id(value: impl Into<String>) -> Self {
        Self::MalformedId {
            value: value.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn unavailable(details: impl Into<String>) -> Self {
        Self::Unavailable(details.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } | AppError::MalformedId { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            AppError::Unavailable(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4();
        let status = self.status();

        let (category, details) = match self {
            AppError::NotFound { message } => {
                tracing::info!(error_id = %error_id, %message, "resource not found");
                return (status, Json(MessageBody::new(message))).into_response();
            }
            AppError::Validation { details } => (INVALID_INPUT, details),
            AppError::MalformedId { value } => {
                (INVALID_INPUT, format!("'{}' is not a valid identifier", value))
            }
            AppError::Unavailable(details) => (DATABASE_UNAVAILABLE, details),
            AppError::Timeout { limit_ms } => {
                (REQUEST_TIMEOUT, format!("no response within {} ms", limit_ms))
            }
            AppError::Internal(e) => (INTERNAL_ERROR, format!("{:#}", e)),
        };

        if status.is_server_error() {
            tracing::error!(
                error_id = %error_id,
                status_code = %status.as_u16(),
                details = %details,
                "{}",
                category
            );
        } else {
            tracing::warn!(
                error_id = %error_id,
                status_code = %status.as_u16(),
                details = %details,
                "rejected request"
            );
        }

        // Release builds keep store internals out of 5xx bodies
        let details = if cfg!(not(debug_assertions)) && status.is_server_error() {
            None
        } else {
            Some(details)
        };

        let body = ErrorBody {
            error: category.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
