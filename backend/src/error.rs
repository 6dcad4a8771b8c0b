//! Error handling for LiteWMS
//!
//! Provides consistent JSON error responses for the HTTP API and
//! descriptive messages for the admin CLI

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::LedgerError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    /// An existing entry refers to a stock position that no longer exists
    #[error("Inconsistent reference: {0}")]
    InconsistentReference(String),

    #[error("Transaction {0} has already been reverted; delete its REVERT entry first")]
    AlreadyReverted(i64),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Machine readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InconsistentReference(_) => "INCONSISTENT_REFERENCE",
            AppError::AlreadyReverted(_) => "ALREADY_REVERTED",
            AppError::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InconsistentReference(_)
            | AppError::AlreadyReverted(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Validation { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) | AppError::DatabaseError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Storage and internal failures, as opposed to refusals caused by the
    /// request itself
    pub fn is_unexpected(&self) -> bool {
        self.status().is_server_error()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => AppError::NotFound(format!("Transaction {}", id)),
            LedgerError::UnknownStock(key) => AppError::InconsistentReference(format!(
                "stock position {} no longer exists",
                key
            )),
            LedgerError::AlreadyReverted(id) => AppError::AlreadyReverted(id),
            err @ LedgerError::InsufficientStock { .. } => {
                AppError::InsufficientStock(err.to_string())
            }
            err @ LedgerError::MultiLineQuantityEdit { .. } => {
                AppError::validation("quantity", err.to_string())
            }
            LedgerError::EmptyPatch => AppError::ValidationError("Nothing to modify".to_string()),
            err @ LedgerError::Overflow(_) => AppError::ValidationError(err.to_string()),
            LedgerError::Invalid(message) => AppError::ValidationError(message.to_string()),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server side details stay in the log
        let message = match &self {
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            other => other.to_string(),
        };
        let field = match &self {
            AppError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };

        if self.is_unexpected() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), "Request refused: {}", self);
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Specs, StockKey};

    #[test]
    fn test_ledger_errors_map_to_statuses() {
        let key = StockKey::new(1, 2, Specs::new());
        let cases = [
            (LedgerError::NotFound(9), StatusCode::NOT_FOUND),
            (LedgerError::UnknownStock(key.clone()), StatusCode::CONFLICT),
            (LedgerError::AlreadyReverted(3), StatusCode::CONFLICT),
            (
                LedgerError::InsufficientStock { key, on_hand: 1, requested: 5 },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                LedgerError::MultiLineQuantityEdit { id: 4, lines: 2 },
                StatusCode::BAD_REQUEST,
            ),
            (LedgerError::EmptyPatch, StatusCode::BAD_REQUEST),
            (LedgerError::Invalid("bad"), StatusCode::BAD_REQUEST),
        ];

        for (ledger_err, status) in cases {
            assert_eq!(AppError::from(ledger_err).status(), status);
        }
    }

    #[test]
    fn test_unknown_stock_is_inconsistent_reference() {
        let err = AppError::from(LedgerError::UnknownStock(StockKey::new(1, 2, Specs::new())));
        assert_eq!(err.code(), "INCONSISTENT_REFERENCE");
        assert!(!err.is_unexpected());
    }

    #[test]
    fn test_database_errors_are_unexpected() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_unexpected());
    }

    #[test]
    fn test_config_errors_are_unexpected() {
        let err = AppError::from(config::ConfigError::Message("missing database.url".into()));
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        assert!(err.is_unexpected());
        assert!(err.to_string().contains("missing database.url"));
    }

    #[test]
    fn test_conflict_is_a_refusal() {
        let err = AppError::Conflict("Warehouse 2 still holds 3 items".to_string());
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(!err.is_unexpected());
    }

    #[test]
    fn test_validation_carries_field() {
        let response = AppError::validation("operator", "Operator is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
