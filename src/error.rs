//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::models::investment::InvestmentStatus;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error code.
///
/// # Error Categories
///
/// - **Validation Errors**: non-positive amounts or quantities, malformed requests
/// - **Resource Errors**: accounts, items or records missing or owned by another company
/// - **Business Rule Errors**: not enough stock, locked attributions, nothing to pay
/// - **Database Errors**: any sqlx::Error from database operations
///
/// A repeated sale recognition is not an error: the ledger absorbs it and
/// returns the entry that already exists.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Cash amount is zero or negative.
    ///
    /// Returns HTTP 400 Bad Request. Nothing is persisted.
    #[error("Amount must be positive")]
    InvalidAmount,

    /// Stock quantity is zero or negative.
    #[error("Quantity must be positive")]
    InvalidQuantity,

    /// Account does not exist or belongs to another company.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Account not found")]
    AccountNotFound,

    /// Item does not exist or belongs to another company.
    #[error("Item not found")]
    ItemNotFound,

    /// Any other record (purchase, attribution) that could not be found.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// FIFO consumption cannot be satisfied from the item's lots.
    ///
    /// Returns HTTP 422. No lot has been decremented.
    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: Uuid,
        requested: i64,
        available: i64,
    },

    /// Attribution has already been sold or paid and is part of the audit trail.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Investment attribution is {status} and can no longer be changed")]
    AttributionLocked { status: InvestmentStatus },

    /// The investor has no sold attributions to pay out.
    #[error("Nothing to pay")]
    NothingToPay,

    /// Request body or parameters are invalid.
    ///
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

impl AppError {
    /// Machine-readable error code used in JSON bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "internal_error",
            AppError::InvalidApiKey => "invalid_api_key",
            AppError::InvalidAmount => "invalid_amount",
            AppError::InvalidQuantity => "invalid_quantity",
            AppError::AccountNotFound => "account_not_found",
            AppError::ItemNotFound => "item_not_found",
            AppError::NotFound(_) => "not_found",
            AppError::InsufficientStock { .. } => "insufficient_stock",
            AppError::AttributionLocked { .. } => "attribution_locked",
            AppError::NothingToPay => "nothing_to_pay",
            AppError::InvalidRequest(_) => "invalid_request",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            AppError::InvalidAmount | AppError::InvalidQuantity | AppError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::AccountNotFound | AppError::ItemNotFound | AppError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::InsufficientStock { .. } | AppError::NothingToPay => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::AttributionLocked { .. } => StatusCode::CONFLICT,
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Database errors are logged and reported as a generic 500 so that
/// driver details never reach the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            AppError::Database(ref err) => {
                tracing::error!(error = %err, "database error");
                "An internal error occurred".to_string()
            }
            AppError::InvalidRequest(ref msg) => msg.clone(),
            ref other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
