//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ledger::LedgerError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Ledger rejection or failure.
    Ledger(LedgerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Ledger(err) => ledger_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn ledger_error_to_response(err: LedgerError) -> (StatusCode, String) {
    let status = match &err {
        LedgerError::ProductNotFound(_) | LedgerError::ReservationNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        LedgerError::InvalidQuantity(_)
        | LedgerError::QuantityOutOfRange { .. }
        | LedgerError::InvalidReason(_)
        | LedgerError::UnsupportedOperation(_) => StatusCode::BAD_REQUEST,
        LedgerError::InsufficientStock { .. } => StatusCode::CONFLICT,
        LedgerError::ApprovalRequired { .. } => StatusCode::FORBIDDEN,
        LedgerError::Store(store_err) => {
            tracing::error!(error = %store_err, "store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}
