//! Ledger error types.

use common::{ProductId, ReservationId};
use stock_store::{ParseMovementTypeError, StoreError};
use thiserror::Error;

use crate::reason::{AdjustmentReason, ParseAdjustmentReasonError};

/// Errors returned by ledger operations.
///
/// Every variant except `Store` is a business rejection: the operation was
/// abandoned before anything was committed.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The referenced product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The referenced reservation does not exist (released, fulfilled or swept).
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// A movement or reservation quantity was not positive.
    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i64),

    /// The change would take the stock count outside the representable range.
    #[error("Quantity change {change} on current stock {current} is out of range")]
    QuantityOutOfRange { current: i64, change: i64 },

    /// The operation would drive available or actual stock below zero.
    #[error("{message}")]
    InsufficientStock {
        available: i64,
        requested: i64,
        message: String,
    },

    /// The adjustment reason is outside the allowed vocabulary.
    #[error("Invalid adjustment reason '{0}'. Allowed reasons: {allowed}", allowed = allowed_reasons())]
    InvalidReason(String),

    /// The adjustment is too large to apply without approval.
    #[error(
        "Adjustments larger than {threshold} units require approval (requested: {quantity})"
    )]
    ApprovalRequired { quantity: i64, threshold: i64 },

    /// The operation is not allowed through this entry point.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The underlying store failed.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl LedgerError {
    /// A reservation asked for more than is currently available.
    pub fn insufficient_available(available: i64, requested: i64) -> Self {
        LedgerError::InsufficientStock {
            available,
            requested,
            message: format!(
                "Insufficient stock available. Available: {available}, Requested: {requested}"
            ),
        }
    }

    /// A reducing movement asked for more than the product holds.
    pub fn insufficient_on_hand(current: i64, requested: i64) -> Self {
        LedgerError::InsufficientStock {
            available: current,
            requested,
            message: format!("Insufficient stock. Current: {current}, Requested: {requested}"),
        }
    }

    /// An adjustment would take the product below zero.
    pub fn below_zero(current: i64, change: i64) -> Self {
        LedgerError::InsufficientStock {
            available: current,
            requested: change.abs(),
            message: format!("Cannot reduce stock below zero. Current: {current}, Change: {change}"),
        }
    }

    /// True for the NotFound kind (missing product or reservation).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::ProductNotFound(_) | LedgerError::ReservationNotFound(_)
        )
    }
}

fn allowed_reasons() -> String {
    AdjustmentReason::ALL
        .iter()
        .map(AdjustmentReason::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ProductNotFound(id) => LedgerError::ProductNotFound(id),
            StoreError::ReservationNotFound(id) => LedgerError::ReservationNotFound(id),
            other => LedgerError::Store(other),
        }
    }
}

impl From<ParseMovementTypeError> for LedgerError {
    fn from(err: ParseMovementTypeError) -> Self {
        LedgerError::UnsupportedOperation(err.to_string())
    }
}

impl From<ParseAdjustmentReasonError> for LedgerError {
    fn from(err: ParseAdjustmentReasonError) -> Self {
        LedgerError::InvalidReason(err.0)
    }
}

/// Convenience type alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;
