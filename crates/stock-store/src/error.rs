use thiserror::Error;

use crate::{ProductId, ReservationId};

/// Errors that can occur when interacting with the stock store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product row does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The reservation row does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// A product with this ID is already registered.
    #[error("Product already exists: {0}")]
    DuplicateProduct(ProductId),

    /// A movement failed its invariant checks and was not written.
    #[error("Invalid movement: {0}")]
    InvalidMovement(String),

    /// A reservation failed its invariant checks and was not written.
    #[error("Invalid reservation: {0}")]
    InvalidReservation(String),

    /// A stored value could not be decoded into the data model.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for stock store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
