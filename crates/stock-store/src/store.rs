use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;

use crate::{
    ActorId, MovementQuery, MovementType, Product, ProductId, ReservationId, ReservationTotals,
    Result, StockMovement, StockReservation, StoreError,
};

/// A stream of movements.
pub type MovementStream = Pin<Box<dyn Stream<Item = Result<StockMovement>> + Send>>;

/// One atomic unit of work against the store.
///
/// Writes are staged until [`StockTransaction::commit`]; dropping the
/// transaction without committing discards them. `lock_product` takes a
/// write lock on the product so that check-then-write sequences on the
/// same product are serialized between concurrent transactions.
#[async_trait]
pub trait StockTransaction: Send {
    /// Reads a product and locks it for the rest of the transaction.
    ///
    /// Returns None if the product does not exist.
    async fn lock_product(&mut self, product_id: ProductId) -> Result<Option<Product>>;

    /// Sums the quantities of reservations on the product that are active at `now`.
    async fn reserved_quantity(&mut self, product_id: ProductId, now: DateTime<Utc>)
    -> Result<i64>;

    /// Sets the product's authoritative quantity.
    async fn set_quantity(&mut self, product_id: ProductId, quantity: i64) -> Result<()>;

    /// Appends a movement row.
    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<()>;

    /// Inserts a reservation row.
    async fn insert_reservation(&mut self, reservation: &StockReservation) -> Result<()>;

    /// Deletes a reservation and returns it.
    ///
    /// Returns None if it does not exist.
    async fn take_reservation(
        &mut self,
        reservation_id: ReservationId,
    ) -> Result<Option<StockReservation>>;

    /// Makes every staged write visible at once.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Core trait for stock store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Mutations that
/// change a product quantity go through [`StockStore::begin`]; the other
/// methods are single-statement reads and deletes.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn StockTransaction>>;

    /// Registers a product.
    ///
    /// Fails with `DuplicateProduct` if the ID is already taken.
    async fn insert_product(&self, product: &Product) -> Result<()>;

    /// Reads a product without locking it.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Reads a reservation, whether or not it is still active.
    async fn get_reservation(&self, reservation_id: ReservationId)
    -> Result<Option<StockReservation>>;

    /// Deletes every reservation whose expiry is strictly before `cutoff`.
    ///
    /// Returns the number of rows removed.
    async fn delete_expired_reservations(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Lists reservations on a product that are active at `now`, oldest first.
    async fn active_reservations_for_product(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockReservation>>;

    /// Lists reservations held by an actor that are active at `now`, oldest first.
    async fn active_reservations_for_actor(
        &self,
        actor_id: &ActorId,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockReservation>>;

    /// Sum and count of the reservations on a product active at `now`.
    async fn reservation_totals(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<ReservationTotals>;

    /// Retrieves movements matching a query.
    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<StockMovement>>;

    /// Streams every movement of a product in insertion order.
    async fn stream_movements(&self, product_id: ProductId) -> Result<MovementStream>;
}

/// Extension trait providing convenience methods for stock stores.
#[async_trait]
pub trait StockStoreExt: StockStore {
    /// Reads a product, failing with `ProductNotFound` if it is missing.
    async fn require_product(&self, product_id: ProductId) -> Result<Product> {
        self.get_product(product_id)
            .await?
            .ok_or(StoreError::ProductNotFound(product_id))
    }

    /// Counts the movements recorded for a product.
    async fn movement_count(&self, product_id: ProductId) -> Result<usize> {
        Ok(self
            .query_movements(MovementQuery::for_product(product_id))
            .await?
            .len())
    }
}

// Blanket implementation for all StockStore implementations
impl<T: StockStore + ?Sized> StockStoreExt for T {}

/// Checks a movement against the ledger invariants before it is written.
pub fn validate_movement(movement: &StockMovement) -> Result<()> {
    let invalid = |message: String| Err(StoreError::InvalidMovement(message));

    if movement.quantity <= 0 {
        return invalid(format!(
            "quantity must be positive, got {}",
            movement.quantity
        ));
    }
    if movement.before_qty < 0 {
        return invalid(format!(
            "before quantity cannot be negative, got {}",
            movement.before_qty
        ));
    }
    if movement.after_qty < 0 {
        return invalid(format!(
            "after quantity cannot be negative, got {}",
            movement.after_qty
        ));
    }

    let delta = movement.after_qty - movement.before_qty;
    let consistent = match movement.movement_type {
        MovementType::Adjustment => delta.abs() == movement.quantity,
        other => delta == other.signed(movement.quantity),
    };
    if !consistent {
        return invalid(format!(
            "{} of {} cannot move stock from {} to {}",
            movement.movement_type, movement.quantity, movement.before_qty, movement.after_qty
        ));
    }

    Ok(())
}

/// Checks a reservation against the ledger invariants before it is written.
pub fn validate_reservation(reservation: &StockReservation) -> Result<()> {
    if reservation.quantity <= 0 {
        return Err(StoreError::InvalidReservation(format!(
            "quantity must be positive, got {}",
            reservation.quantity
        )));
    }
    if reservation.expires_at <= reservation.created_at {
        return Err(StoreError::InvalidReservation(
            "expiry must be after creation".to_string(),
        ));
    }
    Ok(())
}
