use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    ActorId, MovementQuery, Product, ProductId, ReservationId, ReservationTotals, Result,
    SortOrder, StockMovement, StockReservation, StoreError,
    store::{MovementStream, StockStore, StockTransaction, validate_movement, validate_reservation},
};

#[derive(Debug, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    movements: Vec<StockMovement>,
    reservations: Vec<StockReservation>,
}

/// In-memory stock store implementation for testing.
///
/// Provides the same interface as the PostgreSQL implementation. A
/// transaction holds the only lock on the whole state until it commits or
/// is dropped, which serializes all writers (not just writers of the same
/// product).
#[derive(Clone, Default)]
pub struct InMemoryStockStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStockStore {
    /// Creates a new empty in-memory stock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of movements stored.
    pub async fn movement_total(&self) -> usize {
        self.state.lock().await.movements.len()
    }

    /// Returns the total number of reservations stored, expired ones included.
    pub async fn reservation_total(&self) -> usize {
        self.state.lock().await.reservations.len()
    }

    /// Inserts a reservation as-is, bypassing the availability check.
    ///
    /// Lets tests plant reservations that have already expired.
    pub async fn seed_reservation(&self, reservation: StockReservation) -> Result<()> {
        validate_reservation(&reservation)?;
        self.state.lock().await.reservations.push(reservation);
        Ok(())
    }
}

/// Undo record for one applied write.
enum Undo {
    Quantity {
        product_id: ProductId,
        quantity: i64,
        updated_at: DateTime<Utc>,
    },
    Movement,
    ReservationInserted(ReservationId),
    ReservationTaken(usize, StockReservation),
}

/// Transaction over the in-memory state.
///
/// Writes are applied in place while the lock is held and undone on drop
/// unless the transaction committed. Nobody else can observe the state in
/// between because the guard is exclusive.
pub struct InMemoryTransaction {
    state: OwnedMutexGuard<MemoryState>,
    undo: Vec<Undo>,
    committed: bool,
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Quantity {
                    product_id,
                    quantity,
                    updated_at,
                } => {
                    if let Some(product) = self.state.products.get_mut(&product_id) {
                        product.quantity = quantity;
                        product.updated_at = updated_at;
                    }
                }
                Undo::Movement => {
                    self.state.movements.pop();
                }
                Undo::ReservationInserted(id) => {
                    self.state.reservations.retain(|r| r.id != id);
                }
                Undo::ReservationTaken(index, reservation) => {
                    let index = index.min(self.state.reservations.len());
                    self.state.reservations.insert(index, reservation);
                }
            }
        }
    }
}

#[async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn lock_product(&mut self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.products.get(&product_id).cloned())
    }

    async fn reserved_quantity(
        &mut self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        Ok(ReservationTotals::from_active(
            self.state
                .reservations
                .iter()
                .filter(|r| r.product_id == product_id),
            now,
        )
        .quantity)
    }

    async fn set_quantity(&mut self, product_id: ProductId, quantity: i64) -> Result<()> {
        let product = self
            .state
            .products
            .get_mut(&product_id)
            .ok_or(StoreError::ProductNotFound(product_id))?;

        self.undo.push(Undo::Quantity {
            product_id,
            quantity: product.quantity,
            updated_at: product.updated_at,
        });
        product.quantity = quantity;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &StockMovement) -> Result<()> {
        validate_movement(movement)?;
        if !self.state.products.contains_key(&movement.product_id) {
            return Err(StoreError::ProductNotFound(movement.product_id));
        }
        self.state.movements.push(movement.clone());
        self.undo.push(Undo::Movement);
        Ok(())
    }

    async fn insert_reservation(&mut self, reservation: &StockReservation) -> Result<()> {
        validate_reservation(reservation)?;
        if !self.state.products.contains_key(&reservation.product_id) {
            return Err(StoreError::ProductNotFound(reservation.product_id));
        }
        self.state.reservations.push(reservation.clone());
        self.undo.push(Undo::ReservationInserted(reservation.id));
        Ok(())
    }

    async fn take_reservation(
        &mut self,
        reservation_id: ReservationId,
    ) -> Result<Option<StockReservation>> {
        let Some(index) = self
            .state
            .reservations
            .iter()
            .position(|r| r.id == reservation_id)
        else {
            return Ok(None);
        };

        let reservation = self.state.reservations.remove(index);
        self.undo
            .push(Undo::ReservationTaken(index, reservation.clone()));
        Ok(Some(reservation))
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.committed = true;
        self.undo.clear();
        Ok(())
    }
}

#[async_trait]
impl StockStore for InMemoryStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>> {
        let state = self.state.clone().lock_owned().await;
        Ok(Box::new(InMemoryTransaction {
            state,
            undo: Vec::new(),
            committed: false,
        }))
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.products.contains_key(&product.id) {
            return Err(StoreError::DuplicateProduct(product.id));
        }
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&product_id).cloned())
    }

    async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<StockReservation>> {
        let state = self.state.lock().await;
        Ok(state
            .reservations
            .iter()
            .find(|r| r.id == reservation_id)
            .cloned())
    }

    async fn delete_expired_reservations(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.reservations.len();
        state.reservations.retain(|r| !r.is_expired_at(cutoff));
        Ok((before - state.reservations.len()) as u64)
    }

    async fn active_reservations_for_product(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockReservation>> {
        let state = self.state.lock().await;
        let mut reservations: Vec<_> = state
            .reservations
            .iter()
            .filter(|r| r.product_id == product_id && r.is_active_at(now))
            .cloned()
            .collect();
        reservations.sort_by_key(|r| r.created_at);
        Ok(reservations)
    }

    async fn active_reservations_for_actor(
        &self,
        actor_id: &ActorId,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockReservation>> {
        let state = self.state.lock().await;
        let mut reservations: Vec<_> = state
            .reservations
            .iter()
            .filter(|r| &r.actor_id == actor_id && r.is_active_at(now))
            .cloned()
            .collect();
        reservations.sort_by_key(|r| r.created_at);
        Ok(reservations)
    }

    async fn reservation_totals(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<ReservationTotals> {
        let state = self.state.lock().await;
        Ok(ReservationTotals::from_active(
            state
                .reservations
                .iter()
                .filter(|r| r.product_id == product_id),
            now,
        ))
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<StockMovement>> {
        let state = self.state.lock().await;
        let matching = state.movements.iter().filter(|m| query.matches(m));

        // Movements are kept in insertion order.
        let ordered: Vec<_> = match query.order {
            SortOrder::OldestFirst => matching.cloned().collect(),
            SortOrder::NewestFirst => matching.rev().cloned().collect(),
        };

        let offset = query.offset.unwrap_or(0);
        let movements = ordered
            .into_iter()
            .skip(offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(movements)
    }

    async fn stream_movements(&self, product_id: ProductId) -> Result<MovementStream> {
        use futures_util::stream;

        let state = self.state.lock().await;
        let movements: Vec<_> = state
            .movements
            .iter()
            .filter(|m| m.product_id == product_id)
            .cloned()
            .collect();

        let stream = stream::iter(movements.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::{MovementType, StockStoreExt};

    fn sale(product: &Product, quantity: i64) -> StockMovement {
        StockMovement::builder()
            .product_id(product.id)
            .movement_type(MovementType::Sale)
            .delta(-quantity)
            .before_qty(product.quantity)
            .actor_id(ActorId::new("clerk"))
            .build()
            .unwrap()
    }

    fn hold(product_id: ProductId, quantity: i64, minutes: i64) -> StockReservation {
        StockReservation::new(
            product_id,
            quantity,
            "quote",
            ActorId::new("sales"),
            Utc::now(),
            Duration::minutes(minutes),
        )
    }

    async fn store_with_product(quantity: i64) -> (InMemoryStockStore, Product) {
        let store = InMemoryStockStore::new();
        let product = Product::new("Widget", quantity, 10);
        store.insert_product(&product).await.unwrap();
        (store, product)
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let (store, product) = store_with_product(100).await;

        let mut tx = store.begin().await.unwrap();
        let locked = tx.lock_product(product.id).await.unwrap().unwrap();
        let movement = sale(&locked, 30);
        tx.set_quantity(product.id, movement.after_qty).await.unwrap();
        tx.insert_movement(&movement).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.require_product(product.id).await.unwrap();
        assert_eq!(stored.quantity, 70);
        assert_eq!(store.movement_total().await, 1);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back_every_write() {
        let (store, product) = store_with_product(100).await;
        let existing = hold(product.id, 5, 30);
        store.seed_reservation(existing.clone()).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            let movement = sale(&product, 30);
            tx.set_quantity(product.id, 70).await.unwrap();
            tx.insert_movement(&movement).await.unwrap();
            tx.insert_reservation(&hold(product.id, 10, 30)).await.unwrap();
            tx.take_reservation(existing.id).await.unwrap();
        }

        let stored = store.require_product(product.id).await.unwrap();
        assert_eq!(stored.quantity, 100);
        assert_eq!(store.movement_total().await, 0);
        assert_eq!(store.reservation_total().await, 1);
        assert!(store.get_reservation(existing.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reserved_quantity_counts_only_active_holds() {
        let (store, product) = store_with_product(100).await;
        store.seed_reservation(hold(product.id, 20, 30)).await.unwrap();
        let mut expired = hold(product.id, 15, 30);
        expired.created_at = Utc::now() - Duration::hours(2);
        expired.expires_at = Utc::now() - Duration::hours(1);
        store.seed_reservation(expired).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let reserved = tx.reserved_quantity(product.id, Utc::now()).await.unwrap();
        assert_eq!(reserved, 20);
    }

    #[tokio::test]
    async fn insert_product_rejects_duplicates() {
        let (store, product) = store_with_product(1).await;
        let result = store.insert_product(&product).await;
        assert!(matches!(result, Err(StoreError::DuplicateProduct(_))));
    }

    #[tokio::test]
    async fn set_quantity_on_missing_product_fails() {
        let store = InMemoryStockStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = tx.set_quantity(ProductId::new(), 5).await;
        assert!(matches!(result, Err(StoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn delete_expired_uses_strict_cutoff() {
        let (store, product) = store_with_product(100).await;
        let now = Utc::now();
        let mut boundary = hold(product.id, 1, 30);
        boundary.created_at = now - Duration::minutes(30);
        boundary.expires_at = now;
        let mut old = hold(product.id, 1, 30);
        old.created_at = now - Duration::hours(2);
        old.expires_at = now - Duration::hours(1);
        store.seed_reservation(boundary.clone()).await.unwrap();
        store.seed_reservation(old).await.unwrap();

        assert_eq!(store.delete_expired_reservations(now).await.unwrap(), 1);
        assert!(store.get_reservation(boundary.id).await.unwrap().is_some());
        assert_eq!(store.delete_expired_reservations(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn query_movements_newest_first_with_limit() {
        let (store, product) = store_with_product(100).await;
        let mut current = product.clone();
        for quantity in [1, 2, 3] {
            let mut tx = store.begin().await.unwrap();
            let movement = sale(&current, quantity);
            tx.set_quantity(product.id, movement.after_qty).await.unwrap();
            tx.insert_movement(&movement).await.unwrap();
            tx.commit().await.unwrap();
            current.quantity = movement.after_qty;
        }

        let recent = store
            .query_movements(MovementQuery::for_product(product.id).newest_first().limit(2))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].quantity, 3);
        assert_eq!(recent[1].quantity, 2);

        let skipped = store
            .query_movements(MovementQuery::for_product(product.id).offset(2))
            .await
            .unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].quantity, 3);
    }

    #[tokio::test]
    async fn stream_movements_filters_by_product() {
        use futures_util::StreamExt;

        let (store, product) = store_with_product(10).await;
        let other = Product::new("Gadget", 10, 1);
        store.insert_product(&other).await.unwrap();

        for p in [&product, &other] {
            let mut tx = store.begin().await.unwrap();
            let movement = sale(p, 1);
            tx.set_quantity(p.id, movement.after_qty).await.unwrap();
            tx.insert_movement(&movement).await.unwrap();
            tx.commit().await.unwrap();
        }

        let stream = store.stream_movements(product.id).await.unwrap();
        let movements: Vec<_> = stream.collect().await;
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].as_ref().unwrap().product_id, product.id);
    }
}
