//! The pool facade: the single entry point the rest of the application uses.

use common::{ActorId, ProductId, ReservationId};
use stock_store::{MovementQuery, Product, StockMovement, StockReservation, StockStore};
use tokio::sync::broadcast;

use crate::adjustment::{AdjustmentValidator, UpdateStock};
use crate::audit::{AuditReport, audit_product};
use crate::availability::{AvailabilityCalculator, StockOperation, StockSummary, StockValidation};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::events::{EventPublisher, StockEvent};
use crate::movement::{MovementRecorder, RecordMovement};
use crate::reservation::{ReservationManager, ReserveStock};
use crate::sweeper::ExpirySweeper;

/// Stock ledger service over a transactional store.
///
/// Composes the movement recorder, reservation manager, adjustment
/// validator and availability calculator. All of them share the same store
/// handle and event publisher. The facade adds no policy of its own.
#[derive(Debug, Clone)]
pub struct StockPool<S> {
    store: S,
    config: LedgerConfig,
    events: EventPublisher,
    movements: MovementRecorder<S>,
    reservations: ReservationManager<S>,
    adjustments: AdjustmentValidator<S>,
    availability: AvailabilityCalculator<S>,
}

impl<S: StockStore + Clone> StockPool<S> {
    /// Creates a pool with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        let events = EventPublisher::new(config.event_capacity);
        Self {
            movements: MovementRecorder::new(store.clone(), events.clone()),
            reservations: ReservationManager::new(
                store.clone(),
                events.clone(),
                config.default_reservation_minutes,
            )
            .with_max_minutes(config.max_reservation_minutes),
            adjustments: AdjustmentValidator::new(
                store.clone(),
                events.clone(),
                config.large_adjustment_threshold,
            ),
            availability: AvailabilityCalculator::new(
                store.clone(),
                config.recent_movement_limit,
                config.recent_movement_days,
            ),
            store,
            config,
            events,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Subscribes to events published after every committed change.
    pub fn subscribe(&self) -> broadcast::Receiver<StockEvent> {
        self.events.subscribe()
    }

    /// Builds a sweeper sharing this pool's store and events.
    pub fn sweeper(&self) -> ExpirySweeper<S>
    where
        S: 'static,
    {
        ExpirySweeper::new(self.reservations.clone(), self.config.sweep_interval)
    }

    /// Registers a product with its opening quantity.
    #[tracing::instrument(skip(self, name))]
    pub async fn register_product(
        &self,
        name: impl Into<String>,
        quantity: i64,
        min_stock: i64,
    ) -> Result<Product> {
        if quantity < 0 {
            return Err(LedgerError::InvalidQuantity(quantity));
        }
        if min_stock < 0 {
            return Err(LedgerError::InvalidQuantity(min_stock));
        }

        let product = Product::new(name, quantity, min_stock);
        self.store.insert_product(&product).await?;
        tracing::info!(product_id = %product.id, name = %product.name, "product registered");
        Ok(product)
    }

    pub async fn record_movement(&self, cmd: RecordMovement) -> Result<StockMovement> {
        self.movements.record(cmd).await
    }

    pub async fn update_stock(&self, cmd: UpdateStock) -> Result<StockMovement> {
        self.adjustments.apply(cmd).await
    }

    pub async fn reserve_stock(&self, cmd: ReserveStock) -> Result<StockReservation> {
        self.reservations.reserve(cmd).await
    }

    pub async fn release_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<StockReservation> {
        self.reservations.release(reservation_id).await
    }

    pub async fn fulfill_reservation(
        &self,
        reservation_id: ReservationId,
        actor_id: ActorId,
    ) -> Result<StockMovement> {
        self.reservations.fulfill(reservation_id, actor_id).await
    }

    pub async fn cleanup_expired_reservations(&self) -> Result<u64> {
        self.reservations.cleanup_expired().await
    }

    pub async fn reservation(&self, reservation_id: ReservationId) -> Result<StockReservation> {
        self.reservations.get(reservation_id).await
    }

    pub async fn active_reservations(&self, product_id: ProductId) -> Result<Vec<StockReservation>> {
        self.reservations.active_for_product(product_id).await
    }

    pub async fn actor_reservations(&self, actor_id: &ActorId) -> Result<Vec<StockReservation>> {
        self.reservations.active_for_actor(actor_id).await
    }

    pub async fn available_stock(&self, product_id: ProductId) -> Result<i64> {
        self.availability.available_stock(product_id).await
    }

    pub async fn stock_summary(&self, product_id: ProductId) -> Result<StockSummary> {
        self.availability.stock_summary(product_id).await
    }

    pub async fn validate_stock_operation(
        &self,
        product_id: ProductId,
        requested: i64,
        operation: StockOperation,
    ) -> Result<StockValidation> {
        self.availability
            .validate_stock_operation(product_id, requested, operation)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn movement_history(&self, query: MovementQuery) -> Result<Vec<StockMovement>> {
        Ok(self.store.query_movements(query).await?)
    }

    pub async fn verify_ledger(&self, product_id: ProductId) -> Result<AuditReport> {
        audit_product(&self.store, product_id).await
    }
}

#[cfg(test)]
mod tests {
    use stock_store::{InMemoryStockStore, MovementType};

    use super::*;
    use crate::reason::AdjustmentReason;

    fn pool() -> StockPool<InMemoryStockStore> {
        StockPool::new(InMemoryStockStore::new())
    }

    #[tokio::test]
    async fn register_rejects_negative_figures() {
        let pool = pool();
        assert!(matches!(
            pool.register_product("Widget", -1, 0).await,
            Err(LedgerError::InvalidQuantity(-1))
        ));
        assert!(matches!(
            pool.register_product("Widget", 0, -5).await,
            Err(LedgerError::InvalidQuantity(-5))
        ));

        let product = pool.register_product("Widget", 0, 5).await.unwrap();
        assert_eq!(pool.available_stock(product.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn summary_lists_recent_movements_newest_first() {
        let pool = pool();
        let product = pool.register_product("Widget", 100, 10).await.unwrap();
        let clerk = ActorId::new("clerk");

        pool.record_movement(RecordMovement::new(product.id, MovementType::Purchase, 20, clerk.clone()))
            .await
            .unwrap();
        pool.update_stock(UpdateStock::new(product.id, -3, AdjustmentReason::Lost, clerk.clone()))
            .await
            .unwrap();
        pool.reserve_stock(ReserveStock::new(product.id, 17, clerk))
            .await
            .unwrap();

        let summary = pool.stock_summary(product.id).await.unwrap();
        assert_eq!(summary.total_stock, 117);
        assert_eq!(summary.reserved_stock, 17);
        assert_eq!(summary.available_stock, 100);
        assert_eq!(summary.active_reservations, 1);
        let types: Vec<_> = summary
            .recent_movements
            .iter()
            .map(|m| m.movement_type)
            .collect();
        assert_eq!(types, vec![MovementType::Adjustment, MovementType::Purchase]);
    }

    #[tokio::test]
    async fn configured_reservation_cap_is_enforced() {
        let config = LedgerConfig {
            max_reservation_minutes: 60,
            ..LedgerConfig::default()
        };
        let pool = StockPool::with_config(InMemoryStockStore::new(), config);
        let product = pool.register_product("Widget", 10, 0).await.unwrap();
        let hold = |minutes| {
            ReserveStock::new(product.id, 1, ActorId::new("sales")).expires_in_minutes(minutes)
        };

        assert!(pool.reserve_stock(hold(60)).await.is_ok());
        let err = pool.reserve_stock(hold(61)).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn recent_movements_are_capped() {
        let config = LedgerConfig {
            recent_movement_limit: 3,
            ..LedgerConfig::default()
        };
        let pool = StockPool::with_config(InMemoryStockStore::new(), config);
        let product = pool.register_product("Widget", 0, 0).await.unwrap();

        for _ in 0..5 {
            pool.record_movement(RecordMovement::new(
                product.id,
                MovementType::Purchase,
                1,
                ActorId::new("buyer"),
            ))
            .await
            .unwrap();
        }

        let summary = pool.stock_summary(product.id).await.unwrap();
        assert_eq!(summary.recent_movements.len(), 3);
        assert_eq!(summary.recent_movements[0].after_qty, 5);
    }

    #[tokio::test]
    async fn movement_history_filters_by_actor() {
        let pool = pool();
        let product = pool.register_product("Widget", 50, 0).await.unwrap();
        pool.record_movement(RecordMovement::new(product.id, MovementType::Sale, 1, ActorId::new("alice")))
            .await
            .unwrap();
        pool.record_movement(RecordMovement::new(product.id, MovementType::Sale, 2, ActorId::new("bob")))
            .await
            .unwrap();

        let bobs = pool
            .movement_history(MovementQuery::for_product(product.id).actor_id(ActorId::new("bob")))
            .await
            .unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].quantity, 2);
    }

    #[tokio::test]
    async fn ledger_stays_consistent_through_the_facade() {
        let pool = pool();
        let product = pool.register_product("Widget", 40, 5).await.unwrap();
        let clerk = ActorId::new("clerk");

        let reservation = pool
            .reserve_stock(ReserveStock::new(product.id, 15, clerk.clone()))
            .await
            .unwrap();
        pool.fulfill_reservation(reservation.id, clerk.clone())
            .await
            .unwrap();
        pool.update_stock(UpdateStock::new(product.id, 4, AdjustmentReason::Found, clerk))
            .await
            .unwrap();

        let report = pool.verify_ledger(product.id).await.unwrap();
        assert!(report.is_consistent(), "{:?}", report.discrepancies);
        assert_eq!(report.current_quantity, 29);
        assert_eq!(report.movements_checked, 2);
    }
}
