//! Movement recorder: ordinary stock-affecting operations.

use std::time::Instant;

use common::{ActorId, ProductId};
use stock_store::{MovementType, Product, StockMovement, StockStore, StockTransaction};

use crate::error::{LedgerError, Result};
use crate::events::{EventPublisher, MovementEvent, StockEvent};

/// Command to record a non-adjustment movement.
#[derive(Debug, Clone)]
pub struct RecordMovement {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    /// Unsigned magnitude; the direction comes from `movement_type`.
    pub quantity: i64,
    pub reason: String,
    /// Generated as `<TYPE>-<millis>` when absent.
    pub reference: Option<String>,
    pub actor_id: ActorId,
}

impl RecordMovement {
    pub fn new(
        product_id: ProductId,
        movement_type: MovementType,
        quantity: i64,
        actor_id: ActorId,
    ) -> Self {
        Self {
            product_id,
            movement_type,
            quantity,
            reason: String::new(),
            reference: None,
            actor_id,
        }
    }

    /// Builds a command from a textual movement type.
    ///
    /// Unknown types are rejected with `UnsupportedOperation`.
    pub fn parse(
        product_id: ProductId,
        movement_type: &str,
        quantity: i64,
        actor_id: ActorId,
    ) -> Result<Self> {
        Ok(Self::new(product_id, movement_type.parse()?, quantity, actor_id))
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Records purchases, sales, returns, losses and transfers.
///
/// Each call is one transaction: the product row is locked, the new
/// quantity is checked against the zero floor, and the quantity update and
/// movement row are committed together.
#[derive(Debug, Clone)]
pub struct MovementRecorder<S> {
    store: S,
    events: EventPublisher,
}

impl<S: StockStore> MovementRecorder<S> {
    pub fn new(store: S, events: EventPublisher) -> Self {
        Self { store, events }
    }

    #[tracing::instrument(
        skip(self, cmd),
        fields(
            product_id = %cmd.product_id,
            movement_type = %cmd.movement_type,
            quantity = cmd.quantity,
        )
    )]
    pub async fn record(&self, cmd: RecordMovement) -> Result<StockMovement> {
        let started = Instant::now();

        if cmd.movement_type == MovementType::Adjustment {
            return Err(LedgerError::UnsupportedOperation(
                "ADJUSTMENT movements must go through update_stock so the reason and approval rules apply"
                    .to_string(),
            ));
        }
        if cmd.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(cmd.quantity));
        }

        let mut tx = self.store.begin().await?;
        let product = lock_product(tx.as_mut(), cmd.product_id).await?;

        let delta = cmd.movement_type.signed(cmd.quantity);
        let after = product
            .quantity
            .checked_add(delta)
            .ok_or(LedgerError::QuantityOutOfRange {
                current: product.quantity,
                change: delta,
            })?;
        if after < 0 {
            return Err(LedgerError::insufficient_on_hand(
                product.quantity,
                cmd.quantity,
            ));
        }

        let mut builder = StockMovement::builder()
            .product_id(product.id)
            .movement_type(cmd.movement_type)
            .delta(delta)
            .before_qty(product.quantity)
            .reason(cmd.reason)
            .actor_id(cmd.actor_id);
        if let Some(reference) = cmd.reference {
            builder = builder.reference(reference);
        }
        let movement = builder.build()?;

        stage_movement(tx.as_mut(), &movement).await?;
        tx.commit().await?;

        tracing::info!(
            movement_id = %movement.id,
            before = movement.before_qty,
            after = movement.after_qty,
            "movement recorded"
        );
        publish_movement(&self.events, &movement, &product.name);
        metrics::histogram!("stock_operation_duration_seconds", "operation" => "record_movement")
            .record(started.elapsed().as_secs_f64());

        Ok(movement)
    }
}

/// Locks a product inside a transaction, failing with NotFound if it is missing.
pub(crate) async fn lock_product(
    tx: &mut dyn StockTransaction,
    product_id: ProductId,
) -> Result<Product> {
    tx.lock_product(product_id)
        .await?
        .ok_or(LedgerError::ProductNotFound(product_id))
}

/// Writes a movement and the quantity it leaves behind in one transaction.
pub(crate) async fn stage_movement(
    tx: &mut dyn StockTransaction,
    movement: &StockMovement,
) -> Result<()> {
    tx.set_quantity(movement.product_id, movement.after_qty)
        .await?;
    tx.insert_movement(movement).await?;
    Ok(())
}

/// Counts a committed movement and hands it to subscribers.
pub(crate) fn publish_movement(events: &EventPublisher, movement: &StockMovement, name: &str) {
    metrics::counter!("stock_movements_total", "type" => movement.movement_type.as_str())
        .increment(1);
    events.publish(StockEvent::MovementRecorded(MovementEvent::from_movement(
        movement, name,
    )));
}
