//! Manual stock corrections.

use std::time::Instant;

use common::{ActorId, ProductId};
use stock_store::{MovementType, StockMovement, StockStore};

use crate::error::{LedgerError, Result};
use crate::events::EventPublisher;
use crate::movement::{lock_product, publish_movement, stage_movement};
use crate::reason::AdjustmentReason;

/// Command to correct a product's stock by a signed amount.
#[derive(Debug, Clone)]
pub struct UpdateStock {
    pub product_id: ProductId,
    /// Signed change; negative values remove stock.
    pub quantity: i64,
    pub reason: AdjustmentReason,
    pub actor_id: ActorId,
    /// Reject changes above the large-adjustment threshold.
    pub require_approval: bool,
}

impl UpdateStock {
    pub fn new(
        product_id: ProductId,
        quantity: i64,
        reason: AdjustmentReason,
        actor_id: ActorId,
    ) -> Self {
        Self {
            product_id,
            quantity,
            reason,
            actor_id,
            require_approval: false,
        }
    }

    /// Builds a command from a textual reason, failing with `InvalidReason`
    /// if it is not in the allowed vocabulary.
    pub fn parse(
        product_id: ProductId,
        quantity: i64,
        reason: &str,
        actor_id: ActorId,
    ) -> Result<Self> {
        Ok(Self::new(product_id, quantity, reason.parse()?, actor_id))
    }

    pub fn require_approval(mut self, require: bool) -> Self {
        self.require_approval = require;
        self
    }
}

/// Gate for manual corrections. Writes `ADJUSTMENT` movements.
#[derive(Debug, Clone)]
pub struct AdjustmentValidator<S> {
    store: S,
    events: EventPublisher,
    threshold: i64,
}

impl<S: StockStore> AdjustmentValidator<S> {
    pub fn new(store: S, events: EventPublisher, threshold: i64) -> Self {
        Self {
            store,
            events,
            threshold,
        }
    }

    /// Adjustments whose magnitude exceeds this need approval.
    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    #[tracing::instrument(
        skip(self, cmd),
        fields(product_id = %cmd.product_id, quantity = cmd.quantity, reason = %cmd.reason)
    )]
    pub async fn apply(&self, cmd: UpdateStock) -> Result<StockMovement> {
        let started = Instant::now();

        if cmd.quantity == 0 {
            return Err(LedgerError::InvalidQuantity(0));
        }
        let magnitude = cmd
            .quantity
            .checked_abs()
            .ok_or(LedgerError::InvalidQuantity(cmd.quantity))?;

        let mut tx = self.store.begin().await?;
        let product = lock_product(tx.as_mut(), cmd.product_id).await?;

        let after = product
            .quantity
            .checked_add(cmd.quantity)
            .ok_or(LedgerError::QuantityOutOfRange {
                current: product.quantity,
                change: cmd.quantity,
            })?;
        if after < 0 {
            return Err(LedgerError::below_zero(product.quantity, cmd.quantity));
        }
        if cmd.require_approval && magnitude > self.threshold {
            tracing::warn!(threshold = self.threshold, "adjustment needs approval");
            return Err(LedgerError::ApprovalRequired {
                quantity: magnitude,
                threshold: self.threshold,
            });
        }

        let movement = StockMovement::builder()
            .product_id(product.id)
            .movement_type(MovementType::Adjustment)
            .delta(cmd.quantity)
            .before_qty(product.quantity)
            .reason(cmd.reason.as_str())
            .actor_id(cmd.actor_id)
            .build()?;

        stage_movement(tx.as_mut(), &movement).await?;
        tx.commit().await?;

        tracing::info!(
            movement_id = %movement.id,
            before = movement.before_qty,
            after = movement.after_qty,
            "stock adjusted"
        );
        metrics::counter!("stock_adjustments_total").increment(1);
        metrics::histogram!("stock_operation_duration_seconds", "operation" => "adjust")
            .record(started.elapsed().as_secs_f64());
        publish_movement(&self.events, &movement, &product.name);

        Ok(movement)
    }
}
