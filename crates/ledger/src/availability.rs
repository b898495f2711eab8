//! Read-only stock figures derived from products and reservations.

use chrono::{Duration, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};
use stock_store::{MovementQuery, StockMovement, StockStore, StockStoreExt};

use crate::error::Result;

/// Kind of operation a caller intends to attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockOperation {
    /// Place a reservation: checked against available stock.
    Reserve,
    /// Record a reducing movement: checked against total stock.
    Reduce,
}

/// Outcome of a stock precheck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockValidation {
    pub valid: bool,
    pub available_stock: i64,
    pub message: String,
}

/// Snapshot of a product's stock position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    pub product_id: ProductId,
    pub product_name: String,
    pub total_stock: i64,
    pub available_stock: i64,
    pub reserved_stock: i64,
    pub active_reservations: usize,
    /// Newest first.
    pub recent_movements: Vec<StockMovement>,
}

#[derive(Debug, Clone)]
pub struct AvailabilityCalculator<S> {
    store: S,
    recent_limit: usize,
    recent_days: i64,
}

impl<S: StockStore> AvailabilityCalculator<S> {
    pub fn new(store: S, recent_limit: usize, recent_days: i64) -> Self {
        Self {
            store,
            recent_limit,
            recent_days,
        }
    }

    /// Total quantity minus active reservations, never below zero.
    #[tracing::instrument(skip(self))]
    pub async fn available_stock(&self, product_id: ProductId) -> Result<i64> {
        let product = self.store.require_product(product_id).await?;
        let totals = self.store.reservation_totals(product_id, Utc::now()).await?;
        Ok((product.quantity - totals.quantity).max(0))
    }

    #[tracing::instrument(skip(self))]
    pub async fn stock_summary(&self, product_id: ProductId) -> Result<StockSummary> {
        let now = Utc::now();
        let product = self.store.require_product(product_id).await?;
        let totals = self.store.reservation_totals(product_id, now).await?;
        let recent_movements = self
            .store
            .query_movements(MovementQuery::recent(
                product_id,
                now - Duration::days(self.recent_days),
                self.recent_limit,
            ))
            .await?;

        Ok(StockSummary {
            product_id,
            product_name: product.name,
            total_stock: product.quantity,
            available_stock: (product.quantity - totals.quantity).max(0),
            reserved_stock: totals.quantity,
            active_reservations: totals.count,
            recent_movements,
        })
    }

    /// Checks whether an operation would currently succeed. Writes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn validate_stock_operation(
        &self,
        product_id: ProductId,
        requested: i64,
        operation: StockOperation,
    ) -> Result<StockValidation> {
        let available_stock = match operation {
            StockOperation::Reserve => self.available_stock(product_id).await?,
            StockOperation::Reduce => self.store.require_product(product_id).await?.quantity,
        };

        let (valid, message) = if requested <= 0 {
            (false, format!("Quantity must be positive, got {requested}"))
        } else if requested > available_stock {
            let message = match operation {
                StockOperation::Reserve => format!(
                    "Insufficient stock available. Available: {available_stock}, Requested: {requested}"
                ),
                StockOperation::Reduce => format!(
                    "Insufficient stock. Current: {available_stock}, Requested: {requested}"
                ),
            };
            (false, message)
        } else {
            (true, "Stock available".to_string())
        };

        Ok(StockValidation {
            valid,
            available_stock,
            message,
        })
    }
}
