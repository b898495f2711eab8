//! Replays a product's movement history and checks it against its quantity.

use common::{MovementId, ProductId};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use stock_store::{StockStore, StockStoreExt, validate_movement};

use crate::error::Result;

/// A single inconsistency found while replaying the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// The movement's own arithmetic does not hold.
    InvalidMovement {
        movement_id: MovementId,
        detail: String,
    },
    /// The movement did not start where the previous one ended.
    BrokenChain {
        movement_id: MovementId,
        expected_before: i64,
        actual_before: i64,
    },
    /// The last movement disagrees with the product's quantity.
    QuantityMismatch { ledger: i64, product: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub product_id: ProductId,
    pub current_quantity: i64,
    pub movements_checked: usize,
    /// Quantity left by the last movement, if there is one.
    pub ledger_quantity: Option<i64>,
    pub discrepancies: Vec<Discrepancy>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Streams every movement of the product in insertion order and checks
/// each one, the chain between them, and the closing balance.
///
/// The opening balance (stock present at registration) is taken from the
/// first movement's before-quantity.
#[tracing::instrument(skip(store))]
pub async fn audit_product<S>(store: &S, product_id: ProductId) -> Result<AuditReport>
where
    S: StockStore + ?Sized,
{
    let product = store.require_product(product_id).await?;
    let mut movements = store.stream_movements(product_id).await?;

    let mut discrepancies = Vec::new();
    let mut checked = 0;
    let mut last_after: Option<i64> = None;

    while let Some(movement) = movements.try_next().await? {
        checked += 1;

        if let Err(err) = validate_movement(&movement) {
            discrepancies.push(Discrepancy::InvalidMovement {
                movement_id: movement.id,
                detail: err.to_string(),
            });
        }
        if let Some(expected) = last_after
            && expected != movement.before_qty
        {
            discrepancies.push(Discrepancy::BrokenChain {
                movement_id: movement.id,
                expected_before: expected,
                actual_before: movement.before_qty,
            });
        }
        last_after = Some(movement.after_qty);
    }

    if let Some(ledger) = last_after
        && ledger != product.quantity
    {
        discrepancies.push(Discrepancy::QuantityMismatch {
            ledger,
            product: product.quantity,
        });
    }

    if discrepancies.is_empty() {
        tracing::debug!(checked, "ledger consistent");
    } else {
        tracing::warn!(checked, found = discrepancies.len(), "ledger discrepancies found");
    }

    Ok(AuditReport {
        product_id,
        current_quantity: product.quantity,
        movements_checked: checked,
        ledger_quantity: last_after,
        discrepancies,
    })
}

#[cfg(test)]
mod tests {
    use common::ActorId;
    use stock_store::{InMemoryStockStore, MovementType, Product, StockMovement};

    use super::*;

    async fn write(store: &InMemoryStockStore, movement: &StockMovement, quantity: i64) {
        let mut tx = store.begin().await.unwrap();
        tx.set_quantity(movement.product_id, quantity).await.unwrap();
        tx.insert_movement(movement).await.unwrap();
        tx.commit().await.unwrap();
    }

    fn movement(product: &Product, movement_type: MovementType, delta: i64, before: i64) -> StockMovement {
        StockMovement::builder()
            .product_id(product.id)
            .movement_type(movement_type)
            .delta(delta)
            .before_qty(before)
            .actor_id(ActorId::new("clerk"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn consistent_history_passes() {
        let store = InMemoryStockStore::new();
        let product = Product::new("Widget", 100, 10);
        store.insert_product(&product).await.unwrap();

        let first = movement(&product, MovementType::Purchase, 20, 100);
        write(&store, &first, 120).await;
        let second = movement(&product, MovementType::Sale, -30, 120);
        write(&store, &second, 90).await;

        let report = audit_product(&store, product.id).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.movements_checked, 2);
        assert_eq!(report.ledger_quantity, Some(90));
        assert_eq!(report.current_quantity, 90);
    }

    #[tokio::test]
    async fn product_without_movements_is_consistent() {
        let store = InMemoryStockStore::new();
        let product = Product::new("Widget", 7, 1);
        store.insert_product(&product).await.unwrap();

        let report = audit_product(&store, product.id).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.ledger_quantity, None);
    }

    #[tokio::test]
    async fn gaps_and_drift_are_reported() {
        let store = InMemoryStockStore::new();
        let product = Product::new("Widget", 100, 10);
        store.insert_product(&product).await.unwrap();

        write(&store, &movement(&product, MovementType::Sale, -10, 100), 90).await;
        // Starts from 95 instead of 90, and the quantity is then overwritten.
        let skewed = movement(&product, MovementType::Sale, -5, 95);
        write(&store, &skewed, 42).await;

        let report = audit_product(&store, product.id).await.unwrap();
        assert_eq!(
            report.discrepancies,
            vec![
                Discrepancy::BrokenChain {
                    movement_id: skewed.id,
                    expected_before: 90,
                    actual_before: 95,
                },
                Discrepancy::QuantityMismatch {
                    ledger: 90,
                    product: 42,
                },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let store = InMemoryStockStore::new();
        let err = audit_product(&store, ProductId::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
