//! Best-effort reactions to committed ledger events.
//!
//! The ledger publishes [`StockEvent`]s and returns; this module consumes
//! them on a separate task. Nothing here can fail a ledger operation:
//! errors are logged and the next event is processed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};
use stock_store::StockStore;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

use crate::error::LedgerError;
use crate::events::{MovementEvent, StockEvent};

/// Failure of a side effect. Logged, never surfaced to ledger callers.
#[derive(Debug, Error)]
pub enum SideEffectError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Decides whether a product's stock level warrants an alert.
#[async_trait]
pub trait AlertChecker: Send + Sync {
    async fn check(&self, product_id: ProductId) -> Result<(), SideEffectError>;
}

/// Pushes movement events to real-time consumers.
#[async_trait]
pub trait MovementBroadcaster: Send + Sync {
    async fn broadcast(&self, event: &MovementEvent) -> Result<(), SideEffectError>;
}

/// Spawns the task that feeds events to the alert checker and broadcaster.
///
/// The task ends when every publisher has been dropped.
pub fn spawn_side_effects(
    mut events: broadcast::Receiver<StockEvent>,
    alerts: Arc<dyn AlertChecker>,
    broadcaster: Arc<dyn MovementBroadcaster>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => handle_event(&event, alerts.as_ref(), broadcaster.as_ref()).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "side-effect subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("side-effect subscriber stopped");
    })
}

async fn handle_event(
    event: &StockEvent,
    alerts: &dyn AlertChecker,
    broadcaster: &dyn MovementBroadcaster,
) {
    if let StockEvent::MovementRecorded(movement) = event
        && let Err(err) = broadcaster.broadcast(movement).await
    {
        tracing::warn!(error = %err, movement_id = %movement.id, "movement broadcast failed");
    }

    if let Some(product_id) = event.product_id()
        && let Err(err) = alerts.check(product_id).await
    {
        tracing::warn!(error = %err, %product_id, "stock alert check failed");
    }
}

/// Severity of a stock level alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertLevel {
    Low,
    Critical,
    OutOfStock,
}

impl AlertLevel {
    /// Classifies a quantity against a reorder level.
    ///
    /// `OutOfStock` at zero, `Critical` at or below half the reorder level,
    /// `Low` at or below it, otherwise no alert.
    pub fn classify(quantity: i64, min_stock: i64) -> Option<Self> {
        if quantity <= 0 {
            Some(AlertLevel::OutOfStock)
        } else if quantity <= min_stock / 2 {
            Some(AlertLevel::Critical)
        } else if quantity <= min_stock {
            Some(AlertLevel::Low)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Low => "LOW",
            AlertLevel::Critical => "CRITICAL",
            AlertLevel::OutOfStock => "OUT_OF_STOCK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub product_id: ProductId,
    pub product_name: String,
    pub level: AlertLevel,
    pub quantity: i64,
    pub min_stock: i64,
    pub raised_at: DateTime<Utc>,
}

/// Recent alerts kept by [`StockLevelAlerts::new`].
pub const DEFAULT_ALERT_HISTORY: usize = 256;

#[derive(Debug)]
struct AlertState {
    current: HashMap<ProductId, AlertLevel>,
    recent: VecDeque<StockAlert>,
    history: usize,
}

impl AlertState {
    fn record(&mut self, alert: StockAlert) {
        if self.history == 0 {
            return;
        }
        if self.recent.len() == self.history {
            self.recent.pop_front();
        }
        self.recent.push_back(alert);
    }
}

/// Alert checker comparing a product's quantity with its `min_stock`.
///
/// An alert is raised when a product enters a level or moves to a
/// different one; repeated checks at the same level stay quiet. Only the
/// most recent alerts are retained.
#[derive(Clone)]
pub struct StockLevelAlerts<S> {
    store: S,
    state: Arc<Mutex<AlertState>>,
}

impl<S: StockStore> StockLevelAlerts<S> {
    pub fn new(store: S) -> Self {
        Self::with_history(store, DEFAULT_ALERT_HISTORY)
    }

    /// Keeps at most `history` recent alerts.
    pub fn with_history(store: S, history: usize) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(AlertState {
                current: HashMap::new(),
                recent: VecDeque::with_capacity(history.min(DEFAULT_ALERT_HISTORY)),
                history,
            })),
        }
    }

    /// The retained alerts, oldest first.
    pub async fn alerts(&self) -> Vec<StockAlert> {
        self.state.lock().await.recent.iter().cloned().collect()
    }

    /// The product's current alert level, if any.
    pub async fn level(&self, product_id: ProductId) -> Option<AlertLevel> {
        self.state.lock().await.current.get(&product_id).copied()
    }
}

#[async_trait]
impl<S: StockStore> AlertChecker for StockLevelAlerts<S> {
    async fn check(&self, product_id: ProductId) -> Result<(), SideEffectError> {
        let Some(product) = self
            .store
            .get_product(product_id)
            .await
            .map_err(LedgerError::from)?
        else {
            return Ok(());
        };

        let level = AlertLevel::classify(product.quantity, product.min_stock);
        let mut state = self.state.lock().await;

        let Some(level) = level else {
            state.current.remove(&product_id);
            return Ok(());
        };
        if state.current.insert(product_id, level) == Some(level) {
            return Ok(());
        }

        tracing::warn!(
            %product_id,
            product = %product.name,
            level = level.as_str(),
            quantity = product.quantity,
            min_stock = product.min_stock,
            "stock alert raised"
        );
        metrics::counter!("stock_alerts_total", "level" => level.as_str()).increment(1);
        state.record(StockAlert {
            product_id,
            product_name: product.name,
            level,
            quantity: product.quantity,
            min_stock: product.min_stock,
            raised_at: Utc::now(),
        });
        Ok(())
    }
}

/// Broadcaster that writes movement events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBroadcaster;

#[async_trait]
impl MovementBroadcaster for LoggingBroadcaster {
    async fn broadcast(&self, event: &MovementEvent) -> Result<(), SideEffectError> {
        tracing::info!(
            movement_id = %event.id,
            product_id = %event.product_id,
            product = %event.product_name,
            movement_type = %event.movement_type,
            quantity = event.quantity,
            before = event.before_qty,
            after = event.after_qty,
            actor_id = %event.actor_id,
            "stock movement"
        );
        Ok(())
    }
}
