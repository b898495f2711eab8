//! Events published after ledger mutations commit.

use chrono::{DateTime, Utc};
use common::{ActorId, MovementId, ProductId, ReservationId};
use serde::{Deserialize, Serialize};
use stock_store::{MovementType, StockMovement, StockReservation};
use tokio::sync::broadcast;

/// Events emitted by the ledger once the corresponding write is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StockEvent {
    /// A movement changed a product's quantity.
    MovementRecorded(MovementEvent),

    /// A reservation was placed.
    ReservationCreated(StockReservation),

    /// A reservation was released by its holder.
    ReservationReleased {
        reservation_id: ReservationId,
        product_id: ProductId,
    },

    /// A reservation was converted into a sale.
    ReservationFulfilled {
        reservation_id: ReservationId,
        product_id: ProductId,
        movement_id: MovementId,
    },

    /// The sweep deleted expired reservations.
    ReservationsExpired { count: u64 },
}

impl StockEvent {
    /// Returns a stable name for the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            StockEvent::MovementRecorded(_) => "MovementRecorded",
            StockEvent::ReservationCreated(_) => "ReservationCreated",
            StockEvent::ReservationReleased { .. } => "ReservationReleased",
            StockEvent::ReservationFulfilled { .. } => "ReservationFulfilled",
            StockEvent::ReservationsExpired { .. } => "ReservationsExpired",
        }
    }

    /// The product the event concerns, if it concerns a single one.
    pub fn product_id(&self) -> Option<ProductId> {
        match self {
            StockEvent::MovementRecorded(e) => Some(e.product_id),
            StockEvent::ReservationCreated(r) => Some(r.product_id),
            StockEvent::ReservationReleased { product_id, .. }
            | StockEvent::ReservationFulfilled { product_id, .. } => Some(*product_id),
            StockEvent::ReservationsExpired { .. } => None,
        }
    }
}

/// Payload delivered to real-time consumers for every movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEvent {
    pub id: MovementId,
    pub product_id: ProductId,
    pub product_name: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub before_qty: i64,
    pub after_qty: i64,
    pub reason: String,
    pub actor_id: ActorId,
    pub timestamp: DateTime<Utc>,
}

impl MovementEvent {
    pub fn from_movement(movement: &StockMovement, product_name: impl Into<String>) -> Self {
        Self {
            id: movement.id,
            product_id: movement.product_id,
            product_name: product_name.into(),
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            before_qty: movement.before_qty,
            after_qty: movement.after_qty,
            reason: movement.reason.clone(),
            actor_id: movement.actor_id.clone(),
            timestamp: movement.created_at,
        }
    }
}

/// In-process fan-out of [`StockEvent`]s.
///
/// Publishing is synchronous and never fails the caller: with no
/// subscribers the event is dropped. Slow subscribers lag and lose the
/// oldest events rather than blocking the ledger.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<StockEvent>,
}

impl EventPublisher {
    /// Creates a publisher buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StockEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, event: StockEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(receivers) => tracing::trace!(event_type, receivers, "stock event published"),
            Err(_) => tracing::debug!(event_type, "no subscribers for stock event"),
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}
