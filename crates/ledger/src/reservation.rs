//! Reservation manager: time-bounded holds against available stock.

use std::time::Instant;

use chrono::{Duration, Utc};
use common::{ActorId, ProductId, ReservationId};
use stock_store::{MovementType, StockMovement, StockReservation, StockStore};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::events::{EventPublisher, StockEvent};
use crate::movement::{lock_product, publish_movement, stage_movement};

/// Command to place a reservation.
#[derive(Debug, Clone)]
pub struct ReserveStock {
    pub product_id: ProductId,
    pub quantity: i64,
    pub reason: String,
    pub actor_id: ActorId,
    /// Lifetime in minutes; the manager's default when absent.
    pub expiration_minutes: Option<i64>,
}

impl ReserveStock {
    pub fn new(product_id: ProductId, quantity: i64, actor_id: ActorId) -> Self {
        Self {
            product_id,
            quantity,
            reason: String::new(),
            actor_id,
            expiration_minutes: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn expires_in_minutes(mut self, minutes: i64) -> Self {
        self.expiration_minutes = Some(minutes);
        self
    }
}

/// Places, releases and sweeps reservations.
///
/// The availability check and the insert share one transaction with the
/// product row locked, so two concurrent reservations can never both pass
/// the check against the same stale total.
#[derive(Debug, Clone)]
pub struct ReservationManager<S> {
    store: S,
    events: EventPublisher,
    default_minutes: i64,
    max_minutes: i64,
}

impl<S: StockStore> ReservationManager<S> {
    pub fn new(store: S, events: EventPublisher, default_minutes: i64) -> Self {
        Self {
            store,
            events,
            default_minutes,
            max_minutes: LedgerConfig::default().max_reservation_minutes,
        }
    }

    /// Caps the lifetime a caller may ask for.
    pub fn with_max_minutes(mut self, max_minutes: i64) -> Self {
        self.max_minutes = max_minutes;
        self
    }

    #[tracing::instrument(
        skip(self, cmd),
        fields(product_id = %cmd.product_id, quantity = cmd.quantity, actor_id = %cmd.actor_id)
    )]
    pub async fn reserve(&self, cmd: ReserveStock) -> Result<StockReservation> {
        let started = Instant::now();

        if cmd.quantity <= 0 {
            return Err(LedgerError::InvalidQuantity(cmd.quantity));
        }
        let minutes = cmd.expiration_minutes.unwrap_or(self.default_minutes);
        if minutes <= 0 {
            return Err(LedgerError::UnsupportedOperation(format!(
                "Reservation lifetime must be positive, got {minutes} minutes"
            )));
        }
        if minutes > self.max_minutes {
            return Err(LedgerError::UnsupportedOperation(format!(
                "Reservation lifetime of {minutes} minutes exceeds the limit of {} minutes",
                self.max_minutes
            )));
        }
        let ttl = Duration::try_minutes(minutes).ok_or_else(|| {
            LedgerError::UnsupportedOperation(format!(
                "Reservation lifetime of {minutes} minutes is out of range"
            ))
        })?;

        let mut tx = self.store.begin().await?;
        let product = lock_product(tx.as_mut(), cmd.product_id).await?;

        let now = Utc::now();
        if now.checked_add_signed(ttl).is_none() {
            return Err(LedgerError::UnsupportedOperation(format!(
                "Reservation lifetime of {minutes} minutes is out of range"
            )));
        }
        let reserved = tx.reserved_quantity(product.id, now).await?;
        let available = (product.quantity - reserved).max(0);
        if available < cmd.quantity {
            metrics::counter!("stock_reservation_rejections_total").increment(1);
            tracing::debug!(available, reserved, "reservation rejected");
            return Err(LedgerError::insufficient_available(available, cmd.quantity));
        }

        let reservation = StockReservation::new(
            product.id,
            cmd.quantity,
            cmd.reason,
            cmd.actor_id,
            now,
            ttl,
        );
        tx.insert_reservation(&reservation).await?;
        tx.commit().await?;

        tracing::info!(
            reservation_id = %reservation.id,
            expires_at = %reservation.expires_at,
            "stock reserved"
        );
        metrics::counter!("stock_reservations_total").increment(1);
        metrics::histogram!("stock_operation_duration_seconds", "operation" => "reserve")
            .record(started.elapsed().as_secs_f64());
        self.events
            .publish(StockEvent::ReservationCreated(reservation.clone()));

        Ok(reservation)
    }

    /// Deletes a reservation. Stock quantity is unaffected.
    ///
    /// Fails with NotFound if the reservation was already released,
    /// fulfilled or swept.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, reservation_id: ReservationId) -> Result<StockReservation> {
        let mut tx = self.store.begin().await?;
        let reservation = tx
            .take_reservation(reservation_id)
            .await?
            .ok_or(LedgerError::ReservationNotFound(reservation_id))?;
        tx.commit().await?;

        tracing::info!(product_id = %reservation.product_id, "reservation released");
        self.events.publish(StockEvent::ReservationReleased {
            reservation_id,
            product_id: reservation.product_id,
        });
        Ok(reservation)
    }

    /// Converts a live reservation into a permanent `SALE`.
    ///
    /// The reservation delete, the quantity update and the movement row
    /// commit together. An expired reservation is treated as missing even
    /// if the sweep has not removed it yet.
    #[tracing::instrument(skip(self, actor_id), fields(actor_id = %actor_id))]
    pub async fn fulfill(
        &self,
        reservation_id: ReservationId,
        actor_id: ActorId,
    ) -> Result<StockMovement> {
        let mut tx = self.store.begin().await?;
        let reservation = tx
            .take_reservation(reservation_id)
            .await?
            .filter(|r| r.is_active_at(Utc::now()))
            .ok_or(LedgerError::ReservationNotFound(reservation_id))?;

        let product = lock_product(tx.as_mut(), reservation.product_id).await?;
        if product.quantity < reservation.quantity {
            return Err(LedgerError::insufficient_on_hand(
                product.quantity,
                reservation.quantity,
            ));
        }

        let reason = if reservation.reason.is_empty() {
            "Reservation fulfilled".to_string()
        } else {
            reservation.reason.clone()
        };
        let movement = StockMovement::builder()
            .product_id(product.id)
            .movement_type(MovementType::Sale)
            .delta(-reservation.quantity)
            .before_qty(product.quantity)
            .reason(reason)
            .reference(format!("RES-{reservation_id}"))
            .actor_id(actor_id)
            .build()?;

        stage_movement(tx.as_mut(), &movement).await?;
        tx.commit().await?;

        tracing::info!(
            product_id = %product.id,
            quantity = reservation.quantity,
            after = movement.after_qty,
            "reservation fulfilled"
        );
        publish_movement(&self.events, &movement, &product.name);
        self.events.publish(StockEvent::ReservationFulfilled {
            reservation_id,
            product_id: product.id,
            movement_id: movement.id,
        });
        Ok(movement)
    }

    /// Deletes every reservation whose expiry has passed, in one batch.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let removed = self.store.delete_expired_reservations(Utc::now()).await?;

        if removed > 0 {
            tracing::info!(removed, "expired reservations removed");
            metrics::counter!("stock_reservations_expired_total").increment(removed);
            self.events
                .publish(StockEvent::ReservationsExpired { count: removed });
        }
        Ok(removed)
    }

    /// Looks up a reservation that is still active.
    ///
    /// Expired holds awaiting the sweep are reported as NotFound, matching `fulfill`.
    pub async fn get(&self, reservation_id: ReservationId) -> Result<StockReservation> {
        self.store
            .get_reservation(reservation_id)
            .await?
            .filter(|r| r.is_active_at(Utc::now()))
            .ok_or(LedgerError::ReservationNotFound(reservation_id))
    }

    pub async fn active_for_product(&self, product_id: ProductId) -> Result<Vec<StockReservation>> {
        Ok(self
            .store
            .active_reservations_for_product(product_id, Utc::now())
            .await?)
    }

    pub async fn active_for_actor(&self, actor_id: &ActorId) -> Result<Vec<StockReservation>> {
        Ok(self
            .store
            .active_reservations_for_actor(actor_id, Utc::now())
            .await?)
    }
}
