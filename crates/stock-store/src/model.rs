//! Stock ledger data model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorId, MovementId, ProductId, ReservationId, StoreError};

/// A catalog product as seen by the ledger.
///
/// `quantity` is the single authoritative stock count. The ledger only
/// updates it inside the same transaction as the movement that explains it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub quantity: i64,
    /// Reorder level used by stock alerts.
    pub min_stock: i64,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a product with a generated ID.
    pub fn new(name: impl Into<String>, quantity: i64, min_stock: i64) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            quantity,
            min_stock,
            updated_at: Utc::now(),
        }
    }
}

/// The cause of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Purchase,
    Sale,
    Return,
    Damage,
    Theft,
    Spillage,
    Breakage,
    Transfer,
    Adjustment,
}

impl MovementType {
    /// Every movement type, in declaration order.
    pub const ALL: [MovementType; 9] = [
        MovementType::Purchase,
        MovementType::Sale,
        MovementType::Return,
        MovementType::Damage,
        MovementType::Theft,
        MovementType::Spillage,
        MovementType::Breakage,
        MovementType::Transfer,
        MovementType::Adjustment,
    ];

    /// Returns the stored text form of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Purchase => "PURCHASE",
            MovementType::Sale => "SALE",
            MovementType::Return => "RETURN",
            MovementType::Damage => "DAMAGE",
            MovementType::Theft => "THEFT",
            MovementType::Spillage => "SPILLAGE",
            MovementType::Breakage => "BREAKAGE",
            MovementType::Transfer => "TRANSFER",
            MovementType::Adjustment => "ADJUSTMENT",
        }
    }

    /// Returns true if movements of this type add stock.
    ///
    /// Adjustments carry their direction in the recorded before/after
    /// quantities rather than in the type, so they report `false` here.
    pub fn is_increase(&self) -> bool {
        matches!(self, MovementType::Purchase | MovementType::Return)
    }

    /// Applies this type's direction to an unsigned movement quantity.
    pub fn signed(&self, quantity: i64) -> i64 {
        if self.is_increase() {
            quantity
        } else {
            -quantity
        }
    }

    /// Prefix for auto-generated movement references.
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            MovementType::Adjustment => "ADJ",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known movement type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown movement type: {0}")]
pub struct ParseMovementTypeError(pub String);

impl std::str::FromStr for MovementType {
    type Err = ParseMovementTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseMovementTypeError(s.to_string()))
    }
}

/// An immutable ledger entry recording one stock quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub movement_type: MovementType,
    /// Magnitude of the change, always positive.
    pub quantity: i64,
    pub reason: String,
    pub reference: String,
    pub actor_id: ActorId,
    pub before_qty: i64,
    pub after_qty: i64,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    /// Creates a new movement builder.
    pub fn builder() -> StockMovementBuilder {
        StockMovementBuilder::default()
    }

    /// Signed change this movement applied to the product quantity.
    pub fn delta(&self) -> i64 {
        self.after_qty - self.before_qty
    }
}

/// Builder for stock movements.
///
/// The after-quantity is derived from `before_qty` and `delta`, so a built
/// movement always satisfies the ledger arithmetic.
#[derive(Debug, Default)]
pub struct StockMovementBuilder {
    id: Option<MovementId>,
    product_id: Option<ProductId>,
    movement_type: Option<MovementType>,
    delta: Option<i64>,
    reason: Option<String>,
    reference: Option<String>,
    actor_id: Option<ActorId>,
    before_qty: Option<i64>,
    created_at: Option<DateTime<Utc>>,
}

impl StockMovementBuilder {
    /// Sets the movement ID. If not set, a new ID will be generated.
    pub fn id(mut self, id: MovementId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn product_id(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn movement_type(mut self, movement_type: MovementType) -> Self {
        self.movement_type = Some(movement_type);
        self
    }

    /// Sets the signed quantity change.
    pub fn delta(mut self, delta: i64) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the reference. If not set, `<PREFIX>-<millis>` is generated.
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn actor_id(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn before_qty(mut self, before_qty: i64) -> Self {
        self.before_qty = Some(before_qty);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds the movement, checking it against the ledger invariants.
    pub fn build(self) -> Result<StockMovement, StoreError> {
        let missing = |field: &str| StoreError::InvalidMovement(format!("{field} is required"));

        let movement_type = self.movement_type.ok_or_else(|| missing("movement_type"))?;
        let delta = self.delta.ok_or_else(|| missing("delta"))?;
        let before_qty = self.before_qty.ok_or_else(|| missing("before_qty"))?;
        let out_of_range =
            || StoreError::InvalidMovement(format!("delta {delta} on {before_qty} is out of range"));
        let quantity = delta.checked_abs().ok_or_else(out_of_range)?;
        let after_qty = before_qty.checked_add(delta).ok_or_else(out_of_range)?;
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        let reference = self.reference.unwrap_or_else(|| {
            format!(
                "{}-{}",
                movement_type.reference_prefix(),
                created_at.timestamp_millis()
            )
        });

        let movement = StockMovement {
            id: self.id.unwrap_or_default(),
            product_id: self.product_id.ok_or_else(|| missing("product_id"))?,
            movement_type,
            quantity,
            reason: self.reason.unwrap_or_default(),
            reference,
            actor_id: self.actor_id.ok_or_else(|| missing("actor_id"))?,
            before_qty,
            after_qty,
            created_at,
        };

        crate::store::validate_movement(&movement)?;
        Ok(movement)
    }
}

/// A temporary hold against available stock.
///
/// Reservations never touch `Product::quantity`. Whether one is active is
/// derived from `expires_at`; there is no stored status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub reason: String,
    pub actor_id: ActorId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StockReservation {
    /// Creates a reservation that expires `ttl` after `created_at`.
    ///
    /// A lifetime past the end of representable time saturates there.
    pub fn new(
        product_id: ProductId,
        quantity: i64,
        reason: impl Into<String>,
        actor_id: ActorId,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            product_id,
            quantity,
            reason: reason.into(),
            actor_id,
            created_at,
            expires_at: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// True while the hold still counts against available stock.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// True once the sweep may delete the reservation.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Aggregate of the active reservations held against one product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationTotals {
    pub quantity: i64,
    pub count: usize,
}

impl ReservationTotals {
    /// Sums the reservations that are active at `now`.
    pub fn from_active<'a>(
        reservations: impl IntoIterator<Item = &'a StockReservation>,
        now: DateTime<Utc>,
    ) -> Self {
        reservations
            .into_iter()
            .filter(|r| r.is_active_at(now))
            .fold(Self::default(), |acc, r| Self {
                quantity: acc.quantity + r.quantity,
                count: acc.count + 1,
            })
    }
}
