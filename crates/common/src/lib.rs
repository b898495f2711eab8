//! Identifier types shared across the stock ledger crates.

pub mod types;

pub use types::{ActorId, MovementId, ProductId, ReservationId};
