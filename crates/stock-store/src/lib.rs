//! Storage layer for the stock ledger.
//!
//! Owns the data model (products, movements, reservations), the leaf
//! invariant checks every row must pass before it is written, and the
//! transactional store abstraction with in-memory and PostgreSQL backends.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::{ActorId, MovementId, ProductId, ReservationId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStockStore;
pub use model::{
    MovementType, ParseMovementTypeError, Product, ReservationTotals, StockMovement,
    StockReservation,
};
pub use postgres::PostgresStockStore;
pub use query::{MovementQuery, SortOrder};
pub use store::{
    MovementStream, StockStore, StockStoreExt, StockTransaction, validate_movement,
    validate_reservation,
};
