//! Stock ledger and reservation engine.
//!
//! Owns the authoritative quantity of every product and guarantees that
//! concurrent callers never oversell it:
//!
//! - [`MovementRecorder`] applies purchases, sales, returns, losses and transfers
//! - [`ReservationManager`] places, releases, fulfills and sweeps time-bounded holds
//! - [`AdjustmentValidator`] gates manual corrections behind a reason vocabulary
//!   and an approval threshold
//! - [`AvailabilityCalculator`] derives available stock and summaries
//!
//! [`StockPool`] composes them over one [`stock_store::StockStore`]. Every
//! committed change is published as a [`StockEvent`]; alerting and real-time
//! broadcasting subscribe through [`spawn_side_effects`].

pub mod adjustment;
pub mod audit;
pub mod availability;
pub mod config;
pub mod error;
pub mod events;
pub mod movement;
pub mod reason;
pub mod reservation;
pub mod service;
pub mod side_effects;
pub mod sweeper;

pub use adjustment::{AdjustmentValidator, UpdateStock};
pub use audit::{AuditReport, Discrepancy, audit_product};
pub use availability::{AvailabilityCalculator, StockOperation, StockSummary, StockValidation};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use events::{EventPublisher, MovementEvent, StockEvent};
pub use movement::{MovementRecorder, RecordMovement};
pub use reason::{AdjustmentReason, ParseAdjustmentReasonError};
pub use reservation::{ReservationManager, ReserveStock};
pub use service::StockPool;
pub use side_effects::{
    AlertChecker, AlertLevel, LoggingBroadcaster, MovementBroadcaster, SideEffectError,
    DEFAULT_ALERT_HISTORY, StockAlert, StockLevelAlerts, spawn_side_effects,
};
pub use sweeper::ExpirySweeper;
