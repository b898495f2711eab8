//! Liveness endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use stock_store::StockStore;

use super::AppState;

/// Liveness plus the ledger limits callers most often need to know.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub default_reservation_minutes: i64,
    pub large_adjustment_threshold: i64,
}

/// GET /health
pub async fn check<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let config = state.pool.config();
    Json(HealthResponse {
        status: "ok",
        default_reservation_minutes: config.default_reservation_minutes,
        large_adjustment_threshold: config.large_adjustment_threshold,
    })
}
