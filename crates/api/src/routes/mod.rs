//! HTTP handlers.

pub mod health;
pub mod metrics;
pub mod products;
pub mod reservations;

use axum::http::HeaderMap;
use common::{ActorId, ProductId, ReservationId};
use ledger::StockPool;

use crate::error::ApiError;

/// Header carrying the acting user when the body does not name one.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub pool: StockPool<S>,
}

/// Picks the actor from the request body, then from the `x-actor-id` header.
pub(crate) fn resolve_actor(
    from_body: Option<String>,
    headers: &HeaderMap,
) -> Result<ActorId, ApiError> {
    from_body
        .or_else(|| {
            headers
                .get(ACTOR_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .map(|actor| actor.trim().to_string())
        .filter(|actor| !actor.is_empty())
        .map(ActorId::new)
        .ok_or_else(|| {
            ApiError::BadRequest(format!("actor_id or the {ACTOR_HEADER} header is required"))
        })
}

pub(crate) fn parse_product_id(id: &str) -> Result<ProductId, ApiError> {
    ProductId::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid product ID: {e}")))
}

pub(crate) fn parse_reservation_id(id: &str) -> Result<ReservationId, ApiError> {
    ReservationId::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid reservation ID: {e}")))
}
