//! Reservation-scoped endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::ActorId;
use serde::Serialize;
use stock_store::{StockMovement, StockReservation, StockStore};

use super::{AppState, parse_reservation_id, resolve_actor};
use crate::error::ApiError;

#[derive(Serialize)]
pub struct CleanupResponse {
    pub removed: u64,
}

/// GET /reservations/:id: an active reservation.
#[tracing::instrument(skip(state))]
pub async fn get<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StockReservation>, ApiError> {
    let reservation_id = parse_reservation_id(&id)?;
    Ok(Json(state.pool.reservation(reservation_id).await?))
}

/// DELETE /reservations/:id: release a reservation.
#[tracing::instrument(skip(state))]
pub async fn release<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StockReservation>, ApiError> {
    let reservation_id = parse_reservation_id(&id)?;
    Ok(Json(state.pool.release_reservation(reservation_id).await?))
}

/// POST /reservations/:id/fulfill: convert a reservation into a sale.
///
/// The actor comes from the `x-actor-id` header.
#[tracing::instrument(skip(state, headers))]
pub async fn fulfill<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StockMovement>, ApiError> {
    let reservation_id = parse_reservation_id(&id)?;
    let actor_id = resolve_actor(None, &headers)?;
    let movement = state
        .pool
        .fulfill_reservation(reservation_id, actor_id)
        .await?;
    Ok(Json(movement))
}

/// POST /reservations/cleanup: run the expiry sweep now.
#[tracing::instrument(skip(state))]
pub async fn cleanup<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let removed = state.pool.cleanup_expired_reservations().await?;
    Ok(Json(CleanupResponse { removed }))
}

/// GET /actors/:id/reservations: active reservations held by an actor.
#[tracing::instrument(skip(state))]
pub async fn for_actor<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StockReservation>>, ApiError> {
    let reservations = state.pool.actor_reservations(&ActorId::new(id)).await?;
    Ok(Json(reservations))
}
