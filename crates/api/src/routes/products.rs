//! Product-scoped stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::ProductId;
use ledger::{
    AuditReport, LedgerError, RecordMovement, ReserveStock, StockOperation, StockSummary,
    StockValidation, UpdateStock,
};
use serde::{Deserialize, Serialize};
use stock_store::{
    MovementQuery, MovementType, Product, StockMovement, StockReservation, StockStore,
};

use super::{AppState, parse_product_id, resolve_actor};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterProductRequest {
    pub name: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub min_stock: i64,
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub quantity: i64,
    pub operation: StockOperation,
}

#[derive(Deserialize)]
pub struct MovementRequest {
    pub movement_type: String,
    pub quantity: i64,
    #[serde(default)]
    pub reason: String,
    pub reference: Option<String>,
    pub actor_id: Option<String>,
}

#[derive(Deserialize)]
pub struct AdjustmentRequest {
    pub quantity: i64,
    pub reason: String,
    #[serde(default)]
    pub require_approval: bool,
    pub actor_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ReservationRequest {
    pub quantity: i64,
    #[serde(default)]
    pub reason: String,
    pub expiration_minutes: Option<i64>,
    pub actor_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementHistoryParams {
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
    pub actor_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// `asc` (default) or `desc`.
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct AvailableResponse {
    pub product_id: ProductId,
    pub available_stock: i64,
}

// -- Handlers --

/// POST /products: register a product with its opening stock.
#[tracing::instrument(skip(state, req))]
pub async fn register<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<RegisterProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state
        .pool
        .register_product(req.name, req.quantity, req.min_stock)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products/:id/stock: stock summary.
#[tracing::instrument(skip(state))]
pub async fn summary<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<StockSummary>, ApiError> {
    let product_id = parse_product_id(&id)?;
    Ok(Json(state.pool.stock_summary(product_id).await?))
}

/// GET /products/:id/available: available stock only.
#[tracing::instrument(skip(state))]
pub async fn available<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<AvailableResponse>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let available_stock = state.pool.available_stock(product_id).await?;
    Ok(Json(AvailableResponse {
        product_id,
        available_stock,
    }))
}

/// POST /products/:id/validate: precheck a reserve or reduce operation.
#[tracing::instrument(skip(state, req))]
pub async fn validate<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ValidateRequest>,
) -> Result<Json<StockValidation>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let validation = state
        .pool
        .validate_stock_operation(product_id, req.quantity, req.operation)
        .await?;
    Ok(Json(validation))
}

/// POST /products/:id/movements: record a purchase, sale, return, loss or transfer.
#[tracing::instrument(skip(state, headers, req))]
pub async fn record_movement<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MovementRequest>,
) -> Result<(StatusCode, Json<StockMovement>), ApiError> {
    let product_id = parse_product_id(&id)?;
    let actor_id = resolve_actor(req.actor_id, &headers)?;

    let mut cmd = RecordMovement::parse(product_id, &req.movement_type, req.quantity, actor_id)?
        .with_reason(req.reason);
    if let Some(reference) = req.reference {
        cmd = cmd.with_reference(reference);
    }

    let movement = state.pool.record_movement(cmd).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// GET /products/:id/movements: filtered movement history.
#[tracing::instrument(skip(state))]
pub async fn movements<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Query(params): Query<MovementHistoryParams>,
) -> Result<Json<Vec<StockMovement>>, ApiError> {
    let product_id = parse_product_id(&id)?;
    let query = history_query(product_id, params)?;
    Ok(Json(state.pool.movement_history(query).await?))
}

/// POST /products/:id/adjustments: manual correction with a reason.
#[tracing::instrument(skip(state, headers, req))]
pub async fn adjust<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AdjustmentRequest>,
) -> Result<(StatusCode, Json<StockMovement>), ApiError> {
    let product_id = parse_product_id(&id)?;
    let actor_id = resolve_actor(req.actor_id, &headers)?;

    let cmd = UpdateStock::parse(product_id, req.quantity, &req.reason, actor_id)?
        .require_approval(req.require_approval);
    let movement = state.pool.update_stock(cmd).await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// POST /products/:id/reservations: place a reservation.
#[tracing::instrument(skip(state, headers, req))]
pub async fn reserve<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ReservationRequest>,
) -> Result<(StatusCode, Json<StockReservation>), ApiError> {
    let product_id = parse_product_id(&id)?;
    let actor_id = resolve_actor(req.actor_id, &headers)?;

    let mut cmd = ReserveStock::new(product_id, req.quantity, actor_id).with_reason(req.reason);
    if let Some(minutes) = req.expiration_minutes {
        cmd = cmd.expires_in_minutes(minutes);
    }

    let reservation = state.pool.reserve_stock(cmd).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// GET /products/:id/reservations: active reservations on a product.
#[tracing::instrument(skip(state))]
pub async fn reservations<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StockReservation>>, ApiError> {
    let product_id = parse_product_id(&id)?;
    Ok(Json(state.pool.active_reservations(product_id).await?))
}

/// GET /products/:id/audit: replay and verify the movement ledger.
#[tracing::instrument(skip(state))]
pub async fn audit<S: StockStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<AuditReport>, ApiError> {
    let product_id = parse_product_id(&id)?;
    Ok(Json(state.pool.verify_ledger(product_id).await?))
}

fn history_query(
    product_id: ProductId,
    params: MovementHistoryParams,
) -> Result<MovementQuery, ApiError> {
    let mut query = MovementQuery::for_product(product_id);

    if let Some(movement_type) = params.movement_type {
        let movement_type = movement_type
            .parse::<MovementType>()
            .map_err(LedgerError::from)?;
        query = query.movement_type(movement_type);
    }
    if let Some(actor_id) = params.actor_id {
        query = query.actor_id(actor_id.into());
    }
    if let Some(from) = params.from {
        query = query.from_timestamp(from);
    }
    if let Some(to) = params.to {
        query = query.to_timestamp(to);
    }
    match params.order.as_deref() {
        None | Some("asc") => {}
        Some("desc") => query = query.newest_first(),
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "Invalid order '{other}', expected 'asc' or 'desc'"
            )));
        }
    }
    if let Some(limit) = params.limit {
        query = query.limit(page_bound("limit", limit)?);
    }
    if let Some(offset) = params.offset {
        query = query.offset(page_bound("offset", offset)?);
    }

    Ok(query)
}

fn page_bound(name: &str, value: usize) -> Result<usize, ApiError> {
    if i64::try_from(value).is_err() {
        return Err(ApiError::BadRequest(format!(
            "{name} must be at most {}, got {value}",
            i64::MAX
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use stock_store::SortOrder;

    use super::*;

    #[test]
    fn history_query_maps_every_parameter() {
        let product_id = ProductId::new();
        let query = history_query(
            product_id,
            MovementHistoryParams {
                movement_type: Some("sale".to_string()),
                actor_id: Some("pos-1".to_string()),
                order: Some("desc".to_string()),
                limit: Some(5),
                offset: Some(10),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(query.product_id, Some(product_id));
        assert_eq!(query.movement_types, Some(vec![MovementType::Sale]));
        assert_eq!(query.actor_id.as_ref().map(|a| a.as_str()), Some("pos-1"));
        assert_eq!(query.order, SortOrder::NewestFirst);
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, Some(10));
    }

    #[test]
    fn history_query_rejects_bad_values() {
        let bad_type = history_query(
            ProductId::new(),
            MovementHistoryParams {
                movement_type: Some("RESTOCK".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(
            bad_type,
            Err(ApiError::Ledger(LedgerError::UnsupportedOperation(_)))
        ));

        let bad_order = history_query(
            ProductId::new(),
            MovementHistoryParams {
                order: Some("sideways".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(bad_order, Err(ApiError::BadRequest(_))));

        let huge_limit = history_query(
            ProductId::new(),
            MovementHistoryParams {
                limit: Some(usize::MAX),
                ..Default::default()
            },
        );
        assert!(matches!(huge_limit, Err(ApiError::BadRequest(ref m)) if m.starts_with("limit")));

        let huge_offset = history_query(
            ProductId::new(),
            MovementHistoryParams {
                offset: Some(usize::MAX),
                ..Default::default()
            },
        );
        assert!(matches!(huge_offset, Err(ApiError::BadRequest(_))));
    }
}
