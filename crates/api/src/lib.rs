//! HTTP API server with observability for the stock ledger.
//!
//! Exposes the stock pool over REST, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use ledger::StockPool;
use metrics_exporter_prometheus::PrometheusHandle;
use stock_store::StockStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;
use routes::{products, reservations};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: StockStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/products", post(products::register::<S>))
        .route("/products/{id}/stock", get(products::summary::<S>))
        .route("/products/{id}/available", get(products::available::<S>))
        .route("/products/{id}/validate", post(products::validate::<S>))
        .route(
            "/products/{id}/movements",
            post(products::record_movement::<S>).get(products::movements::<S>),
        )
        .route("/products/{id}/adjustments", post(products::adjust::<S>))
        .route(
            "/products/{id}/reservations",
            post(products::reserve::<S>).get(products::reservations::<S>),
        )
        .route("/products/{id}/audit", get(products::audit::<S>))
        .route("/reservations/cleanup", post(reservations::cleanup::<S>))
        .route(
            "/reservations/{id}",
            get(reservations::get::<S>).delete(reservations::release::<S>),
        )
        .route(
            "/reservations/{id}/fulfill",
            post(reservations::fulfill::<S>),
        )
        .route(
            "/actors/{id}/reservations",
            get(reservations::for_actor::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wraps a stock pool in the shared handler state.
pub fn create_state<S: StockStore + Clone + 'static>(pool: StockPool<S>) -> Arc<AppState<S>> {
    Arc::new(AppState { pool })
}
