pub mod cache;
pub mod item_handlers;
pub mod ledger;
pub mod movement_handlers;
pub mod query;
pub mod rate_limit;

pub use crate::cache::{Cache, CacheBackend, CacheConfig, CacheError, MemoryBackend};
pub use crate::rate_limit::{RateLimiter, RateLimiterConfig};

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use common_observability::InventoryMetrics;
use prometheus::{Encoder, TextEncoder};
use sqlx::PgPool;

use crate::item_handlers::{batch_items, create_item, get_item, list_items};
use crate::movement_handlers::{create_movement, list_movements};
use crate::rate_limit::rate_limit_middleware;

pub const DEFAULT_LISTING_TTL_SECS: u64 = 300;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub cache: Cache,
    pub limiter: RateLimiter,
    pub metrics: Arc<InventoryMetrics>,
    pub listing_ttl_secs: u64,
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).to_string())
}

/// Full application router. API routes sit behind the rate limiter;
/// `/healthz` and `/metrics` do not.
pub fn api_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/batch", post(batch_items))
        .route("/items/:id", get(get_item))
        .route("/stock-movements", get(list_movements).post(create_movement))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .merge(api)
        .with_state(state)
}
