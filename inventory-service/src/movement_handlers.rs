use axum::extract::{Query, State};
use axum::Json;
use common_http_errors::{ApiError, ApiResult, FieldError};
use serde::Deserialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::cache::Cache;
use crate::ledger::{self, LedgerError, MovementType, NewMovement, StockMovement, MOVEMENT_COLUMNS};
use crate::query::{item_key, MovementListQuery, Paginated, Pagination, ITEM_LIST_NAMESPACE, MOVEMENT_LIST_NAMESPACE};
use crate::AppState;

fn validate_movement(new: &NewMovement) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if new.quantity < 1 {
        errors.push(FieldError::new("quantity", "must be at least 1"));
    }
    if new.unit_price.is_negative() {
        errors.push(FieldError::new("unitPrice", "must not be negative"));
    }
    errors
}

/// Every cache family a stock change can make stale: the item's detail
/// entry, every item listing, every movement listing. Runs only after the
/// ledger transaction has committed.
pub async fn invalidate_after_stock_change(cache: &Cache, item_id: Uuid) {
    if let Err(err) = cache.delete(&item_key(item_id)).await {
        tracing::warn!(item_id = %item_id, error = %err, "failed to invalidate item detail");
    }
    if let Err(err) = cache.delete_prefix(ITEM_LIST_NAMESPACE).await {
        tracing::warn!(error = %err, "failed to invalidate item listings");
    }
    if let Err(err) = cache.delete_prefix(MOVEMENT_LIST_NAMESPACE).await {
        tracing::warn!(error = %err, "failed to invalidate movement listings");
    }
}

pub async fn create_movement(
    State(state): State<AppState>,
    Json(new): Json<NewMovement>,
) -> ApiResult<Json<Value>> {
    let errors = validate_movement(&new);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let outcome = ledger::apply_movement(&state.db, &new).await.map_err(|e| match e {
        LedgerError::ItemNotFound => ApiError::NotFound { code: "item_not_found", trace_id: None },
        LedgerError::InsufficientStock { requested, available } => {
            state.metrics.insufficient_stock_total.inc();
            ApiError::BadRequest {
                code: "insufficient_stock",
                trace_id: None,
                message: Some(format!(
                    "Insufficient stock (requested {requested}, available {available})"
                )),
            }
        }
        LedgerError::Database(err) => ApiError::internal(err, None),
    })?;

    state
        .metrics
        .movements_total
        .with_label_values(&[outcome.movement.movement_type.as_str()])
        .inc();
    if outcome.low_stock_alert {
        state.metrics.low_stock_alerts_total.inc();
    }

    invalidate_after_stock_change(&state.cache, outcome.item.id).await;

    Ok(Json(serde_json::json!({
        "movement": outcome.movement,
        "updatedItem": outcome.item,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMovementsParams {
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
    #[serde(rename = "itemId")]
    pub item_id: Option<String>,
    #[serde(rename = "type")]
    pub movement_type: Option<String>,
}

fn parse_movement_query(params: &ListMovementsParams) -> Result<MovementListQuery, ApiError> {
    let mut errors = Vec::new();
    let item = match params.item_id.as_deref() {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                errors.push(FieldError::new("itemId", "must be a valid id"));
                None
            }
        },
        None => None,
    };
    let movement_type = match params.movement_type.as_deref() {
        Some(raw) => match MovementType::parse(raw) {
            Some(kind) => Some(kind),
            None => {
                errors.push(FieldError::new("type", "is not a known movement type"));
                None
            }
        },
        None => None,
    };
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }
    Ok(MovementListQuery {
        item,
        movement_type,
        page: Pagination::from_params(params.page, params.page_size),
    })
}

fn push_movement_filters(qb: &mut QueryBuilder<Postgres>, query: &MovementListQuery) {
    if let Some(item) = query.item {
        qb.push(" AND item_id = ").push_bind(item);
    }
    if let Some(kind) = query.movement_type {
        qb.push(" AND movement_type = ").push_bind(kind);
    }
}

async fn fetch_movements_page(
    db: &PgPool,
    query: &MovementListQuery,
) -> Result<Vec<StockMovement>, sqlx::Error> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE 1=1"
    ));
    push_movement_filters(&mut qb, query);
    qb.push(" ORDER BY created_at DESC");
    qb.push(" LIMIT ")
        .push_bind(query.page.limit())
        .push(" OFFSET ")
        .push_bind(query.page.offset());
    qb.build_query_as::<StockMovement>().fetch_all(db).await
}

async fn count_movements(db: &PgPool, query: &MovementListQuery) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM stock_movements WHERE 1=1");
    push_movement_filters(&mut qb, query);
    qb.build_query_scalar::<i64>().fetch_one(db).await
}

pub async fn list_movements(
    State(state): State<AppState>,
    Query(params): Query<ListMovementsParams>,
) -> ApiResult<Json<Value>> {
    let query = parse_movement_query(&params)?;
    let key = query.cache_key();

    if let Some(cached) = state.cache.get::<Value>(&key).await {
        state.metrics.cache_hits_total.with_label_values(&["movements:list"]).inc();
        return Ok(Json(cached));
    }
    state.metrics.cache_misses_total.with_label_values(&["movements:list"]).inc();

    let movements = fetch_movements_page(&state.db, &query)
        .await
        .map_err(|e| ApiError::internal(e, None))?;
    let total = count_movements(&state.db, &query)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    let body = serde_json::to_value(Paginated::new(movements, total, &query.page))
        .map_err(|e| ApiError::internal(e, None))?;
    if let Err(err) = state.cache.set(&key, &body, state.listing_ttl_secs).await {
        tracing::warn!(key, error = %err, "failed to cache movement listing");
    }
    Ok(Json(body))
}
