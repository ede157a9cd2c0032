use axum::extract::{Path, Query, State};
use axum::Json;
use common_http_errors::{ApiError, ApiResult, FieldError};
use common_money::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::cache::Cache;
use crate::ledger::{Item, ItemStatus, StockMovement, ITEM_COLUMNS, MOVEMENT_COLUMNS};
use crate::query::{item_key, ItemFilter, ItemListQuery, ItemSortField, Pagination, Paginated, SortOrder, ITEM_LIST_NAMESPACE, MOVEMENT_LIST_NAMESPACE};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListItemsParams {
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<String>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub status: Option<String>,
}

fn parse_item_query(params: &ListItemsParams) -> Result<ItemListQuery, ApiError> {
    let mut errors = Vec::new();

    let category = match params.category.as_deref() {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                errors.push(FieldError::new("category", "must be a valid id"));
                None
            }
        },
        None => None,
    };
    let supplier = match params.supplier.as_deref() {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                errors.push(FieldError::new("supplier", "must be a valid id"));
                None
            }
        },
        None => None,
    };
    let status = match params.status.as_deref() {
        Some(raw) => match ItemStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                errors.push(FieldError::new("status", "must be ACTIVE or ARCHIVED"));
                None
            }
        },
        None => None,
    };
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(ItemListQuery {
        filter: ItemFilter { search, category, supplier, status },
        page: Pagination::from_params(params.page, params.page_size),
        sort_by: ItemSortField::parse(params.sort_by.as_deref()),
        order: SortOrder::parse(params.sort_order.as_deref()),
    })
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn push_item_filters(qb: &mut QueryBuilder<Postgres>, filter: &ItemFilter) {
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR sku ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR barcode ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = filter.category {
        qb.push(" AND category_id = ").push_bind(category);
    }
    if let Some(supplier) = filter.supplier {
        qb.push(" AND supplier_id = ").push_bind(supplier);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
}

async fn fetch_items_page(db: &PgPool, query: &ItemListQuery) -> Result<Vec<Item>, sqlx::Error> {
    let mut qb = QueryBuilder::new(format!("SELECT {ITEM_COLUMNS} FROM items WHERE 1=1"));
    push_item_filters(&mut qb, &query.filter);
    qb.push(" ORDER BY ")
        .push(query.sort_by.column())
        .push(" ")
        .push(query.order.sql());
    qb.push(" LIMIT ")
        .push_bind(query.page.limit())
        .push(" OFFSET ")
        .push_bind(query.page.offset());
    qb.build_query_as::<Item>().fetch_all(db).await
}

async fn count_items(db: &PgPool, filter: &ItemFilter) -> Result<i64, sqlx::Error> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM items WHERE 1=1");
    push_item_filters(&mut qb, filter);
    qb.build_query_scalar::<i64>().fetch_one(db).await
}

/// Read path for the dashboard: cache hit returns without touching the
/// database; on a miss the page and the total run against the same filter
/// predicate and the assembled response is cached for the listing TTL.
pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ListItemsParams>,
) -> ApiResult<Json<Value>> {
    let _timer = state.metrics.listing_duration_seconds.start_timer();
    let query = parse_item_query(&params)?;
    let key = query.cache_key();

    if let Some(cached) = state.cache.get::<Value>(&key).await {
        state.metrics.cache_hits_total.with_label_values(&["items:list"]).inc();
        return Ok(Json(cached));
    }
    state.metrics.cache_misses_total.with_label_values(&["items:list"]).inc();

    let items = fetch_items_page(&state.db, &query)
        .await
        .map_err(|e| ApiError::internal(e, None))?;
    let total = count_items(&state.db, &query.filter)
        .await
        .map_err(|e| ApiError::internal(e, None))?;

    let body = serde_json::to_value(Paginated::new(items, total, &query.page))
        .map_err(|e| ApiError::internal(e, None))?;
    if let Err(err) = state.cache.set(&key, &body, state.listing_ttl_secs).await {
        tracing::warn!(key, error = %err, "failed to cache item listing");
    }
    Ok(Json(body))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: Item,
    pub recent_movements: Vec<StockMovement>,
}

pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let key = item_key(id);
    if let Some(cached) = state.cache.get::<Value>(&key).await {
        state.metrics.cache_hits_total.with_label_values(&["items:detail"]).inc();
        return Ok(Json(cached));
    }
    state.metrics.cache_misses_total.with_label_values(&["items:detail"]).inc();

    let item = sqlx::query_as::<_, Item>(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = $1"))
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::internal(e, None))?
        .ok_or(ApiError::NotFound { code: "item_not_found", trace_id: None })?;

    let recent_movements = sqlx::query_as::<_, StockMovement>(&format!(
        "SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE item_id = $1 \
         ORDER BY created_at DESC LIMIT 10"
    ))
    .bind(id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::internal(e, None))?;

    let body = serde_json::to_value(ItemDetail { item, recent_movements })
        .map_err(|e| ApiError::internal(e, None))?;
    if let Err(err) = state.cache.set(&key, &body, state.listing_ttl_secs).await {
        tracing::warn!(key, error = %err, "failed to cache item detail");
    }
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub barcode: Option<String>,
    pub category_id: Uuid,
    pub supplier_id: Uuid,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    #[serde(default)]
    pub current_stock: i32,
    #[serde(default)]
    pub minimum_stock: i32,
    #[serde(default)]
    pub maximum_stock: Option<i32>,
    #[serde(default)]
    pub reorder_point: Option<i32>,
    pub unit_price: Money,
    pub cost_price: Money,
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Already-uploaded image URLs, in display order; the first becomes
    /// the primary image.
    #[serde(default)]
    pub images: Vec<String>,
}

fn validate_new_item(new: &NewItem) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let name_len = new.name.chars().count();
    if !(2..=100).contains(&name_len) {
        errors.push(FieldError::new("name", "must be between 2 and 100 characters"));
    }
    let sku_len = new.sku.chars().count();
    if !(3..=50).contains(&sku_len) {
        errors.push(FieldError::new("sku", "must be between 3 and 50 characters"));
    }
    if new.current_stock < 0 {
        errors.push(FieldError::new("currentStock", "must not be negative"));
    }
    if new.minimum_stock < 0 {
        errors.push(FieldError::new("minimumStock", "must not be negative"));
    }
    if new.unit_price.is_negative() {
        errors.push(FieldError::new("unitPrice", "must not be negative"));
    }
    if new.cost_price.is_negative() {
        errors.push(FieldError::new("costPrice", "must not be negative"));
    }
    errors
}

fn map_insert_error(e: sqlx::Error) -> ApiError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23505") {
            return ApiError::Conflict {
                code: "sku_exists",
                trace_id: None,
                message: Some("An item with this SKU already exists".into()),
            };
        }
    }
    ApiError::internal(e, None)
}

pub async fn create_item(
    State(state): State<AppState>,
    Json(new_item): Json<NewItem>,
) -> ApiResult<Json<Item>> {
    let errors = validate_new_item(&new_item);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let mut tx = state.db.begin().await.map_err(|e| ApiError::internal(e, None))?;

    let item_id = Uuid::new_v4();
    let mut item = sqlx::query_as::<_, Item>(&format!(
        "INSERT INTO items (id, name, sku, barcode, category_id, supplier_id, location_id, \
         current_stock, minimum_stock, maximum_stock, reorder_point, unit_price, cost_price, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         RETURNING {ITEM_COLUMNS}"
    ))
    .bind(item_id)
    .bind(&new_item.name)
    .bind(&new_item.sku)
    .bind(new_item.barcode.as_deref())
    .bind(new_item.category_id)
    .bind(new_item.supplier_id)
    .bind(new_item.location_id)
    .bind(new_item.current_stock)
    .bind(new_item.minimum_stock)
    .bind(new_item.maximum_stock)
    .bind(new_item.reorder_point)
    .bind(&new_item.unit_price)
    .bind(&new_item.cost_price)
    .bind(new_item.metadata.as_ref())
    .fetch_one(&mut *tx)
    .await
    .map_err(map_insert_error)?;

    for (position, url) in new_item.images.iter().enumerate() {
        sqlx::query(
            "INSERT INTO item_images (id, item_id, url, is_primary, position) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(item_id)
        .bind(url)
        .bind(position == 0)
        .bind(position as i32)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::internal(e, None))?;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, None))?;
    item.images = new_item.images;

    if let Err(err) = state.cache.delete_prefix(ITEM_LIST_NAMESPACE).await {
        tracing::warn!(error = %err, "failed to invalidate item listings after create");
    }

    Ok(Json(item))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Delete,
    Archive,
    Restore,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub items: Vec<Uuid>,
    pub action: BatchAction,
}

/// Administrative bulk path; deleting items cascades their movement history
/// and is deliberately not a ledger operation.
pub async fn batch_items(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<Json<Value>> {
    if req.items.is_empty() {
        return Err(ApiError::validation(vec![FieldError::new("items", "must not be empty")]));
    }

    let mut tx = state.db.begin().await.map_err(|e| ApiError::internal(e, None))?;
    let result = match req.action {
        BatchAction::Delete => {
            sqlx::query("DELETE FROM items WHERE id = ANY($1)")
                .bind(&req.items)
                .execute(&mut *tx)
                .await
        }
        BatchAction::Archive => {
            sqlx::query("UPDATE items SET status = 'ARCHIVED', updated_at = NOW() WHERE id = ANY($1)")
                .bind(&req.items)
                .execute(&mut *tx)
                .await
        }
        BatchAction::Restore => {
            sqlx::query("UPDATE items SET status = 'ACTIVE', updated_at = NOW() WHERE id = ANY($1)")
                .bind(&req.items)
                .execute(&mut *tx)
                .await
        }
    };
    let affected = result.map_err(|e| ApiError::internal(e, None))?.rows_affected();
    tx.commit().await.map_err(|e| ApiError::internal(e, None))?;

    invalidate_batch_caches(&state.cache, &req.items, req.action).await;

    Ok(Json(serde_json::json!({ "success": true, "affected": affected })))
}

async fn invalidate_batch_caches(cache: &Cache, items: &[Uuid], action: BatchAction) {
    if let Err(err) = cache.delete_prefix(ITEM_LIST_NAMESPACE).await {
        tracing::warn!(error = %err, "failed to invalidate item listings after batch action");
    }
    // Deletion cascades movement history, so those listings are stale too.
    if matches!(action, BatchAction::Delete) {
        if let Err(err) = cache.delete_prefix(MOVEMENT_LIST_NAMESPACE).await {
            tracing::warn!(error = %err, "failed to invalidate movement listings after batch delete");
        }
    }
    for id in items {
        if let Err(err) = cache.delete(&item_key(*id)).await {
            tracing::warn!(item_id = %id, error = %err, "failed to invalidate item detail");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_item() -> NewItem {
        serde_json::from_value(serde_json::json!({
            "name": "Hex bolt M8",
            "sku": "HB-M8-100",
            "categoryId": "0b7c8f23-9d3b-4c5f-9a59-8f1e4cf1b0aa",
            "supplierId": "1b7c8f23-9d3b-4c5f-9a59-8f1e4cf1b0ab",
            "currentStock": 25,
            "minimumStock": 5,
            "unitPrice": 0.35,
            "costPrice": 0.21
        }))
        .unwrap()
    }

    #[test]
    fn new_item_passes_validation() {
        assert!(validate_new_item(&base_item()).is_empty());
    }

    #[test]
    fn short_name_and_sku_are_rejected() {
        let mut item = base_item();
        item.name = "x".into();
        item.sku = "ab".into();
        let errors = validate_new_item(&item);
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "sku"]);
    }

    #[test]
    fn negative_stock_and_prices_are_rejected() {
        let mut item = base_item();
        item.current_stock = -1;
        item.unit_price = Money::new(bigdecimal::BigDecimal::from(-5));
        let errors = validate_new_item(&item);
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["currentStock", "unitPrice"]);
    }

    #[test]
    fn invalid_status_filter_is_a_validation_error() {
        let params = ListItemsParams { status: Some("BOGUS".into()), ..Default::default() };
        assert!(parse_item_query(&params).is_err());
    }

    #[test]
    fn blank_search_is_dropped_from_the_key() {
        let with_blank = ListItemsParams { search: Some("   ".into()), ..Default::default() };
        let without = ListItemsParams::default();
        let a = parse_item_query(&with_blank).unwrap();
        let b = parse_item_query(&without).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn like_escaping_neutralizes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
