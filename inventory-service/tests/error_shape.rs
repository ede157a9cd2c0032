use axum::http::StatusCode;
use http_body_util::BodyExt; // for collect()
use tower::ServiceExt; // for oneshot

mod test_utils;
use test_utils::{app, default_state, get, post_json};

#[tokio::test]
async fn healthz_is_open() {
    let app = app(default_state());
    let resp = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn zero_quantity_movement_yields_validation_shape() {
    let app = app(default_state());
    let body = serde_json::json!({
        "itemId": "7f8c8f23-9d3b-4c5f-9a59-8f1e4cf1b0aa",
        "type": "SALE",
        "quantity": 0,
        "unitPrice": 5.0
    });
    let resp = app.oneshot(post_json("/stock-movements", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "validation_failed");

    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "validation_failed");
    assert_eq!(body["details"][0]["field"], "quantity");
}

#[tokio::test]
async fn unknown_movement_type_is_rejected_at_the_boundary() {
    let app = app(default_state());
    let body = serde_json::json!({
        "itemId": "7f8c8f23-9d3b-4c5f-9a59-8f1e4cf1b0aa",
        "type": "REFUND",
        "quantity": 1,
        "unitPrice": 5.0
    });
    let resp = app.oneshot(post_json("/stock-movements", body)).await.unwrap();
    // axum's Json extractor rejects the unknown enum variant before the handler runs
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn bogus_status_filter_yields_validation_shape() {
    let app = app(default_state());
    let resp = app.oneshot(get("/items?status=BOGUS")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "validation_failed");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["details"][0]["field"], "status");
}

#[tokio::test]
async fn malformed_category_filter_yields_validation_shape() {
    let app = app(default_state());
    let resp = app.oneshot(get("/items?category=not-a-uuid")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["details"][0]["field"], "category");
}

#[tokio::test]
async fn empty_batch_request_yields_validation_shape() {
    let app = app(default_state());
    let body = serde_json::json!({ "items": [], "action": "archive" });
    let resp = app.oneshot(post_json("/items/batch", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "validation_failed");
}

#[tokio::test]
async fn invalid_new_item_reports_every_bad_field() {
    let app = app(default_state());
    let body = serde_json::json!({
        "name": "x",
        "sku": "ab",
        "categoryId": "0b7c8f23-9d3b-4c5f-9a59-8f1e4cf1b0aa",
        "supplierId": "1b7c8f23-9d3b-4c5f-9a59-8f1e4cf1b0ab",
        "currentStock": -2,
        "unitPrice": 1.0,
        "costPrice": 1.0
    });
    let resp = app.oneshot(post_json("/items", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "sku", "currentStock"]);
}
