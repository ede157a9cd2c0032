use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use inventory_service::query::ItemListQuery;
use tower::ServiceExt;

mod test_utils;
use test_utils::{app, lazy_state, limiter_config};

fn get_as(client: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .unwrap()
}

/// Prime the default listing key so admitted requests are served from the
/// cache and never reach the (absent) database.
async fn prime_default_listing(state: &inventory_service::AppState) {
    let key = ItemListQuery::default().cache_key();
    let payload = serde_json::json!({
        "data": [],
        "meta": { "total": 0, "page": 1, "pageSize": 10, "totalPages": 0 }
    });
    state.cache.set(&key, &payload, 300).await.unwrap();
}

#[tokio::test]
async fn budget_exhaustion_yields_429_shape() {
    let state = lazy_state(limiter_config(Duration::from_secs(60), 2));
    prime_default_listing(&state).await;
    let app = app(state);

    for _ in 0..2 {
        let resp = app.clone().oneshot(get_as("10.1.1.1", "/items")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = app.clone().oneshot(get_as("10.1.1.1", "/items")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "rate_limit_exceeded");
    let retry_after: u64 = resp
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn budget_is_tracked_per_client() {
    let state = lazy_state(limiter_config(Duration::from_secs(60), 1));
    prime_default_listing(&state).await;
    let app = app(state);

    let resp = app.clone().oneshot(get_as("10.1.1.1", "/items")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app.clone().oneshot(get_as("10.1.1.1", "/items")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different network identity still has its full budget.
    let resp = app.clone().oneshot(get_as("10.1.1.2", "/items")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_and_metrics_are_never_throttled() {
    let state = lazy_state(limiter_config(Duration::from_secs(60), 1));
    prime_default_listing(&state).await;
    let app = app(state);

    let resp = app.clone().oneshot(get_as("10.1.1.1", "/items")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app.clone().oneshot(get_as("10.1.1.1", "/items")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    for _ in 0..3 {
        let resp = app.clone().oneshot(get_as("10.1.1.1", "/healthz")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = app.clone().oneshot(get_as("10.1.1.1", "/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
