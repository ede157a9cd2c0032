use anyhow::Context;
use axum::{
    body::Body,
    extract::State,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
};
use common_observability::InventoryMetrics;
use inventory_service::{
    api_router, AppState, Cache, CacheConfig, RateLimiter, RateLimiterConfig,
    DEFAULT_LISTING_TTL_SECS,
};
use sqlx::PgPool;
use std::{env, net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db_pool = PgPool::connect(&database_url).await?;
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let cache_config = CacheConfig {
        op_timeout: Duration::from_millis(env_u64("CACHE_OP_TIMEOUT_MS", 1000)),
        retries: env_u64("CACHE_RETRIES", 5) as u32,
        max_value_bytes: env_u64("CACHE_MAX_VALUE_BYTES", 1 << 20) as usize,
    };
    // One cache handle for the whole process; the limiter and the read
    // paths share it by clone, so tests can substitute a fake backend.
    let cache = Cache::in_memory(cache_config);

    let limiter = RateLimiter::new(
        cache.clone(),
        RateLimiterConfig {
            window: Duration::from_secs(env_u64("RATE_LIMIT_WINDOW_SECS", 60)),
            budget: env_u64("RATE_LIMIT_BUDGET", 100) as u32,
        },
    );

    let metrics = Arc::new(InventoryMetrics::new());
    let state = AppState {
        db: db_pool,
        cache,
        limiter,
        metrics: metrics.clone(),
        listing_ttl_secs: env_u64("LISTING_CACHE_TTL_SECS", DEFAULT_LISTING_TTL_SECS),
    };

    let allowed_origins = [
        "http://localhost:3000",
        "http://localhost:3001",
        "http://localhost:5173",
    ];

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE]);

    // Error metrics middleware using dedicated state (Arc<InventoryMetrics>) passed via from_fn_with_state.
    async fn error_metrics_mw(
        State(metrics): State<Arc<InventoryMetrics>>,
        req: axum::http::Request<Body>,
        next: middleware::Next,
    ) -> axum::response::Response {
        let resp = next.run(req).await;
        let status = resp.status();
        if status.as_u16() >= 400 {
            let code = resp
                .headers()
                .get("x-error-code")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            metrics
                .http_errors_total
                .with_label_values(&["inventory-service", code, status.as_str()])
                .inc();
        }
        resp
    }

    let app = api_router(state)
        .layer(middleware::from_fn_with_state(metrics, error_metrics_mw))
        .layer(cors);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8086);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));
    println!("starting inventory-service on {addr}");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
