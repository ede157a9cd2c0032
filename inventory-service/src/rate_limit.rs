//! Fixed-window request budget per client, counted on the cache substrate.
//!
//! Deliberately a coarse fixed window, not a sliding window or token
//! bucket: up to twice the budget can land across a window boundary. If
//! the cache substrate is unavailable the limiter fails open and admits
//! with a warning instead of turning a cache outage into a full outage
//! (see DESIGN.md).

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use common_http_errors::ApiError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::Cache;
use crate::AppState;

pub const RATE_LIMIT_NAMESPACE: &str = "ratelimit:";

/// Identity used when neither a forwarded header nor a peer address is
/// available.
pub const UNRESOLVED_CLIENT: &str = "unknown";

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub window: Duration,
    pub budget: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { window: Duration::from_secs(60), budget: 100 }
    }
}

#[derive(Debug, Error)]
#[error("rate limit exceeded, retry after {retry_after_secs}s")]
pub struct RateLimitExceeded {
    pub retry_after_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RateWindow {
    count: u32,
    started_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RateLimiter {
    cache: Cache,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(cache: Cache, config: RateLimiterConfig) -> Self {
        Self { cache, config }
    }

    /// Admit or reject one request for `client`. The counter carries the
    /// window start so every persist can shrink the TTL to the remaining
    /// window, rounded up to whole seconds.
    pub async fn admit(&self, client: &str) -> Result<(), RateLimitExceeded> {
        let key = format!("{RATE_LIMIT_NAMESPACE}{client}");
        let now = Utc::now();
        match self.cache.get::<RateWindow>(&key).await {
            None => {
                let window = RateWindow { count: 1, started_at: now };
                let ttl = self.config.window.as_secs().max(1);
                if let Err(err) = self.cache.set(&key, &window, ttl).await {
                    tracing::warn!(client, error = %err, "rate limit store unavailable; admitting");
                }
                Ok(())
            }
            Some(window) => {
                let remaining = self.remaining_secs(&window, now);
                if window.count >= self.config.budget {
                    return Err(RateLimitExceeded { retry_after_secs: remaining });
                }
                let next = RateWindow { count: window.count + 1, started_at: window.started_at };
                if let Err(err) = self.cache.set(&key, &next, remaining).await {
                    tracing::warn!(client, error = %err, "rate limit store unavailable; admitting");
                }
                Ok(())
            }
        }
    }

    fn remaining_secs(&self, window: &RateWindow, now: DateTime<Utc>) -> u64 {
        let elapsed_ms = (now - window.started_at).num_milliseconds().max(0) as u64;
        let window_ms = self.config.window.as_millis() as u64;
        let left_ms = window_ms.saturating_sub(elapsed_ms);
        (left_ms.div_ceil(1000)).max(1)
    }
}

/// Applied to all API routes; `/healthz` and `/metrics` stay unthrottled.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_identity(&req);
    if let Err(rejected) = state.limiter.admit(&client).await {
        state.metrics.rate_limited_total.inc();
        return ApiError::RateLimited {
            retry_after_secs: rejected.retry_after_secs,
            trace_id: None,
        }
        .into_response();
    }
    next.run(req).await
}

fn client_identity(req: &Request) -> String {
    if let Some(forwarded) = req.headers().get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| UNRESOLVED_CLIENT.to_string())
}
