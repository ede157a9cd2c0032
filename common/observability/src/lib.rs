use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};

#[derive(Clone)]
pub struct InventoryMetrics {
    pub registry: Registry,
    pub movements_total: IntCounterVec,
    pub insufficient_stock_total: IntCounter,
    pub low_stock_alerts_total: IntCounter,
    pub cache_hits_total: IntCounterVec,
    pub cache_misses_total: IntCounterVec,
    pub rate_limited_total: IntCounter,
    pub listing_duration_seconds: Histogram,
    pub http_errors_total: IntCounterVec,
}

impl InventoryMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let movements_total = IntCounterVec::new(
            prometheus::Opts::new(
                "stock_movements_total",
                "Stock movements applied, by movement type",
            ),
            &["type"],
        ).unwrap();
        let insufficient_stock_total = IntCounter::new(
            "stock_movements_insufficient_total",
            "Outgoing movements rejected for insufficient stock",
        ).unwrap();
        let low_stock_alerts_total = IntCounter::new(
            "low_stock_alerts_total",
            "Low-stock notifications created by the ledger",
        ).unwrap();
        let cache_hits_total = IntCounterVec::new(
            prometheus::Opts::new("cache_hits_total", "Cache hits by key namespace"),
            &["namespace"],
        ).unwrap();
        let cache_misses_total = IntCounterVec::new(
            prometheus::Opts::new("cache_misses_total", "Cache misses by key namespace"),
            &["namespace"],
        ).unwrap();
        let rate_limited_total = IntCounter::new(
            "rate_limited_requests_total",
            "Requests rejected by the fixed-window rate limiter",
        ).unwrap();
        let listing_duration_seconds = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "item_listing_duration_seconds",
                "Duration of an item listing request, cache hits included"
            ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0])
        ).unwrap();
        let http_errors_total = IntCounterVec::new(
            prometheus::Opts::new(
                "http_errors_total",
                "Count of HTTP error responses emitted (status >= 400)"
            ),
            &["service", "code", "status"]
        ).unwrap();
        let _ = registry.register(Box::new(movements_total.clone()));
        let _ = registry.register(Box::new(insufficient_stock_total.clone()));
        let _ = registry.register(Box::new(low_stock_alerts_total.clone()));
        let _ = registry.register(Box::new(cache_hits_total.clone()));
        let _ = registry.register(Box::new(cache_misses_total.clone()));
        let _ = registry.register(Box::new(rate_limited_total.clone()));
        let _ = registry.register(Box::new(listing_duration_seconds.clone()));
        let _ = registry.register(Box::new(http_errors_total.clone()));
        InventoryMetrics {
            registry,
            movements_total,
            insufficient_stock_total,
            low_stock_alerts_total,
            cache_hits_total,
            cache_misses_total,
            rate_limited_total,
            listing_duration_seconds,
            http_errors_total,
        }
    }
}

impl Default for InventoryMetrics {
    fn default() -> Self { Self::new() }
}
