//! Generic key/value cache with per-entry TTL and prefix-based bulk
//! invalidation. Carries no inventory semantics; the rate limiter and the
//! listing read path share one handle constructed at startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache operation timed out")]
    Timeout,
    #[error("cache value exceeds {0} bytes")]
    ValueTooLarge(usize),
    #[error("cache value could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Storage seam for the cache. Payloads are opaque serialized strings;
/// implementations decide how keys and expiry are kept.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError>;
    async fn flush(&self) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Per-attempt timeout for one backend operation.
    pub op_timeout: Duration,
    /// Total attempts before an operation is reported unavailable.
    pub retries: u32,
    /// Serialized payloads above this size are rejected on `set`.
    pub max_value_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(1),
            retries: 5,
            max_value_bytes: 1 << 20,
        }
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process backend: TTL map behind an async RwLock with native
/// prefix-scan deletion. Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry { value, expires_at: Instant::now() + ttl };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.entries.write().await.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum WriteOp<'a> {
    Set { key: &'a str, value: &'a str, ttl: Duration },
    Delete(&'a str),
    DeletePrefix(&'a str),
    Flush,
}

/// Shared cache handle. Applies the configured timeout and retry budget to
/// every backend operation; `get` degrades backend failures to misses while
/// write failures propagate so callers never assume a value was stored.
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut last: Option<CacheError> = None;
        for _ in 0..self.config.retries.max(1) {
            match tokio::time::timeout(self.config.op_timeout, self.backend.get(key)).await {
                Ok(Ok(Some(raw))) => match serde_json::from_str(&raw) {
                    Ok(value) => return Some(value),
                    Err(err) => {
                        tracing::warn!(key, error = %err, "discarding undecodable cache entry");
                        return None;
                    }
                },
                Ok(Ok(None)) => return None,
                Ok(Err(err)) => last = Some(err),
                Err(_) => last = Some(CacheError::Timeout),
            }
        }
        if let Some(err) = last {
            tracing::warn!(key, error = %err, "cache get degraded to miss");
        }
        None
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<(), CacheError> {
        let raw = serde_json::to_string(value)?;
        if raw.len() > self.config.max_value_bytes {
            return Err(CacheError::ValueTooLarge(self.config.max_value_bytes));
        }
        let ttl = Duration::from_secs(ttl_secs);
        self.write(WriteOp::Set { key, value: &raw, ttl }).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.write(WriteOp::Delete(key)).await
    }

    /// Remove every entry whose key starts with `prefix`; used to drop an
    /// entire query namespace without enumerating its keys.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.write(WriteOp::DeletePrefix(prefix)).await
    }

    pub async fn flush(&self) -> Result<(), CacheError> {
        self.write(WriteOp::Flush).await
    }

    async fn write(&self, op: WriteOp<'_>) -> Result<(), CacheError> {
        let mut last = CacheError::Timeout;
        for _ in 0..self.config.retries.max(1) {
            let attempt = async {
                match op {
                    WriteOp::Set { key, value, ttl } => {
                        self.backend.set(key, value.to_string(), ttl).await
                    }
                    WriteOp::Delete(key) => self.backend.delete(key).await,
                    WriteOp::DeletePrefix(prefix) => self.backend.delete_prefix(prefix).await,
                    WriteOp::Flush => self.backend.flush().await,
                }
            };
            match tokio::time::timeout(self.config.op_timeout, attempt).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => last = err,
                Err(_) => last = CacheError::Timeout,
            }
        }
        Err(last)
    }
}
