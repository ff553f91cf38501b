// src/cache.rs

//! Storage for fetched discovery documents and failure markers.
//!
//! The discovery service only talks to [`KeyValueCache`], so the in-memory
//! [`MokaCache`] used by a single process can be swapped for a shared store
//! such as [`RedisCache`] (feature `redis-cache`) without touching the fetch
//! logic. Values are plain JSON so any string store can hold them.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

/// A key/value store with per-entry expiry.
///
/// Each operation must be atomic for a single key. Nothing above that is
/// required: two callers racing on the same key simply both write, and the
/// last write wins.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Returns the value if present and not yet expired.
    async fn get(&self, key: &str) -> Option<Value>;

    async fn put(&self, key: &str, value: Value, ttl: Duration);

    async fn forget(&self, key: &str);
}

#[derive(Clone)]
struct CachedValue {
    value: Value,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    // Overwriting an entry restarts its clock with the new TTL.
    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backed by `moka`.
#[derive(Clone)]
pub struct MokaCache {
    inner: Cache<String, CachedValue>,
}

impl MokaCache {
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl KeyValueCache for MokaCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key).await.map(|entry| entry.value)
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) {
        self.inner
            .insert(key.to_string(), CachedValue { value, ttl })
            .await;
    }

    async fn forget(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}

#[cfg(feature = "redis-cache")]
pub use self::redis_store::RedisCache;

#[cfg(feature = "redis-cache")]
mod redis_store {
    use super::KeyValueCache;
    use crate::error::NilaOidcError;
    use async_trait::async_trait;
    use redis::aio::MultiplexedConnection;
    use redis::AsyncCommands;
    use serde_json::Value;
    use std::time::Duration;
    use tracing::warn;

    /// Shared cache backed by Redis, for deployments running several
    /// processes against the same providers.
    ///
    /// Store errors are logged and read as a miss; they never reach the
    /// discovery service as failures.
    #[derive(Clone)]
    pub struct RedisCache {
        connection: MultiplexedConnection,
    }

    impl RedisCache {
        /// Connects to the Redis instance at `url` (e.g. `redis://127.0.0.1/`).
        pub async fn connect(url: &str) -> Result<Self, NilaOidcError> {
            let client =
                redis::Client::open(url).map_err(|e| NilaOidcError::Cache(e.to_string()))?;
            let connection = client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| NilaOidcError::Cache(e.to_string()))?;
            Ok(Self { connection })
        }
    }

    #[async_trait]
    impl KeyValueCache for RedisCache {
        async fn get(&self, key: &str) -> Option<Value> {
            let mut connection = self.connection.clone();
            match connection.get::<_, Option<String>>(key).await {
                Ok(Some(raw)) => match serde_json::from_str(&raw) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(key, error = %e, "Discarding undecodable cache entry");
                        None
                    }
                },
                Ok(None) => None,
                Err(e) => {
                    warn!(key, error = %e, "Redis GET failed; treating as cache miss");
                    None
                }
            }
        }

        async fn put(&self, key: &str, value: Value, ttl: Duration) {
            let mut connection = self.connection.clone();
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            if let Err(e) = connection
                .pset_ex::<_, _, ()>(key, value.to_string(), millis)
                .await
            {
                warn!(key, error = %e, "Redis PSETEX failed");
            }
        }

        async fn forget(&self, key: &str) {
            let mut connection = self.connection.clone();
            if let Err(e) = connection.del::<_, ()>(key).await {
                warn!(key, error = %e, "Redis DEL failed");
            }
        }
    }
}

/// Derives cache keys from normalized URLs.
///
/// Keys look like `oidc_config:<version>:<sha256 hex>`. The version tag keeps
/// entries written under an older value shape from ever being read back.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    version: String,
}

impl CacheKeys {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn openid_config(&self, config_url: &str) -> String {
        format!("oidc_config:{}:{}", self.version, url_digest(config_url))
    }

    pub fn jwks(&self, jwks_uri: &str) -> String {
        format!("oidc_jwks:{}:{}", self.version, url_digest(jwks_uri))
    }

    /// Records which JWKS URI was last cached for a configuration URL, so the
    /// JWKS entry can be cleared after the configuration entry has expired.
    pub fn jwks_uri_pointer(&self, config_url: &str) -> String {
        format!("oidc_jwks_uri:{}:{}", self.version, url_digest(config_url))
    }

    /// Unversioned keys written by earlier releases.
    pub fn legacy_openid_config(config_url: &str) -> String {
        format!("oidc_config:{}", url_digest(config_url))
    }

    pub fn legacy_jwks(jwks_uri: &str) -> String {
        format!("oidc_jwks:{}", url_digest(jwks_uri))
    }

    /// Companion key holding the recent-failure marker for `key`.
    pub fn failure(key: &str) -> String {
        format!("{}:fetch_failed", key)
    }
}

fn url_digest(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}
