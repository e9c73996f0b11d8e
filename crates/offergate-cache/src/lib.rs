//! Key/value cache abstraction backing the cursor queue and the adapters.
//!
//! Values are opaque bytes; serialization is the caller's concern (the
//! [`CacheExt`] helpers provide the JSON round-trip every current caller
//! uses). Two backends exist: an in-process map for single-replica and test
//! deployments, and a Redis wrapper for anything shared. Backends surface
//! transport and serialization errors to the caller and never retry locally.

mod memory;
mod redis_backend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use memory::MemoryCache;
pub use redis_backend::RedisCache;

/// Time-to-live policy for a cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Entry expires after the given duration.
    Expires(Duration),
    /// Entry never expires.
    Forever,
    /// Preserve whatever TTL the key currently has. Writing a missing key
    /// with `Keep` behaves like `Forever`, matching Redis `KEEPTTL`.
    Keep,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("serialization error for key {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("deserialization error for key {key}: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Byte-oriented key/value store with TTL support.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the stored bytes, or `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores `value` under `key`, overwriting any previous entry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError>;

    /// Stores `value` only when `key` is absent. Returns `true` when the
    /// write happened. Atomic with respect to concurrent writers.
    async fn set_if_not_exists(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Ttl,
    ) -> Result<bool, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Removes the TTL from an existing key so it no longer expires.
    async fn persist(&self, key: &str) -> Result<(), CacheError>;
}

/// JSON convenience layer over the byte-oriented [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, CacheError> {
        match self.get(key).await? {
            None => Ok(None),
            Some(bytes) => {
                let value =
                    serde_json::from_slice(&bytes).map_err(|e| CacheError::Deserialize {
                        key: key.to_string(),
                        source: e,
                    })?;
                Ok(Some(value))
            }
        }
    }

    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Ttl,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialize {
            key: key.to_string(),
            source: e,
        })?;
        self.set(key, bytes, ttl).await
    }

    async fn set_json_if_not_exists<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Ttl,
    ) -> Result<bool, CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialize {
            key: key.to_string(),
            source: e,
        })?;
        self.set_if_not_exists(key, bytes, ttl).await
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

/// Creates named cache handles over a shared backend.
///
/// Handle names become key prefixes so that e.g. the final-snapshot store
/// and the chained-queue store never collide even on one Redis database.
#[derive(Clone)]
pub enum CacheBackend {
    Memory,
    Redis(::redis::aio::ConnectionManager),
}

impl CacheBackend {
    /// Connects to Redis and verifies the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Redis` when the URL is invalid or the server
    /// does not respond; startup treats this as fatal.
    pub async fn redis(url: &str) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(CacheBackend::Redis(manager))
    }

    /// Creates a cache handle whose keys are prefixed with `name`.
    #[must_use]
    pub fn open(&self, name: &str) -> Arc<dyn Cache> {
        match self {
            CacheBackend::Memory => Arc::new(MemoryCache::new(name)),
            CacheBackend::Redis(manager) => Arc::new(RedisCache::new(name, manager.clone())),
        }
    }
}
