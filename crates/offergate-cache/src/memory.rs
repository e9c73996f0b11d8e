//! In-process cache backend.
//!
//! A mutex-guarded map with lazy expiry on read plus a periodic sweep task
//! (every 30 s) that deletes expired entries, so abandoned cursor chains do
//! not accumulate for the lifetime of the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{Cache, CacheError, Ttl};

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    /// `None` means the entry never expires.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

pub struct MemoryCache {
    data: Arc<Mutex<HashMap<String, Entry>>>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl MemoryCache {
    /// Creates a cache and starts its background sweep task. `name` only
    /// labels log output; memory handles are independent maps.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let data: Arc<Mutex<HashMap<String, Entry>>> = Arc::new(Mutex::new(HashMap::new()));

        let sweep_data = Arc::clone(&data);
        let cache_name = name.to_string();
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let mut data = sweep_data.lock().expect("cache mutex poisoned");
                let before = data.len();
                data.retain(|_, entry| !entry.is_expired(now));
                let swept = before - data.len();
                if swept > 0 {
                    tracing::debug!(cache = %cache_name, swept, "removed expired cache entries");
                }
            }
        });

        MemoryCache { data, sweeper }
    }

    fn deadline(ttl: Ttl, previous: Option<Option<Instant>>) -> Option<Instant> {
        match ttl {
            Ttl::Expires(duration) => Some(Instant::now() + duration),
            Ttl::Forever => None,
            // Keep the existing deadline; a missing key gets no deadline.
            Ttl::Keep => previous.flatten(),
        }
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut data = self.data.lock().expect("cache mutex poisoned");
        match data.get(key) {
            None => Ok(None),
            Some(entry) if entry.is_expired(Instant::now()) => {
                data.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError> {
        let mut data = self.data.lock().expect("cache mutex poisoned");
        let previous = data.get(key).map(|entry| entry.expires_at);
        let expires_at = Self::deadline(ttl, previous);
        data.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn set_if_not_exists(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Ttl,
    ) -> Result<bool, CacheError> {
        let mut data = self.data.lock().expect("cache mutex poisoned");
        // An expired-but-unswept entry counts as absent.
        if let Some(entry) = data.get(key) {
            if !entry.is_expired(Instant::now()) {
                return Ok(false);
            }
        }
        let expires_at = Self::deadline(ttl, None);
        data.insert(key.to_string(), Entry { value, expires_at });
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.data
            .lock()
            .expect("cache mutex poisoned")
            .remove(key);
        Ok(())
    }

    async fn persist(&self, key: &str) -> Result<(), CacheError> {
        let mut data = self.data.lock().expect("cache mutex poisoned");
        if let Some(entry) = data.get_mut(key) {
            entry.expires_at = None;
        }
        Ok(())
    }
}
