//! Redis cache backend.
//!
//! A thin wrapper over a shared Redis instance using its native TTL
//! primitives: `PX` for expiring writes, `KEEPTTL` for TTL-preserving
//! overwrites, `NX` for set-if-not-exists and `PERSIST` for TTL removal.
//! Every handle prepends its instance name to keys so multiple stores can
//! share one database.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::{Cache, CacheError, Ttl};

pub struct RedisCache {
    prefix: String,
    manager: ConnectionManager,
}

impl RedisCache {
    #[must_use]
    pub fn new(name: &str, manager: ConnectionManager) -> Self {
        RedisCache {
            prefix: format!("{name}:"),
            manager,
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn apply_ttl(cmd: &mut redis::Cmd, ttl: Ttl) {
        match ttl {
            Ttl::Expires(duration) => {
                cmd.arg("PX").arg(duration.as_millis() as u64);
            }
            Ttl::Keep => {
                cmd.arg("KEEPTTL");
            }
            Ttl::Forever => {}
        }
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let key = self.key(key);
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Ttl) -> Result<(), CacheError> {
        let key = self.key(key);
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(value);
        Self::apply_ttl(&mut cmd, ttl);
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_if_not_exists(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Ttl,
    ) -> Result<bool, CacheError> {
        let key = self.key(key);
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg(value).arg("NX");
        Self::apply_ttl(&mut cmd, ttl);
        // SET … NX answers OK when stored, nil when the key already exists.
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let key = self.key(key);
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn persist(&self, key: &str) -> Result<(), CacheError> {
        let key = self.key(key);
        let mut conn = self.manager.clone();
        // Answers 1 when a TTL was removed, 0 when the key is missing or
        // already persistent; both are fine for an idempotent share call.
        let _: i64 = redis::cmd("PERSIST")
            .arg(&key)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
