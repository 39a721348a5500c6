//! Redis Response Cache
//!
//! Implements ResponseCache on a shared Redis instance so that every
//! replica of the service sees the same cached answers. Entries are
//! written with `SET key value EX ttl`; Redis handles expiry.

use crate::domain::entities::CacheKey;
use crate::domain::errors::CacheError;
use crate::domain::ports::ResponseCache;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::time::Duration;

pub struct RedisResponseCache {
    conn: MultiplexedConnection,
    ttl: Duration,
}

fn backend_error(e: redis::RedisError) -> CacheError {
    CacheError::Backend(e.to_string())
}

impl RedisResponseCache {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`) and verify the
    /// server answers a PING.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(backend_error)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend_error)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(backend_error)?;

        tracing::info!("connected to redis response cache at {}", url);
        Ok(Self { conn, ttl })
    }
}

/// Redis rejects `EX 0`.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl ResponseCache for RedisResponseCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key.to_string())
            .query_async(&mut conn)
            .await
            .map_err(backend_error)
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key.to_string())
            .arg(value)
            .arg("EX")
            .arg(expiry_secs(self.ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}
