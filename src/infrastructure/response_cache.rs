//! Response Cache Selection
//!
//! Builds the configured response cache. An unreachable Redis server is
//! not fatal: the service starts with the in-process cache instead.

use crate::adapters::outbound::{DashMapResponseCache, RedisResponseCache};
use crate::config::CacheBackend;
use crate::domain::ports::ResponseCache;
use crate::infrastructure::shutdown::ShutdownController;
use std::sync::Arc;
use std::time::Duration;

/// Open the cache for `backend`. The in-process cache's GC task ends when
/// `shutdown` fires.
pub async fn open_response_cache(
    backend: CacheBackend,
    redis_url: &str,
    ttl: Duration,
    shutdown: &ShutdownController,
) -> Option<Arc<dyn ResponseCache>> {
    match backend {
        CacheBackend::None => {
            tracing::info!("response caching disabled");
            None
        }
        CacheBackend::Memory => Some(memory_cache(ttl, shutdown)),
        CacheBackend::Redis => match RedisResponseCache::connect(redis_url, ttl).await {
            Ok(cache) => {
                tracing::info!("caching responses in redis for {:?}", ttl);
                Some(Arc::new(cache))
            }
            Err(e) => {
                tracing::warn!(
                    "redis cache at {} unavailable, falling back to in-process cache: {}",
                    redis_url,
                    e
                );
                Some(memory_cache(ttl, shutdown))
            }
        },
    }
}

fn memory_cache(ttl: Duration, shutdown: &ShutdownController) -> Arc<dyn ResponseCache> {
    let cache = DashMapResponseCache::new(ttl);
    let shutdown = shutdown.clone();
    cache.start_gc(ttl.max(Duration::from_secs(1)), async move {
        shutdown.wait().await
    });
    tracing::info!("caching responses in memory for {:?}", ttl);
    Arc::new(cache)
}
