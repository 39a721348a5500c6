//! DashMap Response Cache
//!
//! Implements ResponseCache using DashMap for lock-free concurrent access.

use crate::domain::entities::CacheKey;
use crate::domain::errors::CacheError;
use crate::domain::ports::ResponseCache;
use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    written_at: Instant,
}

/// In-process response cache with a fixed TTL.
///
/// Expired entries read as absent and are purged lazily on read, or in bulk
/// by the background GC task.
pub struct DashMapResponseCache {
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl DashMapResponseCache {
    /// Create a new cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Start the background garbage collection task.
    ///
    /// The task runs until `stop` resolves or the handle is aborted.
    pub fn start_gc<S>(&self, interval: Duration, stop: S) -> JoinHandle<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let entries = self.entries.clone();
        let ttl = self.ttl;

        tokio::spawn(async move {
            tokio::pin!(stop);
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = tokio::time::sleep(interval) => {
                        let removed = purge_expired(&entries, ttl);
                        if removed > 0 {
                            tracing::debug!("response cache GC removed {} expired entries", removed);
                        }
                    }
                }
            }
            tracing::debug!("response cache GC stopped");
        })
    }

    /// Remove every expired entry, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        purge_expired(&self.entries, self.ttl)
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn purge_expired(entries: &DashMap<CacheKey, CacheEntry>, ttl: Duration) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.written_at.elapsed() < ttl);
    before.saturating_sub(entries.len())
}

#[async_trait]
impl ResponseCache for DashMapResponseCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.written_at.elapsed() < self.ttl => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => {}
        }
        self.entries
            .remove_if(key, |_, entry| entry.written_at.elapsed() >= self.ttl);
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>) -> Result<(), CacheError> {
        self.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                written_at: Instant::now(),
            },
        );
        Ok(())
    }
}
