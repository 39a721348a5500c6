//! GeoIP Service - Query facade
//!
//! Validates the subject address, consults the response cache and falls
//! back to the live database on a miss.

use crate::application::live_database::LiveDatabase;
use crate::domain::entities::{CacheKey, QueryKind, QueryResult};
use crate::domain::errors::LookupError;
use crate::domain::ports::ResponseCache;
use std::net::IpAddr;
use std::sync::Arc;

/// A lookup result and whether it came from the cache.
///
/// `cache_hit` is for observability only.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResponse {
    pub result: QueryResult,
    pub cache_hit: bool,
}

pub struct GeoIpService {
    live: Arc<LiveDatabase>,
    cache: Option<Arc<dyn ResponseCache>>,
}

impl GeoIpService {
    /// Create the facade. `cache` is optional; without one every lookup
    /// goes to the database.
    pub fn new(live: Arc<LiveDatabase>, cache: Option<Arc<dyn ResponseCache>>) -> Self {
        Self { live, cache }
    }

    pub fn live(&self) -> &Arc<LiveDatabase> {
        &self.live
    }

    /// Pick the address to look up: the explicit subject if given and
    /// non-empty, otherwise the caller's observed address.
    pub fn resolve_subject(
        subject: Option<&str>,
        caller: Option<IpAddr>,
    ) -> Result<IpAddr, LookupError> {
        match subject.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s
                .parse()
                .map_err(|_| LookupError::BadInput(s.to_string())),
            None => caller.ok_or_else(|| LookupError::BadInput(String::new())),
        }
    }

    /// Look up `subject` (or the caller's address) for the given kind.
    pub async fn lookup(
        &self,
        kind: QueryKind,
        subject: Option<&str>,
        caller: Option<IpAddr>,
    ) -> Result<LookupResponse, LookupError> {
        let ip = Self::resolve_subject(subject, caller)?;
        let key = CacheKey::new(kind, ip.to_string());

        if let Some(result) = self.cached(&key).await {
            return Ok(LookupResponse {
                result,
                cache_hit: true,
            });
        }

        let result = self.live.query(kind, ip)?;
        self.store(&key, &result).await;
        Ok(LookupResponse {
            result,
            cache_hit: false,
        })
    }

    async fn cached(&self, key: &CacheKey) -> Option<QueryResult> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(data)) => match QueryResult::from_json(key.kind, &data) {
                Ok(result) => {
                    tracing::debug!("cache hit: {}", key);
                    Some(result)
                }
                Err(e) => {
                    tracing::warn!("discarding undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => {
                tracing::debug!("cache miss: {}", key);
                None
            }
            Err(e) => {
                tracing::warn!("cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn store(&self, key: &CacheKey, result: &QueryResult) {
        let Some(cache) = &self.cache else {
            return;
        };
        let data = match serde_json::to_vec(result) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("failed to serialize {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = cache.set(key, data).await {
            tracing::warn!("cache write failed for {}: {}", key, e);
        }
    }
}
