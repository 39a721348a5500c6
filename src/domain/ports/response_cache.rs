//! Response Cache Port
//!
//! Defines the interface of the short-lived cache in front of lookups.

use crate::domain::entities::CacheKey;
use crate::domain::errors::CacheError;
use async_trait::async_trait;

/// Advisory cache of serialized lookup results.
///
/// Entries expire after a fixed TTL owned by the implementation; an expired
/// entry reads as absent. Callers treat every error as a miss.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Read a cached value, `None` on miss or expiry.
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value for the cache's TTL.
    async fn set(&self, key: &CacheKey, value: Vec<u8>) -> Result<(), CacheError>;
}
