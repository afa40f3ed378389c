use super::error::CacheError;
use crate::clock::Clock;
use crate::domain::CacheKey;
use crate::ports::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::TtlMs;
use std::sync::Arc;
use tracing::warn;

/// Envelope persisted under every cache key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: u64,
}

/// Result of a cache read, classified against a TTL at read time
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Fresh { data: T, timestamp: u64 },
    /// Past its TTL but still served
    Stale { data: T, timestamp: u64 },
    Missing,
}

impl<T> CacheLookup<T> {
    pub fn exists(&self) -> bool {
        !matches!(self, CacheLookup::Missing)
    }

    /// `Missing` counts as expired
    pub fn is_expired(&self) -> bool {
        !matches!(self, CacheLookup::Fresh { .. })
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheLookup::Fresh { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            CacheLookup::Fresh { data, .. } | CacheLookup::Stale { data, .. } => Some(data),
            CacheLookup::Missing => None,
        }
    }

    pub fn timestamp(&self) -> Option<u64> {
        match self {
            CacheLookup::Fresh { timestamp, .. } | CacheLookup::Stale { timestamp, .. } => {
                Some(*timestamp)
            }
            CacheLookup::Missing => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            CacheLookup::Fresh { data, .. } | CacheLookup::Stale { data, .. } => Some(data),
            CacheLookup::Missing => None,
        }
    }
}

/// Namespaced TTL cache over a [`KeyValueStore`]
///
/// The `try_*` methods report failures; `get`, `put` and `clear` fail open:
/// read errors become [`CacheLookup::Missing`] and write errors are logged.
#[derive(Clone)]
pub struct CacheStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    namespace: String,
}

impl CacheStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_namespace(store, clock, crate::namespaces::CACHE)
    }

    pub fn with_namespace(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            clock,
            namespace: namespace.into(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Full storage key for a domain key
    pub fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}:{}", self.namespace, key)
    }

    pub async fn try_get<T: DeserializeOwned>(
        &self,
        key: &CacheKey,
        ttl: TtlMs,
    ) -> Result<CacheLookup<T>, CacheError> {
        let Some(raw) = self.store.get(&self.storage_key(key)).await? else {
            return Ok(CacheLookup::Missing);
        };

        let entry: CacheEntry<T> = serde_json::from_str(&raw)?;
        let age = self.clock.now_ms().saturating_sub(entry.timestamp);

        if age > ttl.as_millis() {
            Ok(CacheLookup::Stale {
                data: entry.data,
                timestamp: entry.timestamp,
            })
        } else {
            Ok(CacheLookup::Fresh {
                data: entry.data,
                timestamp: entry.timestamp,
            })
        }
    }

    pub async fn try_put<T: Serialize>(&self, key: &CacheKey, data: &T) -> Result<(), CacheError> {
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now_ms(),
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.set(&self.storage_key(key), raw).await?;
        Ok(())
    }

    pub async fn try_clear(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.store.remove(&self.storage_key(key)).await?)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey, ttl: TtlMs) -> CacheLookup<T> {
        match self.try_get(key, ttl).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!("Cache read for '{}' failed, treating as miss: {}", key, e);
                CacheLookup::Missing
            }
        }
    }

    pub async fn put<T: Serialize>(&self, key: &CacheKey, data: &T) {
        if let Err(e) = self.try_put(key, data).await {
            warn!("Cache write for '{}' failed: {}", key, e);
        }
    }

    pub async fn clear(&self, key: &CacheKey) {
        if let Err(e) = self.try_clear(key).await {
            warn!("Cache clear for '{}' failed: {}", key, e);
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("namespace", &self.namespace)
            .finish()
    }
}
