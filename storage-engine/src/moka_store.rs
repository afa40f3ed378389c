use async_trait::async_trait;
use moka::future::Cache;
use pulse::ports::KeyValueStore;
use shared::Result;
use std::fmt::Debug;

/// Moka-backed key-value store, unbounded
///
/// Holds everything in memory, so sessions and cached payloads are lost on
/// restart. Used when the on-disk store cannot be opened, and in tests.
/// Entries never expire here; freshness is judged by the cache layer from
/// the stored timestamps.
#[derive(Clone)]
pub struct MokaKeyValueStore {
    cache: Cache<String, String>,
}

impl MokaKeyValueStore {
    /// Create a new unbounded store
    pub fn new_unbounded() -> Self {
        Self {
            cache: Cache::builder().name("pulse-kv").build(),
        }
    }
}

impl Default for MokaKeyValueStore {
    fn default() -> Self {
        Self::new_unbounded()
    }
}

#[async_trait]
impl KeyValueStore for MokaKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.cache.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.cache.remove(key).await.is_some())
    }
}

impl Debug for MokaKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaKeyValueStore")
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .finish()
    }
}
