use super::store::{CacheLookup, CacheStore};
use crate::domain::CacheKey;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::TtlMs;
use std::fmt::Display;
use std::future::Future;
use tracing::{debug, warn};

/// What a single fetch-and-cache step did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Cached entry was fresh, fetcher not invoked
    Fresh,
    /// Fetcher succeeded and the result was written
    Refreshed,
    /// Fetcher succeeded but the result was not accepted
    Rejected,
    /// Fetcher failed, cache untouched
    Failed,
}

/// Default acceptance predicate
pub fn accept_all<T>(_value: &T) -> bool {
    true
}

/// Refresh `key` through `fetch` unless the cached entry is still fresh.
///
/// Never fails: fetch errors are logged and leave the cache untouched.
pub async fn fetch_and_cache<T, E, F, Fut, A>(
    cache: &CacheStore,
    key: &CacheKey,
    ttl: TtlMs,
    fetch: F,
    accept: A,
) -> FetchOutcome
where
    T: Serialize + DeserializeOwned,
    E: Display,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    A: FnOnce(&T) -> bool,
{
    let lookup: CacheLookup<T> = cache.get(key, ttl).await;
    if lookup.is_fresh() {
        debug!("Cache entry '{}' is fresh, skipping fetch", key);
        return FetchOutcome::Fresh;
    }

    match fetch().await {
        Ok(value) => {
            if accept(&value) {
                cache.put(key, &value).await;
                debug!("Refreshed cache entry '{}'", key);
                FetchOutcome::Refreshed
            } else {
                debug!("Fetched value for '{}' was not accepted", key);
                FetchOutcome::Rejected
            }
        }
        Err(e) => {
            warn!(
                "Fetch for '{}' failed ({} cached value kept): {}",
                key,
                if lookup.exists() { "stale" } else { "no" },
                e
            );
            FetchOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::Period;
    use crate::testing::MemoryStore;
    use shared::Error;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: TtlMs = TtlMs(300_000);

    fn setup() -> (CacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let cache = CacheStore::new(Arc::new(MemoryStore::default()), clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn test_fresh_entry_skips_fetcher() {
        let (cache, _) = setup();
        let key = CacheKey::site_metrics(None, Period::Day);
        cache.put(&key, &1u32).await;

        let calls = AtomicUsize::new(0);
        let outcome = fetch_and_cache(
            &cache,
            &key,
            TTL,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, Error>(2)
            },
            accept_all,
        )
        .await;

        assert_eq!(outcome, FetchOutcome::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_entry_is_fetched_and_written() {
        let (cache, _) = setup();
        let key = CacheKey::author_articles("42");

        let calls = AtomicUsize::new(0);
        let outcome = fetch_and_cache(
            &cache,
            &key,
            TTL,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, Error>(9)
            },
            accept_all,
        )
        .await;

        assert_eq!(outcome, FetchOutcome::Refreshed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let lookup: CacheLookup<u32> = cache.get(&key, TTL).await;
        assert_eq!(lookup.data(), Some(&9));
    }

    #[tokio::test]
    async fn test_stale_entry_is_refetched() {
        let (cache, clock) = setup();
        let key = CacheKey::author_analytics("42", Period::Month);
        cache.put(&key, &1u32).await;
        clock.set(TTL.as_millis() + 1);

        let outcome = fetch_and_cache(&cache, &key, TTL, || async { Ok::<u32, Error>(2) }, accept_all)
            .await;

        assert_eq!(outcome, FetchOutcome::Refreshed);
        let lookup: CacheLookup<u32> = cache.get(&key, TTL).await;
        assert_eq!(
            lookup,
            CacheLookup::Fresh {
                data: 2,
                timestamp: TTL.as_millis() + 1
            }
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_prior_value() {
        let (cache, clock) = setup();
        let key = CacheKey::author_articles("42");
        cache.put(&key, &1u32).await;
        clock.set(TTL.as_millis() + 1);

        let outcome = fetch_and_cache(
            &cache,
            &key,
            TTL,
            || async { Err::<u32, Error>(Error::Timeout) },
            accept_all,
        )
        .await;

        assert_eq!(outcome, FetchOutcome::Failed);
        let lookup: CacheLookup<u32> = cache.get(&key, TTL).await;
        assert_eq!(lookup, CacheLookup::Stale { data: 1, timestamp: 0 });
    }

    #[tokio::test]
    async fn test_failed_fetch_without_cache_leaves_it_missing() {
        let (cache, _) = setup();
        let key = CacheKey::MembershipLevels;

        let outcome = fetch_and_cache(
            &cache,
            &key,
            TTL,
            || async { Err::<Vec<u32>, Error>(Error::Status(502)) },
            accept_all,
        )
        .await;

        assert_eq!(outcome, FetchOutcome::Failed);
        let lookup: CacheLookup<Vec<u32>> = cache.get(&key, TTL).await;
        assert!(!lookup.exists());
    }

    #[tokio::test]
    async fn test_rejected_value_is_not_written() {
        let (cache, _) = setup();
        let key = CacheKey::author_articles("42");

        let outcome = fetch_and_cache(
            &cache,
            &key,
            TTL,
            || async { Ok::<Vec<u32>, Error>(Vec::new()) },
            |articles: &Vec<u32>| !articles.is_empty(),
        )
        .await;

        assert_eq!(outcome, FetchOutcome::Rejected);
        let lookup: CacheLookup<Vec<u32>> = cache.get(&key, TTL).await;
        assert!(!lookup.exists());
    }
}
