//! Screen-level data loading: cache first, network when needed, and the
//! cached value as a fallback when the network fails.

use crate::cache::{CacheLookup, CacheStore};
use crate::domain::{
    Article, AuthorAnalytics, CacheKey, MembershipLevel, Period, PrefetchContext, SiteMetrics,
    UserProfile,
};
use crate::ports::AnalyticsSource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::{Error, Result, TtlMs};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadMode {
    /// Fresh cache wins, otherwise fetch
    #[default]
    CacheFirst,
    /// Always fetch (pull-to-refresh)
    Refresh,
    /// Never fetch; used to re-read after a background prefetch
    CacheOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Loaded<T> {
    pub data: T,
    pub freshness: Freshness,
    /// When the data was written to the cache
    pub fetched_at: u64,
}

#[derive(Clone)]
pub struct ScreenLoader {
    cache: CacheStore,
    source: Arc<dyn AnalyticsSource>,
    ttl: TtlMs,
}

impl ScreenLoader {
    pub fn new(cache: CacheStore, source: Arc<dyn AnalyticsSource>) -> Self {
        Self {
            cache,
            source,
            ttl: crate::CACHE_TTL,
        }
    }

    pub async fn load<T, F, Fut>(&self, key: &CacheKey, mode: LoadMode, fetch: F) -> Result<Loaded<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cached: CacheLookup<T> = self.cache.get(key, self.ttl).await;

        match (mode, cached) {
            (LoadMode::CacheFirst | LoadMode::CacheOnly, CacheLookup::Fresh { data, timestamp }) => {
                Ok(Loaded {
                    data,
                    freshness: Freshness::Fresh,
                    fetched_at: timestamp,
                })
            }
            (LoadMode::CacheOnly, CacheLookup::Stale { data, timestamp }) => Ok(Loaded {
                data,
                freshness: Freshness::Stale,
                fetched_at: timestamp,
            }),
            (LoadMode::CacheOnly, CacheLookup::Missing) => Err(Error::NotFound),
            (_, cached) => match fetch().await {
                Ok(data) => {
                    self.cache.put(key, &data).await;
                    debug!("Loaded '{}' from the network", key);
                    Ok(Loaded {
                        data,
                        freshness: Freshness::Fresh,
                        fetched_at: self.cache.now_ms(),
                    })
                }
                Err(e) => match cached {
                    CacheLookup::Fresh { data, timestamp } | CacheLookup::Stale { data, timestamp } => {
                        warn!("Refresh of '{}' failed, serving cached data: {}", key, e);
                        Ok(Loaded {
                            data,
                            freshness: Freshness::Stale,
                            fetched_at: timestamp,
                        })
                    }
                    CacheLookup::Missing => Err(e),
                },
            },
        }
    }

    pub async fn site_metrics(
        &self,
        ctx: &PrefetchContext,
        period: Period,
        mode: LoadMode,
    ) -> Result<Loaded<SiteMetrics>> {
        let key = CacheKey::site_metrics(ctx.site_id.as_deref(), period);
        self.load(&key, mode, || self.source.site_metrics(ctx, period))
            .await
    }

    pub async fn author_analytics(
        &self,
        ctx: &PrefetchContext,
        user_id: &str,
        period: Period,
        mode: LoadMode,
    ) -> Result<Loaded<AuthorAnalytics>> {
        let key = CacheKey::author_analytics(user_id, period);
        self.load(&key, mode, || self.source.author_analytics(ctx, user_id, period))
            .await
    }

    pub async fn author_articles(
        &self,
        ctx: &PrefetchContext,
        user_id: &str,
        mode: LoadMode,
    ) -> Result<Loaded<Vec<Article>>> {
        let key = CacheKey::author_articles(user_id);
        self.load(&key, mode, || self.source.author_articles(ctx, user_id))
            .await
    }

    pub async fn membership_levels(
        &self,
        ctx: &PrefetchContext,
        mode: LoadMode,
    ) -> Result<Loaded<Vec<MembershipLevel>>> {
        self.load(&CacheKey::MembershipLevels, mode, || {
            self.source.membership_levels(ctx)
        })
        .await
    }

    pub async fn user_profile(
        &self,
        ctx: &PrefetchContext,
        user_id: &str,
        mode: LoadMode,
    ) -> Result<Loaded<UserProfile>> {
        let key = CacheKey::user_profile(user_id);
        self.load(&key, mode, || self.source.user_profile(ctx, user_id))
            .await
    }
}
