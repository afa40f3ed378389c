//! In-crate doubles for the storage and upstream ports.

use crate::domain::{
    Article, AuthorAnalytics, MembershipLevel, Period, PrefetchContext, SiteMetrics, UserProfile,
};
use crate::ports::{AnalyticsSource, KeyValueStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

/// Store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::Storage("disk unavailable".to_string()))
    }

    async fn set(&self, _key: &str, _value: String) -> Result<()> {
        Err(Error::Storage("disk unavailable".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<bool> {
        Err(Error::Storage("disk unavailable".to_string()))
    }
}

/// Analytics source that counts calls and can be told to fail or stall
#[derive(Default)]
pub struct StubSource {
    pub calls: AtomicUsize,
    pub fail_site_metrics: AtomicBool,
    pub fail_all: AtomicBool,
    pub delay_ms: AtomicUsize,
    pub visitors: AtomicUsize,
}

impl StubSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyticsSource for StubSource {
    async fn site_metrics(&self, _ctx: &PrefetchContext, period: Period) -> Result<SiteMetrics> {
        self.enter().await?;
        if self.fail_site_metrics.load(Ordering::SeqCst) {
            return Err(Error::Status(500));
        }
        Ok(SiteMetrics {
            period,
            visitors: self.visitors.load(Ordering::SeqCst) as u64,
            visits: 10,
            online: 1,
            daily: Vec::new(),
            top_referrers: Vec::new(),
        })
    }

    async fn author_analytics(
        &self,
        _ctx: &PrefetchContext,
        user_id: &str,
        period: Period,
    ) -> Result<AuthorAnalytics> {
        self.enter().await?;
        Ok(AuthorAnalytics {
            user_id: user_id.to_string(),
            period,
            views: 5,
            visitors: 3,
            top_articles: Vec::new(),
        })
    }

    async fn author_articles(&self, _ctx: &PrefetchContext, _user_id: &str) -> Result<Vec<Article>> {
        self.enter().await?;
        Ok(vec![Article {
            id: 1,
            title: "Hello".to_string(),
            link: "https://example.com/hello".to_string(),
            date: "2024-01-01T00:00:00".to_string(),
            status: "publish".to_string(),
        }])
    }

    async fn membership_levels(&self, _ctx: &PrefetchContext) -> Result<Vec<MembershipLevel>> {
        self.enter().await?;
        Ok(vec![MembershipLevel {
            id: 1,
            name: "Gold".to_string(),
            description: String::new(),
            initial_payment: 10.0,
            billing_amount: 10.0,
            cycle_number: 1,
            cycle_period: "Month".to_string(),
            members: Some(3),
        }])
    }

    async fn user_profile(&self, _ctx: &PrefetchContext, user_id: &str) -> Result<UserProfile> {
        self.enter().await?;
        Ok(UserProfile {
            id: user_id.to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            roles: vec!["author".to_string()],
            registered_date: None,
            avatar_url: None,
        })
    }
}
