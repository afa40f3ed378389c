use crate::domain::{
    Article, AuthorAnalytics, MembershipLevel, Period, PrefetchContext, SiteMetrics, UserProfile,
};
use async_trait::async_trait;
use shared::Result;

// Ports are the pluggable extension points for storage backends and upstream data

/// Port for persistent string key-value storage (e.g., Sled)
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    /// Returns whether a value was present
    async fn remove(&self, key: &str) -> Result<bool>;
}

/// Port for the remote analytics backend
#[async_trait]
pub trait AnalyticsSource: Send + Sync + 'static {
    async fn site_metrics(&self, ctx: &PrefetchContext, period: Period) -> Result<SiteMetrics>;

    async fn author_analytics(
        &self,
        ctx: &PrefetchContext,
        user_id: &str,
        period: Period,
    ) -> Result<AuthorAnalytics>;

    async fn author_articles(&self, ctx: &PrefetchContext, user_id: &str) -> Result<Vec<Article>>;

    async fn membership_levels(&self, ctx: &PrefetchContext) -> Result<Vec<MembershipLevel>>;

    async fn user_profile(&self, ctx: &PrefetchContext, user_id: &str) -> Result<UserProfile>;
}
