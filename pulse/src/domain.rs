use serde::{Deserialize, Serialize};
use std::fmt;

/// Site id used in cache keys when the context does not name one
pub const DEFAULT_SITE_ID: &str = "default";

/// Time-range bucket for traffic and author metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Day, Period::Week, Period::Month, Period::Quarter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
            Period::Quarter => "90d",
        }
    }

    /// Number of days looked back by the upstream statistics endpoints
    pub fn days(&self) -> u32 {
        match self {
            Period::Day => 1,
            Period::Week => 7,
            Period::Month => 30,
            Period::Quarter => 90,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Period {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "24h" => Ok(Period::Day),
            "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            "90d" => Ok(Period::Quarter),
            _ => Err("Invalid period value"),
        }
    }
}

/// Domain part of a cache key; the store adds the namespace prefix
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    SiteMetrics { site_id: String, period: Period },
    AuthorAnalytics { user_id: String, period: Period },
    AuthorArticles { user_id: String },
    MembershipLevels,
    UserProfile { user_id: String },
}

impl CacheKey {
    pub fn site_metrics(site_id: Option<&str>, period: Period) -> Self {
        CacheKey::SiteMetrics {
            site_id: site_id.unwrap_or(DEFAULT_SITE_ID).to_string(),
            period,
        }
    }

    pub fn author_analytics(user_id: impl Into<String>, period: Period) -> Self {
        CacheKey::AuthorAnalytics {
            user_id: user_id.into(),
            period,
        }
    }

    pub fn author_articles(user_id: impl Into<String>) -> Self {
        CacheKey::AuthorArticles {
            user_id: user_id.into(),
        }
    }

    pub fn user_profile(user_id: impl Into<String>) -> Self {
        CacheKey::UserProfile {
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::SiteMetrics { site_id, period } => {
                write!(f, "site-metrics:{site_id}:{period}")
            }
            CacheKey::AuthorAnalytics { user_id, period } => {
                write!(f, "author-analytics:{user_id}:{period}")
            }
            CacheKey::AuthorArticles { user_id } => write!(f, "author-articles:{user_id}"),
            CacheKey::MembershipLevels => f.write_str("membership-levels"),
            CacheKey::UserProfile { user_id } => write!(f, "user-profile:{user_id}"),
        }
    }
}

/// Identity a prefetch runs under, supplied by the authenticated session
#[derive(Clone, PartialEq, Eq)]
pub struct PrefetchContext {
    pub user_id: String,
    pub token: String,
    pub site_id: Option<String>,
}

impl PrefetchContext {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
            site_id: None,
        }
    }

    pub fn with_site(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    /// A context without a user or a token cannot drive any request
    pub fn is_empty(&self) -> bool {
        self.user_id.trim().is_empty() || self.token.trim().is_empty()
    }
}

// Keep the bearer token out of logs
impl fmt::Debug for PrefetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchContext")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .field("site_id", &self.site_id)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Referrer {
    pub domain: String,
    pub visits: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyTraffic {
    pub date: String,
    pub visitors: u64,
    pub visits: u64,
}

/// Site-wide traffic for one period
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SiteMetrics {
    pub period: Period,
    pub visitors: u64,
    pub visits: u64,
    #[serde(default)]
    pub online: u64,
    #[serde(default)]
    pub daily: Vec<DailyTraffic>,
    #[serde(default)]
    pub top_referrers: Vec<Referrer>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArticleStats {
    pub post_id: u64,
    pub title: String,
    pub views: u64,
}

/// Per-author traffic for one period
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorAnalytics {
    pub user_id: String,
    pub period: Period,
    pub views: u64,
    pub visitors: u64,
    #[serde(default)]
    pub top_articles: Vec<ArticleStats>,
}

impl AuthorAnalytics {
    /// Best performing articles first, ties broken by title
    pub fn ranked_articles(&self) -> Vec<&ArticleStats> {
        let mut ranked: Vec<&ArticleStats> = self.top_articles.iter().collect();
        ranked.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.title.cmp(&b.title)));
        ranked
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: u64,
    pub title: String,
    pub link: String,
    pub date: String,
    pub status: String,
}

/// Subscription tier exposed by the membership plugin
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MembershipLevel {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub initial_payment: f64,
    pub billing_amount: f64,
    pub cycle_number: u32,
    pub cycle_period: String,
    #[serde(default)]
    pub members: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub registered_date: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}
