//! Wire shapes of the WordPress plugins, mapped into domain models.

use pulse::domain::{
    Article, ArticleStats, AuthorAnalytics, DailyTraffic, MembershipLevel, Period, Referrer,
    SiteMetrics, UserProfile,
};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Plugins disagree on whether numbers are sent as numbers or strings
#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Number {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            Number::Int(n) => Ok(n),
            Number::Float(f) if f >= 0.0 => Ok(f as u64),
            Number::Float(f) => Err(E::custom(format!("negative count {}", f))),
            Number::Text(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Number::deserialize(deserializer)?.into_u64()
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Option::<Number>::deserialize(deserializer)?
        .map(Number::into_u64)
        .transpose()
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Number::deserialize(deserializer)? {
        Number::Int(n) => Ok(n as f64),
        Number::Float(f) => Ok(f),
        Number::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Token endpoints answer in one of two layouts
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    #[serde(default)]
    jwt: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_token(self) -> Option<String> {
        self.token
            .or_else(|| self.data.and_then(|data| data.jwt.or(data.token)))
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserDto {
    #[serde(deserialize_with = "lenient_u64")]
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub registered_date: Option<String>,
    #[serde(default)]
    pub avatar_urls: BTreeMap<String, String>,
}

impl From<UserDto> for UserProfile {
    fn from(user: UserDto) -> Self {
        // Largest avatar wins
        let avatar_url = user
            .avatar_urls
            .iter()
            .max_by_key(|(size, _)| size.parse::<u32>().unwrap_or(0))
            .map(|(_, url)| url.clone());

        UserProfile {
            id: user.id.to_string(),
            name: user.name,
            email: user.email,
            roles: user.roles,
            registered_date: user.registered_date,
            avatar_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DailyDto {
    date: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    visitors: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    visits: u64,
}

#[derive(Debug, Deserialize)]
struct ReferrerDto {
    domain: String,
    #[serde(alias = "number", deserialize_with = "lenient_u64")]
    visits: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SummaryDto {
    #[serde(deserialize_with = "lenient_u64")]
    visitors: u64,
    #[serde(deserialize_with = "lenient_u64")]
    visits: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    online: u64,
    #[serde(default)]
    daily: Vec<DailyDto>,
    #[serde(default)]
    referrers: Vec<ReferrerDto>,
}

impl SummaryDto {
    pub(crate) fn into_metrics(self, period: Period) -> SiteMetrics {
        SiteMetrics {
            period,
            visitors: self.visitors,
            visits: self.visits,
            online: self.online,
            daily: self
                .daily
                .into_iter()
                .map(|day| DailyTraffic {
                    date: day.date,
                    visitors: day.visitors,
                    visits: day.visits,
                })
                .collect(),
            top_referrers: self
                .referrers
                .into_iter()
                .map(|r| Referrer {
                    domain: r.domain,
                    visits: r.visits,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthorPostDto {
    #[serde(deserialize_with = "lenient_u64")]
    id: u64,
    title: String,
    #[serde(deserialize_with = "lenient_u64")]
    views: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthorDto {
    #[serde(deserialize_with = "lenient_u64")]
    views: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    visitors: u64,
    #[serde(default)]
    posts: Vec<AuthorPostDto>,
}

impl AuthorDto {
    pub(crate) fn into_analytics(self, user_id: &str, period: Period) -> AuthorAnalytics {
        AuthorAnalytics {
            user_id: user_id.to_string(),
            period,
            views: self.views,
            visitors: self.visitors,
            top_articles: self
                .posts
                .into_iter()
                .map(|post| ArticleStats {
                    post_id: post.id,
                    title: post.title,
                    views: post.views,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Rendered {
    rendered: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostDto {
    id: u64,
    title: Rendered,
    #[serde(default)]
    link: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    status: String,
}

impl From<PostDto> for Article {
    fn from(post: PostDto) -> Self {
        Article {
            id: post.id,
            title: post.title.rendered,
            link: post.link,
            date: post.date,
            status: post.status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LevelDto {
    #[serde(deserialize_with = "lenient_u64")]
    id: u64,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    initial_payment: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    billing_amount: f64,
    #[serde(default, deserialize_with = "lenient_u64")]
    cycle_number: u64,
    #[serde(default)]
    cycle_period: String,
    #[serde(default, alias = "member_count", deserialize_with = "lenient_opt_u64")]
    members: Option<u64>,
}

/// Levels arrive either as a list or as an object keyed by level id
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum LevelsDto {
    List(Vec<LevelDto>),
    Keyed(BTreeMap<String, LevelDto>),
}

impl LevelsDto {
    pub(crate) fn into_levels(self) -> Vec<MembershipLevel> {
        let mut levels: Vec<LevelDto> = match self {
            LevelsDto::List(levels) => levels,
            LevelsDto::Keyed(levels) => levels.into_values().collect(),
        };
        levels.sort_by_key(|level| level.id);

        levels
            .into_iter()
            .map(|level| MembershipLevel {
                id: level.id,
                name: level.name,
                description: level.description,
                initial_payment: level.initial_payment,
                billing_amount: level.billing_amount,
                cycle_number: u32::try_from(level.cycle_number).unwrap_or(u32::MAX),
                cycle_period: level.cycle_period,
                members: level.members,
            })
            .collect()
    }
}
