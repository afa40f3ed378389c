use crate::dto::{AuthorDto, LevelsDto, PostDto, SummaryDto, TokenResponse, UserDto};
use async_trait::async_trait;
use pulse::auth::{AuthError, Authenticator, Session};
use pulse::domain::{
    Article, AuthorAnalytics, MembershipLevel, Period, PrefetchContext, SiteMetrics, UserProfile,
};
use pulse::ports::AnalyticsSource;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{Error, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// JWT token routes, tried in order until one exists
pub const TOKEN_ENDPOINTS: [&str; 3] = [
    "/wp-json/jwt-auth/v1/token",
    "/?rest_route=/jwt-auth/v1/token",
    "/wp-json/simple-jwt-login/v1/auth",
];

const CURRENT_USER_PATH: &str = "/wp-json/wp/v2/users/me";
const ARTICLES_PER_PAGE: &str = "20";

#[derive(Clone)]
pub struct WpClient {
    client: Client,
    base_url: String,
}

impl WpClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        read_json(check_status(response)?).await
    }

    async fn request_token(&self, username: &str, password: &str) -> std::result::Result<String, AuthError> {
        let payload = serde_json::json!({
            "username": username,
            "password": password,
        });

        for path in TOKEN_ENDPOINTS {
            let response = self
                .client
                .post(self.url(path))
                .json(&payload)
                .send()
                .await
                .map_err(transport_error)?;

            match response.status() {
                status if status.is_success() => {
                    let body: TokenResponse = read_json(response).await?;
                    match body.into_token() {
                        Some(token) => {
                            debug!("Obtained token from {}", path);
                            return Ok(token);
                        }
                        None => warn!("Token endpoint {} answered without a token", path),
                    }
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    warn!("Login rejected for user: {}", username);
                    return Err(AuthError::InvalidCredentials);
                }
                StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED => {
                    debug!("No token endpoint at {}", path);
                }
                status => return Err(AuthError::Remote(Error::Status(status.as_u16()))),
            }
        }

        Err(AuthError::NoAuthEndpoint)
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Network(e.to_string())
    }
}

fn check_status(response: Response) -> Result<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::Unauthorized),
        status => Err(Error::Status(status.as_u16())),
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&body).map_err(|e| Error::InvalidResponse(e.to_string()))
}

#[async_trait]
impl Authenticator for WpClient {
    async fn login(&self, username: &str, password: &str) -> std::result::Result<Session, AuthError> {
        let token = self.request_token(username, password).await?;

        let user: UserDto = self
            .get_json(&token, CURRENT_USER_PATH, &[("context", "edit".to_string())])
            .await
            .map_err(|e| match e {
                Error::Unauthorized => AuthError::Unauthorized,
                other => AuthError::Remote(other),
            })?;

        info!("Authenticated {} against {}", user.name, self.base_url);
        let profile = UserProfile::from(user);
        Ok(Session {
            token,
            user_id: profile.id,
            name: profile.name,
            email: profile.email,
            roles: profile.roles,
        })
    }
}

#[async_trait]
impl AnalyticsSource for WpClient {
    async fn site_metrics(&self, ctx: &PrefetchContext, period: Period) -> Result<SiteMetrics> {
        let mut query = vec![("ago", period.days().to_string())];
        if let Some(site_id) = &ctx.site_id {
            query.push(("site", site_id.clone()));
        }

        let summary: SummaryDto = self
            .get_json(&ctx.token, "/wp-json/wp-statistics/v2/summary", &query)
            .await?;
        Ok(summary.into_metrics(period))
    }

    async fn author_analytics(
        &self,
        ctx: &PrefetchContext,
        user_id: &str,
        period: Period,
    ) -> Result<AuthorAnalytics> {
        let query = [
            ("author_id", user_id.to_string()),
            ("ago", period.days().to_string()),
        ];

        let author: AuthorDto = self
            .get_json(&ctx.token, "/wp-json/wp-statistics/v2/author", &query)
            .await?;
        Ok(author.into_analytics(user_id, period))
    }

    async fn author_articles(&self, ctx: &PrefetchContext, user_id: &str) -> Result<Vec<Article>> {
        let query = [
            ("author", user_id.to_string()),
            ("per_page", ARTICLES_PER_PAGE.to_string()),
        ];

        let posts: Vec<PostDto> = self
            .get_json(&ctx.token, "/wp-json/wp/v2/posts", &query)
            .await?;
        Ok(posts.into_iter().map(Article::from).collect())
    }

    async fn membership_levels(&self, ctx: &PrefetchContext) -> Result<Vec<MembershipLevel>> {
        let levels: LevelsDto = self
            .get_json(&ctx.token, "/wp-json/pmpro/v1/membership_levels", &[])
            .await?;
        Ok(levels.into_levels())
    }

    async fn user_profile(&self, ctx: &PrefetchContext, user_id: &str) -> Result<UserProfile> {
        let path = format!("/wp-json/wp/v2/users/{}", user_id);
        let user: UserDto = self
            .get_json(&ctx.token, &path, &[("context", "edit".to_string())])
            .await?;
        Ok(user.into())
    }
}

impl std::fmt::Debug for WpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WpClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
