use std::time::Duration;
use tracing::warn;

pub struct Config {
    pub wp_base_url: String,
    pub data_dir: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub site_id: Option<String>,
    pub request_timeout: Duration,
    pub language: Option<String>,
}

impl Config {
    const DEFAULT_WP_BASE_URL: &str = "http://localhost:8080";
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let request_timeout_secs = lookup("PULSE_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(Self::DEFAULT_REQUEST_TIMEOUT_SECS);

        let username = non_empty("PULSE_USERNAME");
        let password = non_empty("PULSE_PASSWORD");
        if username.is_some() && password.is_none() {
            warn!("PULSE_USERNAME is set but PULSE_PASSWORD is not, login will be skipped");
        }

        Self {
            wp_base_url: non_empty("PULSE_WP_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| Self::DEFAULT_WP_BASE_URL.to_string()),
            data_dir: non_empty("PULSE_DATA_DIR")
                .unwrap_or_else(|| Self::DEFAULT_DATA_DIR.to_string()),
            username,
            password,
            site_id: non_empty("PULSE_SITE_ID"),
            request_timeout: Duration::from_secs(request_timeout_secs),
            language: non_empty("PULSE_LANGUAGE"),
        }
    }

    /// Both halves of the login credentials, if configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        }
    }
}
