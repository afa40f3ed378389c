use crate::ports::KeyValueStore;
use shared::{Error, Result};
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_LANGUAGE: &str = "en";

/// UI languages the dashboard ships translations for
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["en", "fa"];

/// Persisted user-facing preferences
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Selected language, falling back to the default on any problem
    pub async fn language(&self) -> String {
        match self.store.get(crate::namespaces::LANGUAGE).await {
            Ok(Some(code)) if SUPPORTED_LANGUAGES.contains(&code.as_str()) => code,
            Ok(Some(code)) => {
                warn!("Ignoring unsupported stored language '{}'", code);
                DEFAULT_LANGUAGE.to_string()
            }
            Ok(None) => DEFAULT_LANGUAGE.to_string(),
            Err(e) => {
                warn!("Failed to read language preference: {}", e);
                DEFAULT_LANGUAGE.to_string()
            }
        }
    }

    pub async fn set_language(&self, code: &str) -> Result<()> {
        let code = code.trim().to_lowercase();
        if !SUPPORTED_LANGUAGES.contains(&code.as_str()) {
            return Err(Error::Internal(format!("Unsupported language '{}'", code)));
        }
        self.store.set(crate::namespaces::LANGUAGE, code).await
    }
}
