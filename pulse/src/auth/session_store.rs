use super::error::AuthError;
use super::session::Session;
use crate::ports::KeyValueStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Trait for exchanging credentials for a session
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError>;
}

/// Session persistence under the auth namespace
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            key: crate::namespaces::AUTH.to_string(),
        }
    }

    /// Stored session, if any; unreadable sessions count as logged out
    pub async fn load(&self) -> Option<Session> {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read stored session: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Discarding unreadable stored session: {}", e);
                None
            }
        }
    }

    pub async fn save(&self, session: &Session) -> Result<(), AuthError> {
        let raw = serde_json::to_string(session)?;
        self.store
            .set(&self.key, raw)
            .await
            .map_err(|e| AuthError::StorageError(e.to_string()))
    }

    pub async fn clear(&self) -> Result<bool, AuthError> {
        self.store
            .remove(&self.key)
            .await
            .map_err(|e| AuthError::StorageError(e.to_string()))
    }

    /// Forget the stored session, returning the user it belonged to
    ///
    /// Cached payloads are kept and simply age out.
    pub async fn logout(&self) -> Result<Option<String>, AuthError> {
        let user_id = self.load().await.map(|session| session.user_id);
        self.clear().await?;
        if let Some(user_id) = &user_id {
            info!("Signed out user {}", user_id);
        }
        Ok(user_id)
    }

    /// Log in and persist the resulting session
    pub async fn sign_in(
        &self,
        authenticator: &dyn Authenticator,
        username: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let session = authenticator.login(username, password).await?;
        self.save(&session).await?;
        info!("Signed in as {} (user {})", session.name, session.user_id);
        Ok(session)
    }

    /// Restore the stored session, or sign in when there is none
    pub async fn restore_or_sign_in(
        &self,
        authenticator: &dyn Authenticator,
        credentials: Option<(&str, &str)>,
    ) -> Result<Option<Session>, AuthError> {
        if let Some(session) = self.load().await {
            info!("Restored session for user {}", session.user_id);
            return Ok(Some(session));
        }

        match credentials {
            Some((username, password)) => {
                self.sign_in(authenticator, username, password).await.map(Some)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubAuthenticator {
        logins: AtomicUsize,
    }

    #[async_trait]
    impl Authenticator for StubAuthenticator {
        async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if password != "secret" {
                return Err(AuthError::InvalidCredentials);
            }
            Ok(Session {
                token: "jwt".to_string(),
                user_id: "42".to_string(),
                name: username.to_string(),
                email: format!("{}@example.com", username),
                roles: vec!["author".to_string()],
            })
        }
    }

    fn authenticator() -> StubAuthenticator {
        StubAuthenticator {
            logins: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_sign_in_persists_session() {
        let store = Arc::new(MemoryStore::default());
        let sessions = SessionStore::new(store.clone());

        let session = sessions.sign_in(&authenticator(), "ada", "secret").await.unwrap();
        assert_eq!(sessions.load().await, Some(session));
        assert!(store.raw("pulse-auth").is_some());

        assert!(sessions.clear().await.unwrap());
        assert!(sessions.load().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_sign_in_stores_nothing() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::default()));

        let result = sessions.sign_in(&authenticator(), "ada", "wrong").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        assert!(sessions.load().await.is_none());
    }

    #[tokio::test]
    async fn test_restore_prefers_stored_session() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::default()));
        let auth = authenticator();

        assert!(sessions.restore_or_sign_in(&auth, None).await.unwrap().is_none());

        let first = sessions
            .restore_or_sign_in(&auth, Some(("ada", "secret")))
            .await
            .unwrap();
        let second = sessions
            .restore_or_sign_in(&auth, Some(("ada", "secret")))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(auth.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logout_reports_previous_user() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::default()));

        assert_eq!(sessions.logout().await.unwrap(), None);

        sessions.sign_in(&authenticator(), "ada", "secret").await.unwrap();
        assert_eq!(sessions.logout().await.unwrap().as_deref(), Some("42"));
        assert!(sessions.load().await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_or_unreadable_session_is_logged_out() {
        let store = Arc::new(MemoryStore::default());
        store.insert_raw("pulse-auth", "{\"token\":");
        assert!(SessionStore::new(store).load().await.is_none());

        let failing = SessionStore::new(Arc::new(FailingStore));
        assert!(failing.load().await.is_none());
        assert!(matches!(
            failing.clear().await,
            Err(AuthError::StorageError(_))
        ));
    }
}
