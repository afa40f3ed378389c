// Public API
pub mod error;
pub mod session;
pub mod session_store;

// Re-export commonly used types
pub use error::AuthError;
pub use session::Session;
pub use session_store::{Authenticator, SessionStore};
