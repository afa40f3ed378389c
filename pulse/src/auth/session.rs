use crate::domain::PrefetchContext;
use serde::{Deserialize, Serialize};

/// WordPress roles allowed to see site-wide analytics
pub const ADMIN_ROLES: [&str; 2] = ["administrator", "editor"];

/// Authenticated session persisted across restarts
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.roles
            .iter()
            .any(|role| ADMIN_ROLES.contains(&role.as_str()))
    }

    pub fn context(&self, site_id: Option<&str>) -> PrefetchContext {
        PrefetchContext {
            user_id: self.user_id.clone(),
            token: self.token.clone(),
            site_id: site_id.map(str::to_string),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(roles: &[&str]) -> Session {
        Session {
            token: "jwt".to_string(),
            user_id: "42".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_admin_roles() {
        assert!(session(&["administrator"]).is_admin());
        assert!(session(&["subscriber", "editor"]).is_admin());
        assert!(!session(&["author"]).is_admin());
        assert!(!session(&[]).is_admin());
    }

    #[test]
    fn test_context_from_session() {
        let ctx = session(&["author"]).context(Some("3"));
        assert_eq!(ctx, PrefetchContext::new("42", "jwt").with_site("3"));
    }

    #[test]
    fn test_serialized_layout() {
        let json = serde_json::to_value(session(&["author"])).unwrap();
        assert_eq!(json["userId"], "42");
        assert_eq!(json["token"], "jwt");
        assert_eq!(json["roles"][0], "author");
    }

    #[test]
    fn test_debug_hides_token() {
        assert!(!format!("{:?}", session(&[])).contains("jwt"));
    }
}
