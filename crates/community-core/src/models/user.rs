use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Account as returned by `GET /auth/me` and cached under the `user` key.
///
/// Only `username` is guaranteed: a profile built from login credentials
/// alone carries nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<NaiveDateTime>,
}

impl UserProfile {
    /// Minimal profile used when login succeeds but the profile fetch does not
    pub fn fallback(username: &str) -> Self {
        Self {
            id: None,
            username: username.to_string(),
            nickname: None,
            email: None,
            profile_image_url: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Nickname when set, username otherwise
    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub nickname: String,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("nickname", &self.nickname)
            .finish()
    }
}

/// Post and comment totals shown on a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub post_count: i64,
    pub comment_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_user() {
        // The backend also sends the password hash and flags; those are dropped
        let json = r#"{"id":7,"username":"kim","email":"kim@example.com","password":"$2a$10$hash","nickname":"Kimmy","profileImageUrl":null,"createdAt":"2024-03-01T10:15:30","updatedAt":"2024-03-02T08:00:00","active":true}"#;

        let user: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, Some(7));
        assert_eq!(user.username, "kim");
        assert_eq!(user.nickname.as_deref(), Some("Kimmy"));
        assert_eq!(user.profile_image_url, None);
        assert!(user.created_at.is_some());

        let cached = serde_json::to_string(&user).unwrap();
        assert!(!cached.contains("password"));
    }

    #[test]
    fn test_fallback_profile_serializes_username_only() {
        let user = UserProfile::fallback("kim");
        assert_eq!(serde_json::to_string(&user).unwrap(), r#"{"username":"kim"}"#);
    }

    #[test]
    fn test_display_name() {
        let mut user = UserProfile::fallback("kim");
        assert_eq!(user.display_name(), "kim");

        user.nickname = Some("Kimmy".to_string());
        assert_eq!(user.display_name(), "Kimmy");

        user.nickname = Some("  ".to_string());
        assert_eq!(user.display_name(), "kim");
    }

    #[test]
    fn test_login_request_debug_redacts_password() {
        let req = LoginRequest::new("kim", "hunter22");
        let debug = format!("{:?}", req);
        assert!(debug.contains("kim"));
        assert!(!debug.contains("hunter22"));
    }
}
