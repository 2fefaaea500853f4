//! User accounts and roles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Role granted to a user. `Teller` is reserved: parsed and stored, but no
/// authorization path currently consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    Teller,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Teller => "teller",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(UserRole::Customer),
            "teller" => Some(UserRole::Teller),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user account. The password digest is never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_digest: impl Into<String>,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_digest: password_digest.into(),
            role,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Username rules: 3-50 characters, alphanumeric plus underscore.
    pub fn validate_username(username: &str) -> Result<(), String> {
        if username.len() < 3 {
            return Err("username must be at least 3 characters".to_string());
        }
        if username.len() > 50 {
            return Err("username must be at most 50 characters".to_string());
        }
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err("username may contain only letters, digits and underscores".to_string());
        }
        Ok(())
    }

    /// Minimal shape check; uniqueness is case-insensitive at the store.
    pub fn validate_email(email: &str) -> Result<(), String> {
        let Some((local, domain)) = email.split_once('@') else {
            return Err("email must contain '@'".to_string());
        };
        if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.len() > 100 {
            return Err("invalid email address".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(User::validate_username("ab").is_err());
        assert!(User::validate_username("alice_01").is_ok());
        assert!(User::validate_username("bad name").is_err());
        assert!(User::validate_username(&"x".repeat(51)).is_err());
    }

    #[test]
    fn email_rules() {
        assert!(User::validate_email("alice@example.com").is_ok());
        assert!(User::validate_email("alice").is_err());
        assert!(User::validate_email("@example.com").is_err());
        assert!(User::validate_email("alice@nodot").is_err());
    }

    #[test]
    fn digest_not_serialized() {
        let user = User::new("alice", "alice@example.com", "secret-digest", UserRole::Customer);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-digest"));
        assert!(json.contains("alice"));
    }

    #[test]
    fn role_round_trip() {
        for role in [UserRole::Customer, UserRole::Teller, UserRole::Admin] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("root"), None);
    }
}
