//! User (credential record) domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Manager,
    Teller,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Manager => "Manager",
            Self::Teller => "Teller",
            Self::Customer => "Customer",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::Customer
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "teller" => Ok(Self::Teller),
            "customer" => Ok(Self::Customer),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Where a user stands in the login state machine at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Active,
    LockedTemporary(DateTime<Utc>),
    Deactivated,
}

/// A stored credential record
///
/// `failed_login_attempts` and `locked_until` are reset together, and only by
/// a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Argon2id PHC string
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        email: impl Into<String>,
        full_name: impl Into<String>,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into().trim().to_string(),
            password_hash: password_hash.into(),
            email: email.into().trim().to_string(),
            full_name: full_name.into().trim().to_string(),
            role,
            is_active: true,
            created_at,
            last_login_at: None,
            failed_login_attempts: 0,
            locked_until: None,
        }
    }

    /// Case-insensitive lookup key for usernames and emails
    pub fn normalize_identity(value: &str) -> String {
        value.trim().to_lowercase()
    }

    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_until, Some(until) if now < until)
    }

    /// Deactivation is checked before the lock
    pub fn login_state(&self, now: DateTime<Utc>) -> LoginState {
        if !self.is_active {
            return LoginState::Deactivated;
        }
        match self.locked_until {
            Some(until) if now < until => LoginState::LockedTemporary(until),
            _ => LoginState::Active,
        }
    }

    /// Projection safe to return to callers
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role,
            is_active: self.is_active,
            created_at: self.created_at,
            last_login_at: self.last_login_at,
        }
    }
}

/// Sanitized user returned by login and register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User::new(
            " alice ",
            "$argon2id$v=19$m=8,t=1,p=1$c2FsdA$aGFzaA",
            "Alice@Example.com",
            "Alice Smith",
            Role::Customer,
            Utc::now(),
        )
    }

    #[test]
    fn test_user_creation() {
        let user = user();
        assert_eq!(user.username, "alice");
        assert_eq!(user.failed_login_attempts, 0);
        assert!(user.is_active);
        assert_eq!(User::normalize_identity(&user.email), "alice@example.com");
    }

    #[test]
    fn test_login_state_transitions() {
        let now = Utc::now();
        let mut user = user();
        assert_eq!(user.login_state(now), LoginState::Active);

        let until = now + Duration::minutes(30);
        user.locked_until = Some(until);
        assert_eq!(user.login_state(now), LoginState::LockedTemporary(until));
        // Expired lock reads as active again
        assert_eq!(user.login_state(until), LoginState::Active);

        user.is_active = false;
        assert_eq!(user.login_state(now), LoginState::Deactivated);
    }

    #[test]
    fn test_view_and_serialization_hide_hash() {
        let user = user();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));

        let view = serde_json::to_string(&user.view()).unwrap();
        assert!(!view.contains("password"));
        assert!(view.contains("alice"));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("teller".parse::<Role>().unwrap(), Role::Teller);
        assert_eq!(Role::default(), Role::Customer);
        assert!("root".parse::<Role>().is_err());
    }
}
