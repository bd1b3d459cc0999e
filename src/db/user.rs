//! User model for Hangar.

use std::fmt;
use std::str::FromStr;

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Regular account, sees only its own files.
    #[default]
    User,
    /// Administrator, may read any file.
    Admin,
}

impl Role {
    /// Convert role to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A registered account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    /// UUID.
    pub id: String,
    /// Login name (unique, case-insensitive).
    pub username: String,
    /// Email address (unique, case-insensitive).
    pub email: String,
    /// Argon2 PHC string.
    pub password: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    /// Byte budget ceiling.
    pub storage_quota: i64,
    /// Bytes currently charged against the budget.
    pub used_storage: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// The identity the file engine works with.
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id.clone(),
            role: self.role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Authenticated requester identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Data for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    /// Password hash (should be pre-hashed with Argon2).
    pub password: String,
    pub role: Role,
    pub storage_quota: i64,
}

impl NewUser {
    /// Create a regular user with the given quota.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        storage_quota: i64,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            role: Role::User,
            storage_quota,
        }
    }

    /// Set the role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip_str() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("sysop".parse::<Role>().is_err());
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_new_user_builder() {
        let user = NewUser::new("alice", "alice@example.com", "hash", 1000).with_role(Role::Admin);
        assert_eq!(user.username, "alice");
        assert_eq!(user.storage_quota, 1000);
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn test_principal_is_admin() {
        assert!(Principal::new("a", Role::Admin).is_admin());
        assert!(!Principal::new("b", Role::User).is_admin());
    }
}
