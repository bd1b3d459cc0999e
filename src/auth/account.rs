//! Account registration, login and profile maintenance.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::{Validate, ValidateEmail};

use crate::auth::password::{hash_password, validate_password, verify_password};
use crate::db::{DbPool, NewUser, Principal, Role, User, UserRepository};
use crate::{HangarError, Result};

/// Registration request data.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegistrationRequest {
    #[validate(length(
        min = 3,
        max = 32,
        message = "Username must be between 3 and 32 characters"
    ))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, max = 128, message = "Password must be between 6 and 128 characters"))]
    pub password: String,
}

impl RegistrationRequest {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    fn check(&self) -> Result<()> {
        self.validate().map_err(validation_message)?;
        if !self
            .username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(HangarError::Validation(
                "username may only contain letters, digits, '_', '-' and '.'".to_string(),
            ));
        }
        Ok(())
    }
}

/// Account data safe to hand to callers (no password hash).
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub storage_quota: i64,
    pub used_storage: i64,
    pub created_at: String,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role.as_str().to_string(),
            storage_quota: user.storage_quota,
            used_storage: user.used_storage,
            created_at: user.created_at,
        }
    }
}

/// Account operations over the users table.
pub struct Accounts<'a> {
    pool: &'a DbPool,
    default_quota: i64,
}

impl<'a> Accounts<'a> {
    /// `default_quota` is granted to every account created here.
    pub fn new(pool: &'a DbPool, default_quota: i64) -> Self {
        Self {
            pool,
            default_quota,
        }
    }

    /// Register a regular account.
    pub async fn register(&self, request: RegistrationRequest) -> Result<User> {
        self.register_with_role(request, Role::User).await
    }

    /// Register an account with a specific role.
    ///
    /// Typically used for bootstrapping the first administrator.
    pub async fn register_with_role(&self, request: RegistrationRequest, role: Role) -> Result<User> {
        request.check()?;

        let repo = UserRepository::new(self.pool);
        if repo.username_exists(&request.username).await? {
            return Err(HangarError::Conflict("username already exists".to_string()));
        }
        if repo.email_exists(&request.email, None).await? {
            return Err(HangarError::Conflict("email already exists".to_string()));
        }

        let password_hash = hash_blocking(request.password).await?;
        let new_user =
            NewUser::new(request.username, request.email, password_hash, self.default_quota)
                .with_role(role);
        let user = repo.create(&new_user).await?;

        info!(
            username = %user.username,
            user_id = %user.id,
            role = %user.role,
            "New user registered"
        );
        Ok(user)
    }

    /// Verify credentials; `login` may be the username or the email.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<Principal> {
        let user = UserRepository::new(self.pool)
            .get_by_login(login)
            .await?
            .ok_or_else(|| HangarError::Auth("invalid credentials".to_string()))?;

        if let Err(e) = verify_blocking(password.to_string(), user.password.clone()).await {
            warn!(login = %login, "Failed login attempt");
            return Err(e);
        }

        info!(user_id = %user.id, "User authenticated");
        Ok(user.principal())
    }

    /// Current account data.
    pub async fn profile(&self, principal: &Principal) -> Result<Profile> {
        let user = self.load(&principal.id).await?;
        Ok(user.into())
    }

    /// Change the account email.
    pub async fn update_email(&self, principal: &Principal, email: &str) -> Result<Profile> {
        if !email.validate_email() {
            return Err(HangarError::Validation("Invalid email address".to_string()));
        }

        let repo = UserRepository::new(self.pool);
        if repo.email_exists(email, Some(&principal.id)).await? {
            return Err(HangarError::Conflict("email already exists".to_string()));
        }
        let user = repo.update_email(&principal.id, email).await?;
        info!(user_id = %user.id, "Email updated");
        Ok(user.into())
    }

    /// Change the password after re-checking the current one.
    pub async fn change_password(
        &self,
        principal: &Principal,
        current: &str,
        new_password: &str,
    ) -> Result<()> {
        validate_password(new_password)?;

        let user = self.load(&principal.id).await?;
        verify_blocking(current.to_string(), user.password).await?;

        let hash = hash_blocking(new_password.to_string()).await?;
        UserRepository::new(self.pool)
            .update_password(&principal.id, &hash)
            .await?;
        info!(user_id = %principal.id, "Password changed");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<User> {
        UserRepository::new(self.pool)
            .get_by_id(id)
            .await?
            .ok_or_else(|| HangarError::NotFound("user".to_string()))
    }
}

async fn hash_blocking(password: String) -> Result<String> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| HangarError::Auth(format!("password task failed: {e}")))??;
    Ok(hash)
}

async fn verify_blocking(password: String, hash: String) -> Result<()> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| HangarError::Auth(format!("password task failed: {e}")))??;
    Ok(())
}

fn validation_message(errors: validator::ValidationErrors) -> HangarError {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, field_errors)| {
            field_errors.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for {field}"))
            })
        })
        .collect();
    messages.sort();
    HangarError::Validation(messages.join("; "))
}
