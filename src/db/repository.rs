//! User repository for Hangar.
//!
//! CRUD operations for accounts. Quota columns are only read here; all
//! writes to `used_storage` go through [`crate::quota::QuotaLedger`].

use uuid::Uuid;

use super::user::{NewUser, User};
use super::DbPool;
use crate::datetime;
use crate::{HangarError, Result};

const USER_COLUMNS: &str = "id, username, email, password, role, storage_quota, used_storage, created_at, updated_at";

/// Repository for user CRUD operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user.
    ///
    /// A username or email that is already taken yields `Conflict`.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        let id = Uuid::new_v4().to_string();
        let now = datetime::now_db();

        sqlx::query(
            "INSERT INTO users (id, username, email, password, role, storage_quota, used_storage, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password)
        .bind(new_user.role.as_str())
        .bind(new_user.storage_quota)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                HangarError::Conflict("username or email already exists".to_string())
            } else {
                e.into()
            }
        })?;

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| HangarError::NotFound("user".to_string()))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Get a user by username or email (case-insensitive).
    pub async fn get_by_login(&self, login: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ? OR email = ? LIMIT 1"
        ))
        .bind(login)
        .bind(login)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Check if a username is already taken (case-insensitive).
    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
                .bind(username)
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }

    /// Check if an email is in use, optionally ignoring one account.
    pub async fn email_exists(&self, email: &str, except_id: Option<&str>) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? AND id IS NOT ?)",
        )
        .bind(email)
        .bind(except_id)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    /// Change a user's email address.
    pub async fn update_email(&self, id: &str, email: &str) -> Result<User> {
        let result = sqlx::query("UPDATE users SET email = ?, updated_at = ? WHERE id = ?")
            .bind(email)
            .bind(datetime::now_db())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    HangarError::Conflict("email already exists".to_string())
                } else {
                    e.into()
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(HangarError::NotFound("user".to_string()));
        }
        self.get_by_id(id)
            .await?
            .ok_or_else(|| HangarError::NotFound("user".to_string()))
    }

    /// Replace a user's password hash.
    pub async fn update_password(&self, id: &str, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(datetime::now_db())
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(HangarError::NotFound("user".to_string()));
        }
        Ok(())
    }

    /// Count all users.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

/// Whether a statement failed on a UNIQUE constraint.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Whether a statement failed on a FOREIGN KEY constraint.
pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_foreign_key_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Role;
    use crate::Database;

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_user() {
        let db = setup_db().await;
        let repo = UserRepository::new(db.pool());

        let user = repo
            .create(&NewUser::new("alice", "alice@example.com", "hash", 1000))
            .await
            .unwrap();

        assert_eq!(user.username, "alice");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.storage_quota, 1000);
        assert_eq!(user.used_storage, 0);
        assert!(Uuid::parse_str(&user.id).is_ok());
    }

    #[tokio::test]
    async fn test_create_duplicate_is_conflict() {
        let db = setup_db().await;
        let repo = UserRepository::new(db.pool());

        repo.create(&NewUser::new("alice", "alice@example.com", "hash", 1000))
            .await
            .unwrap();

        let same_name = repo
            .create(&NewUser::new("ALICE", "other@example.com", "hash", 1000))
            .await;
        assert!(matches!(same_name, Err(HangarError::Conflict(_))));

        let same_email = repo
            .create(&NewUser::new("bob", "Alice@Example.com", "hash", 1000))
            .await;
        assert!(matches!(same_email, Err(HangarError::Conflict(_))));

        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_by_login() {
        let db = setup_db().await;
        let repo = UserRepository::new(db.pool());

        let created = repo
            .create(
                &NewUser::new("admin", "admin@example.com", "hash", 1000).with_role(Role::Admin),
            )
            .await
            .unwrap();

        let by_name = repo.get_by_login("Admin").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.role, Role::Admin);

        let by_email = repo.get_by_login("admin@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(repo.get_by_login("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_email_exists_except_self() {
        let db = setup_db().await;
        let repo = UserRepository::new(db.pool());

        let alice = repo
            .create(&NewUser::new("alice", "alice@example.com", "hash", 1000))
            .await
            .unwrap();

        assert!(repo.email_exists("alice@example.com", None).await.unwrap());
        assert!(!repo
            .email_exists("alice@example.com", Some(&alice.id))
            .await
            .unwrap());
        assert!(repo.username_exists("ALICE").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_email_and_password() {
        let db = setup_db().await;
        let repo = UserRepository::new(db.pool());

        let alice = repo
            .create(&NewUser::new("alice", "alice@example.com", "hash", 1000))
            .await
            .unwrap();
        repo.create(&NewUser::new("bob", "bob@example.com", "hash", 1000))
            .await
            .unwrap();

        let updated = repo.update_email(&alice.id, "new@example.com").await.unwrap();
        assert_eq!(updated.email, "new@example.com");

        let taken = repo.update_email(&alice.id, "bob@example.com").await;
        assert!(matches!(taken, Err(HangarError::Conflict(_))));

        repo.update_password(&alice.id, "newhash").await.unwrap();
        let reloaded = repo.get_by_id(&alice.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password, "newhash");

        let missing = repo.update_password("missing", "x").await;
        assert!(matches!(missing, Err(HangarError::NotFound(_))));
    }
}
