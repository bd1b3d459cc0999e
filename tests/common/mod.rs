//! Test helpers for integration tests.
//!
//! Provides a [`TestApp`] wrapping a `Hangar` on an in-memory database and a
//! temporary upload directory.

#![allow(dead_code)]

use std::path::Path;

use tempfile::TempDir;

use hangar::config::Config;
use hangar::db::{NewUser, Principal, Role, UserRepository};
use hangar::{Database, Hangar, UploadRequest};

/// Secret used for direct links in tests.
pub const TEST_SECRET: &str = "test-secret-key-for-testing-only";

/// A running application with its own storage directory.
pub struct TestApp {
    pub hangar: Hangar,
    _dir: TempDir,
}

impl TestApp {
    /// Create an app with the default upload size limit.
    pub async fn new() -> Self {
        Self::with_max_file_size(1024 * 1024).await
    }

    /// Create an app with a custom upload size limit.
    pub async fn with_max_file_size(max_file_size: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        Self::build(dir, db, max_file_size).await
    }

    /// Create an app on a pooled WAL database file, as the binary runs it.
    pub async fn file_backed() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("hangar.db")).await.unwrap();
        Self::build(dir, db, 1024 * 1024).await
    }

    async fn build(dir: TempDir, db: Database, max_file_size: u64) -> Self {
        let mut config = Config::default();
        config.storage.local_path = dir.path().join("uploads").to_string_lossy().into_owned();
        config.storage.max_file_size = max_file_size;
        config.links.secret = TEST_SECRET.to_string();

        let hangar = Hangar::with_database(db, &config).await.unwrap();
        Self { hangar, _dir: dir }
    }

    /// Create a user with the given quota and return its principal.
    ///
    /// The password hash is a placeholder; these tests never log in.
    pub async fn user(&self, username: &str, quota: i64) -> Principal {
        UserRepository::new(self.hangar.db().pool())
            .create(&NewUser::new(
                username,
                format!("{username}@example.com"),
                "placeholder-hash",
                quota,
            ))
            .await
            .unwrap()
            .principal()
    }

    /// Create an admin user.
    pub async fn admin(&self, username: &str) -> Principal {
        UserRepository::new(self.hangar.db().pool())
            .create(
                &NewUser::new(
                    username,
                    format!("{username}@example.com"),
                    "placeholder-hash",
                    1024,
                )
                .with_role(Role::Admin),
            )
            .await
            .unwrap()
            .principal()
    }

    /// Current `used_storage` of a user.
    pub async fn used(&self, principal: &Principal) -> i64 {
        self.hangar.quota().usage(&principal.id).await.unwrap().used
    }

    /// Sum of `file_size` over the user's records.
    pub async fn stored_bytes(&self, principal: &Principal) -> i64 {
        sqlx::query_scalar("SELECT COALESCE(SUM(file_size), 0) FROM files WHERE user_id = ?")
            .bind(&principal.id)
            .fetch_one(self.hangar.db().pool())
            .await
            .unwrap()
    }

    /// Number of blobs on local disk.
    pub fn blob_count(&self) -> usize {
        count_files(self.hangar.local().base_path())
    }
}

/// Plain-text upload of `len` bytes.
pub fn text_upload(name: &str, len: usize) -> UploadRequest {
    UploadRequest::new(name, "text/plain", vec![b'a'; len])
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}
