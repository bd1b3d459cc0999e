//! File catalog rows and their repository.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::query::ListQuery;
use crate::datetime;
use crate::db::DbPool;
use crate::{HangarError, Result};

/// Metadata for one stored file.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct FileRecord {
    pub id: String,
    /// Owner.
    pub user_id: String,
    /// Backend handle (`{uuid}.{ext}`).
    #[serde(skip_serializing)]
    pub stored_name: String,
    /// Name supplied by the uploader, for display only.
    pub original_name: String,
    pub file_size: i64,
    pub mime_type: String,
    /// `local` or the kind of the provider holding the bytes.
    pub storage_type: String,
    pub storage_id: Option<String>,
    pub download_count: i64,
    pub is_public: bool,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl FileRecord {
    /// Parsed `expires_at`, if set and well formed.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at.as_deref().and_then(datetime::parse_db)
    }

    /// True once `now` has reached `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match &self.expires_at {
            None => false,
            // an unreadable expiry is treated as already passed
            Some(raw) => datetime::parse_db(raw).map_or(true, |at| now >= at),
        }
    }
}

/// Data for inserting a record once its bytes are written.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub user_id: String,
    pub stored_name: String,
    pub original_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_type: String,
    pub storage_id: Option<String>,
}

pub(crate) const FILE_COLUMNS: &str = "id, user_id, stored_name, original_name, file_size, mime_type, \
     storage_type, storage_id, download_count, is_public, expires_at, created_at, updated_at";

/// Repository for the `files` table.
pub struct FileRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> FileRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a record with a fresh id.
    pub async fn create(&self, file: &NewFileRecord) -> Result<FileRecord> {
        let id = Uuid::new_v4().to_string();
        let now = datetime::now_db();

        sqlx::query(
            "INSERT INTO files (id, user_id, stored_name, original_name, file_size, mime_type,
                                storage_type, storage_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&file.user_id)
        .bind(&file.stored_name)
        .bind(&file.original_name)
        .bind(file.file_size)
        .bind(&file.mime_type)
        .bind(&file.storage_type)
        .bind(&file.storage_id)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if crate::db::is_unique_violation(&e) {
                HangarError::Conflict("stored name already in use".to_string())
            } else {
                e.into()
            }
        })?;

        Ok(FileRecord {
            id,
            user_id: file.user_id.clone(),
            stored_name: file.stored_name.clone(),
            original_name: file.original_name.clone(),
            file_size: file.file_size,
            mime_type: file.mime_type.clone(),
            storage_type: file.storage_type.clone(),
            storage_id: file.storage_id.clone(),
            download_count: 0,
            is_public: false,
            expires_at: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Get a file by id regardless of owner.
    pub async fn get(&self, id: &str) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ? AND deleting = 0"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(file)
    }

    /// Get a file only if `owner` owns it.
    pub async fn get_owned(&self, id: &str, owner: &str) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ? AND user_id = ? AND deleting = 0"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(self.pool)
        .await?;
        Ok(file)
    }

    /// One page of an owner's files plus the total match count.
    pub async fn list_by_owner(
        &self,
        owner: &str,
        query: &ListQuery,
    ) -> Result<(Vec<FileRecord>, i64)> {
        let pattern = query.like_pattern();
        let filter = if pattern.is_some() {
            "WHERE user_id = ? AND deleting = 0 AND original_name LIKE ? ESCAPE '\\'"
        } else {
            "WHERE user_id = ? AND deleting = 0"
        };

        let count_sql = format!("SELECT COUNT(*) FROM files {filter}");
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql).bind(owner);
        if let Some(ref pattern) = pattern {
            count = count.bind(pattern);
        }
        let total = count.fetch_one(self.pool).await?;

        let list_sql = format!(
            "SELECT {FILE_COLUMNS} FROM files {filter} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            query.sort.column(),
            query.order.sql()
        );
        let mut list = sqlx::query_as::<_, FileRecord>(&list_sql).bind(owner);
        if let Some(ref pattern) = pattern {
            list = list.bind(pattern);
        }
        let files = list
            .bind(query.limit() as i64)
            .bind(query.offset())
            .fetch_all(self.pool)
            .await?;

        Ok((files, total))
    }

    /// Set the public flag and expiry of an owned file.
    ///
    /// Returns `false` when no such file belongs to `owner`.
    pub async fn update_visibility(
        &self,
        id: &str,
        owner: &str,
        is_public: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE files SET is_public = ?, expires_at = ?, updated_at = ?
             WHERE id = ? AND user_id = ? AND deleting = 0",
        )
        .bind(is_public)
        .bind(expires_at.as_ref().map(datetime::to_db))
        .bind(datetime::now_db())
        .bind(id)
        .bind(owner)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Increment the download counter on an existing connection.
    pub async fn record_download(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE files SET download_count = download_count + 1, updated_at = ?
             WHERE id = ? AND deleting = 0",
        )
        .bind(datetime::now_db())
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Hide an owned file while its bytes are removed.
    ///
    /// Returns the row to the one caller that marked it; concurrent callers
    /// and callers for files they do not own get `None`.
    pub async fn mark_deleting(&self, id: &str, owner: &str) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "UPDATE files SET deleting = 1
             WHERE id = ? AND user_id = ? AND deleting = 0
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(self.pool)
        .await?;
        Ok(file)
    }

    /// Make a file marked by [`Self::mark_deleting`] visible again.
    pub async fn clear_deleting(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE files SET deleting = 0 WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Remove an owned file and return the removed row.
    ///
    /// Of several concurrent callers only one receives the row.
    pub async fn delete_owned(
        conn: &mut SqliteConnection,
        id: &str,
        owner: &str,
    ) -> Result<Option<FileRecord>> {
        let file = sqlx::query_as::<_, FileRecord>(&format!(
            "DELETE FROM files WHERE id = ? AND user_id = ? RETURNING {FILE_COLUMNS}"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(file)
    }

    /// Sum of file sizes for `owner`.
    pub async fn total_size(&self, owner: &str) -> Result<i64> {
        let total: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(file_size), 0) FROM files WHERE user_id = ?")
                .bind(owner)
                .fetch_one(self.pool)
                .await?;
        Ok(total)
    }
}
