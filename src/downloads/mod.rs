//! Append-only download log.
//!
//! Entries are written only alongside a download counter increment and
//! removed only by cascade when their file is deleted.

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::datetime;
use crate::db::DbPool;
use crate::Result;

/// Default page size for an owner's download history.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Most entries returned for a single file.
pub const FILE_HISTORY_LIMIT: i64 = 100;

/// Where a download request came from.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestOrigin {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            user_agent: Some(user_agent.into()),
        }
    }
}

/// One recorded download.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct DownloadLogEntry {
    pub id: i64,
    pub file_id: String,
    /// `None` for anonymous and direct-link downloads.
    pub user_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub downloaded_at: String,
}

/// A log entry joined with the name of its file.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct OwnerDownload {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub entry: DownloadLogEntry,
    pub original_name: String,
}

/// One page of an owner's download history.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadPage {
    pub logs: Vec<OwnerDownload>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: i64,
}

pub struct DownloadLogRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> DownloadLogRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Append an entry on an existing connection, typically the transaction
    /// that also bumps the file's counter.
    pub async fn append_in(
        conn: &mut SqliteConnection,
        file_id: &str,
        user_id: Option<&str>,
        origin: &RequestOrigin,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO download_logs (file_id, user_id, ip_address, user_agent, downloaded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(user_id)
        .bind(&origin.ip)
        .bind(&origin.user_agent)
        .bind(datetime::now_db())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Downloads of every file `owner` owns, newest first.
    ///
    /// `page` is 1-based; a zero `limit` falls back to the default.
    pub async fn list_for_owner(&self, owner: &str, page: u32, limit: u32) -> Result<DownloadPage> {
        let page = page.max(1);
        let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };
        let offset = (page as i64 - 1) * limit as i64;

        let logs = sqlx::query_as::<_, OwnerDownload>(
            "SELECT l.id, l.file_id, l.user_id, l.ip_address, l.user_agent, l.downloaded_at,
                    f.original_name
             FROM download_logs l JOIN files f ON l.file_id = f.id
             WHERE f.user_id = ?
             ORDER BY l.downloaded_at DESC, l.id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(owner)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM download_logs l JOIN files f ON l.file_id = f.id
             WHERE f.user_id = ?",
        )
        .bind(owner)
        .fetch_one(self.pool)
        .await?;

        Ok(DownloadPage {
            logs,
            total,
            page,
            limit,
            pages: (total + limit as i64 - 1) / limit as i64,
        })
    }

    /// Latest downloads of a single file.
    pub async fn list_for_file(&self, file_id: &str) -> Result<Vec<DownloadLogEntry>> {
        let logs = sqlx::query_as::<_, DownloadLogEntry>(
            "SELECT id, file_id, user_id, ip_address, user_agent, downloaded_at
             FROM download_logs WHERE file_id = ?
             ORDER BY downloaded_at DESC, id DESC
             LIMIT ?",
        )
        .bind(file_id)
        .bind(FILE_HISTORY_LIMIT)
        .fetch_all(self.pool)
        .await?;
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewUser, UserRepository};
    use crate::file::{FileRepository, NewFileRecord};
    use crate::Database;

    async fn setup() -> (Database, String, String) {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserRepository::new(db.pool())
            .create(&NewUser::new("alice", "alice@example.com", "hash", 1000))
            .await
            .unwrap();
        let file = FileRepository::new(db.pool())
            .create(&NewFileRecord {
                user_id: user.id.clone(),
                stored_name: "abcd.txt".to_string(),
                original_name: "notes.txt".to_string(),
                file_size: 5,
                mime_type: "text/plain".to_string(),
                storage_type: "local".to_string(),
                storage_id: None,
            })
            .await
            .unwrap();
        (db, user.id, file.id)
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let (db, owner, file_id) = setup().await;

        {
            let mut conn = db.pool().acquire().await.unwrap();
            let origin = RequestOrigin::new("10.0.0.1", "curl/8");
            DownloadLogRepository::append_in(&mut conn, &file_id, Some(&owner), &origin)
                .await
                .unwrap();
            DownloadLogRepository::append_in(&mut conn, &file_id, None, &RequestOrigin::default())
                .await
                .unwrap();
        }

        let repo = DownloadLogRepository::new(db.pool());
        let page = repo.list_for_owner(&owner, 1, 0).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(page.pages, 1);
        assert_eq!(page.logs[0].original_name, "notes.txt");
        // newest first
        assert_eq!(page.logs[0].entry.user_id, None);
        assert_eq!(page.logs[1].entry.ip_address.as_deref(), Some("10.0.0.1"));

        let logs = repo.list_for_file(&file_id).await.unwrap();
        assert_eq!(logs.len(), 2);

        assert_eq!(repo.list_for_owner("nobody", 1, 10).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_entries_cascade_with_file() {
        let (db, owner, file_id) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        DownloadLogRepository::append_in(&mut conn, &file_id, None, &RequestOrigin::default())
            .await
            .unwrap();
        FileRepository::delete_owned(&mut conn, &file_id, &owner)
            .await
            .unwrap();
        drop(conn);

        let logs = DownloadLogRepository::new(db.pool())
            .list_for_file(&file_id)
            .await
            .unwrap();
        assert!(logs.is_empty());
    }
}
