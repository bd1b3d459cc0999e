//! Usage and download aggregates for a user's files.

use chrono::{DateTime, Datelike, Months, Utc};
use serde::Serialize;

use crate::db::DbPool;
use crate::file::{FileRecord, FILE_COLUMNS};
use crate::quota::{QuotaLedger, QuotaUsage};
use crate::Result;

/// Number of entries in the recent and popular lists of the overview.
pub const OVERVIEW_LIST_SIZE: i64 = 5;

/// Days with uploads reported by [`StatsService::history`].
pub const HISTORY_DAYS: i64 = 30;

/// Files and bytes stored through one storage type.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StorageTypeUsage {
    pub storage_type: String,
    pub count: i64,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    #[serde(flatten)]
    pub quota: QuotaUsage,
    pub by_storage_type: Vec<StorageTypeUsage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub quota: i64,
    pub used: i64,
    pub percentage: f64,
    pub total_files: i64,
    pub total_downloads: i64,
    pub recent_files: Vec<FileRecord>,
    pub top_downloads: Vec<FileRecord>,
}

/// Uploads on one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct DailyUploads {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub uploaded_bytes: i64,
    pub file_count: i64,
}

/// Totals for files created within one month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct MonthTotals {
    pub total_files: i64,
    pub total_bytes: i64,
    pub total_downloads: i64,
}

/// Files of one broad type.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TypeBreakdown {
    /// `images`, `videos`, `audio`, `pdf`, `archives`, `documents` or `others`.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub category: String,
    pub count: i64,
    pub total_size: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub this_month: MonthTotals,
    pub last_month: MonthTotals,
    pub file_type_breakdown: Vec<TypeBreakdown>,
}

/// Read-only aggregate queries.
pub struct StatsService<'a> {
    pool: &'a DbPool,
}

impl<'a> StatsService<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Quota usage with a per-storage-type split.
    pub async fn usage(&self, user_id: &str) -> Result<UsageReport> {
        let quota = QuotaLedger::new(self.pool).usage(user_id).await?;
        let by_storage_type = sqlx::query_as::<_, StorageTypeUsage>(
            "SELECT storage_type, COUNT(*) AS count, COALESCE(SUM(file_size), 0) AS size
             FROM files WHERE user_id = ?
             GROUP BY storage_type ORDER BY storage_type",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(UsageReport {
            quota,
            by_storage_type,
        })
    }

    /// Dashboard summary: totals plus the newest and most downloaded files.
    pub async fn overview(&self, user_id: &str) -> Result<Overview> {
        let quota = QuotaLedger::new(self.pool).usage(user_id).await?;

        let (total_files, total_downloads): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(download_count), 0) FROM files WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;

        let recent_files = self.top_files(user_id, "created_at DESC, id").await?;
        let top_downloads = self
            .top_files(user_id, "download_count DESC, created_at DESC, id")
            .await?;

        Ok(Overview {
            quota: quota.quota,
            used: quota.used,
            percentage: quota.percentage,
            total_files,
            total_downloads,
            recent_files,
            top_downloads,
        })
    }

    /// Bytes and files uploaded per day, for the latest days with uploads.
    pub async fn history(&self, user_id: &str) -> Result<Vec<DailyUploads>> {
        let days = sqlx::query_as::<_, DailyUploads>(
            "SELECT date(created_at) AS date,
                    COALESCE(SUM(file_size), 0) AS uploaded_bytes,
                    COUNT(*) AS file_count
             FROM files WHERE user_id = ?
             GROUP BY date(created_at)
             ORDER BY date DESC
             LIMIT ?",
        )
        .bind(user_id)
        .bind(HISTORY_DAYS)
        .fetch_all(self.pool)
        .await?;
        Ok(days)
    }

    /// Month-over-month totals and a breakdown by file type, as of `now`.
    pub async fn analytics(&self, user_id: &str, now: DateTime<Utc>) -> Result<Analytics> {
        let this_month = now.format("%Y-%m").to_string();
        let last_month = now
            .with_day(1)
            .and_then(|first| first.checked_sub_months(Months::new(1)))
            .map(|prev| prev.format("%Y-%m").to_string())
            .unwrap_or_default();

        let this_month = self.month_totals(user_id, &this_month).await?;
        let last_month = self.month_totals(user_id, &last_month).await?;

        let file_type_breakdown = sqlx::query_as::<_, TypeBreakdown>(
            "SELECT CASE
                        WHEN mime_type LIKE 'image/%' THEN 'images'
                        WHEN mime_type LIKE 'video/%' THEN 'videos'
                        WHEN mime_type LIKE 'audio/%' THEN 'audio'
                        WHEN mime_type = 'application/pdf' THEN 'pdf'
                        WHEN mime_type LIKE 'application/zip%'
                          OR mime_type LIKE 'application/x-rar%' THEN 'archives'
                        WHEN mime_type LIKE 'text/%' THEN 'documents'
                        ELSE 'others'
                    END AS type,
                    COUNT(*) AS count,
                    COALESCE(SUM(file_size), 0) AS total_size
             FROM files WHERE user_id = ?
             GROUP BY type ORDER BY type",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(Analytics {
            this_month,
            last_month,
            file_type_breakdown,
        })
    }

    async fn month_totals(&self, user_id: &str, month: &str) -> Result<MonthTotals> {
        let totals = sqlx::query_as::<_, MonthTotals>(
            "SELECT COUNT(*) AS total_files,
                    COALESCE(SUM(file_size), 0) AS total_bytes,
                    COALESCE(SUM(download_count), 0) AS total_downloads
             FROM files WHERE user_id = ? AND substr(created_at, 1, 7) = ?",
        )
        .bind(user_id)
        .bind(month)
        .fetch_one(self.pool)
        .await?;
        Ok(totals)
    }

    /// `order` is one of the fixed clauses above, never client input.
    async fn top_files(&self, user_id: &str, order: &str) -> Result<Vec<FileRecord>> {
        let files = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE user_id = ? AND deleting = 0
             ORDER BY {order} LIMIT ?"
        ))
        .bind(user_id)
        .bind(OVERVIEW_LIST_SIZE)
        .fetch_all(self.pool)
        .await?;
        Ok(files)
    }
}
