//! Per-user storage budget.
//!
//! `used_storage` on the users table is the single source of truth for
//! admission. Every change is a single conditional `UPDATE`, so concurrent
//! reservations that together overflow the budget cannot both succeed.

use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use crate::db::DbPool;
use crate::{HangarError, Result};

/// Snapshot of a user's budget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaUsage {
    pub quota: i64,
    pub used: i64,
    pub available: i64,
    /// `used / quota * 100`, rounded to two decimals.
    pub percentage: f64,
}

impl QuotaUsage {
    pub fn new(quota: i64, used: i64) -> Self {
        let percentage = if quota > 0 {
            ((used as f64 / quota as f64) * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            quota,
            used,
            available: (quota - used).max(0),
            percentage,
        }
    }
}

/// Reserve/release operations on `users.used_storage`.
pub struct QuotaLedger<'a> {
    pool: &'a DbPool,
}

impl<'a> QuotaLedger<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Charge `delta` bytes against the user's budget.
    ///
    /// Fails with `QuotaExceeded` when `used + delta > quota`, leaving the
    /// budget untouched.
    pub async fn reserve(&self, user_id: &str, delta: i64) -> Result<()> {
        if delta < 0 {
            return Err(HangarError::Validation(
                "reservation must not be negative".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE users SET used_storage = used_storage + ?
             WHERE id = ? AND used_storage + ? <= storage_quota",
        )
        .bind(delta)
        .bind(user_id)
        .bind(delta)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 1 {
            debug!(user_id = %user_id, delta, "Quota reserved");
            return Ok(());
        }

        // Nothing matched: either the user is gone or the budget is short.
        let usage = self.usage(user_id).await?;
        debug!(
            user_id = %user_id,
            requested = delta,
            available = usage.available,
            "Quota reservation refused"
        );
        Err(HangarError::QuotaExceeded {
            requested: delta,
            available: usage.available,
        })
    }

    /// Return `delta` bytes to the user's budget, clamped at zero.
    pub async fn release(&self, user_id: &str, delta: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::release_in(&mut *conn, user_id, delta).await
    }

    /// Release on an existing connection, typically inside a transaction.
    pub async fn release_in(conn: &mut SqliteConnection, user_id: &str, delta: i64) -> Result<()> {
        if delta < 0 {
            return Err(HangarError::Validation(
                "release must not be negative".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE users SET used_storage = MAX(used_storage - ?, 0) WHERE id = ?",
        )
        .bind(delta)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            warn!(user_id = %user_id, delta, "Quota release for unknown user");
        } else {
            debug!(user_id = %user_id, delta, "Quota released");
        }
        Ok(())
    }

    /// Current budget for a user.
    pub async fn usage(&self, user_id: &str) -> Result<QuotaUsage> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT storage_quota, used_storage FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(self.pool)
                .await?;

        let (quota, used) = row.ok_or_else(|| HangarError::NotFound("user".to_string()))?;
        Ok(QuotaUsage::new(quota, used))
    }
}
