//! Per-user storage provider registry.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::credentials::ProviderCredentials;
use crate::datetime;
use crate::db::DbPool;
use crate::storage::{Backend, LocalBackend, RemoteBackend, StorageError, StorageKind};
use crate::{HangarError, Result};

/// Data for registering a provider.
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub name: String,
    /// One of `local`, `aliyun`, `qcloud`, `huawei`, `onedrive`.
    pub storage_type: String,
    pub config: Value,
    pub is_default: bool,
}

impl NewProvider {
    pub fn new(name: impl Into<String>, storage_type: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            storage_type: storage_type.into(),
            config,
            is_default: false,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// Changes to an existing provider. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct ProviderUpdate {
    pub name: Option<String>,
    /// Full replacement config; validated like a new registration.
    pub config: Option<Value>,
    pub is_default: Option<bool>,
}

/// Provider listing entry, without config.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub storage_type: String,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Provider with its config, secrets masked.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDetails {
    #[serde(flatten)]
    pub summary: ProviderSummary,
    pub config: Map<String, Value>,
}

/// Answer to a credential refresh request.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub storage_type: String,
    pub message: String,
}

#[derive(sqlx::FromRow)]
struct ProviderRow {
    id: String,
    user_id: String,
    name: String,
    #[sqlx(rename = "type")]
    storage_type: String,
    config: String,
    is_default: bool,
    created_at: String,
    updated_at: String,
}

/// A provider loaded with its credentials.
#[derive(Debug, Clone)]
pub struct StorageProvider {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub kind: StorageKind,
    pub credentials: ProviderCredentials,
    pub is_default: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ProviderRow> for StorageProvider {
    type Error = HangarError;

    fn try_from(row: ProviderRow) -> Result<Self> {
        let kind = row
            .storage_type
            .parse()
            .map_err(|e: String| HangarError::Database(e))?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            kind,
            credentials: ProviderCredentials::from_json(&row.config)?,
            is_default: row.is_default,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl StorageProvider {
    pub fn summary(&self) -> ProviderSummary {
        ProviderSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            storage_type: self.kind.as_str().to_string(),
            is_default: self.is_default,
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }

    pub fn details(&self) -> ProviderDetails {
        ProviderDetails {
            summary: self.summary(),
            config: self.credentials.redacted(),
        }
    }

    /// Backend that stores this provider's files.
    ///
    /// A provider that cannot connect yet (missing bucket, endpoint or OAuth
    /// token) yields `Validation`.
    pub fn open_backend(&self, local: &LocalBackend) -> Result<Backend> {
        match self.kind {
            StorageKind::Local => Ok(Backend::Local(local.clone())),
            kind => RemoteBackend::open(kind, &self.credentials)
                .map(Backend::Remote)
                .map_err(|e| match e {
                    StorageError::Config(msg) => HangarError::Validation(msg),
                    other => other.into(),
                }),
        }
    }
}

const PROVIDER_COLUMNS: &str =
    "id, user_id, name, type, config, is_default, created_at, updated_at";

/// CRUD over a user's storage providers.
pub struct ProviderRegistry<'a> {
    pool: &'a DbPool,
}

impl<'a> ProviderRegistry<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Register a provider for `user_id`.
    ///
    /// When `is_default` is set, the previous default of the same type is
    /// cleared in the same transaction.
    pub async fn register(&self, user_id: &str, provider: NewProvider) -> Result<ProviderSummary> {
        let name = validate_name(&provider.name)?;
        let kind = parse_kind(&provider.storage_type)?;
        let credentials = validate_config(kind, provider.config)?;

        let id = Uuid::new_v4().to_string();
        let now = datetime::now_db();

        let mut tx = self.pool.begin().await?;
        if provider.is_default {
            clear_default(&mut *tx, user_id, kind, &now).await?;
        }
        sqlx::query(
            "INSERT INTO storage_providers (id, user_id, name, type, config, is_default, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(&name)
        .bind(kind.as_str())
        .bind(credentials.to_json()?)
        .bind(provider.is_default)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            user_id = %user_id,
            provider_id = %id,
            kind = %kind,
            is_default = provider.is_default,
            "Storage provider registered"
        );

        Ok(ProviderSummary {
            id,
            name,
            storage_type: kind.as_str().to_string(),
            is_default: provider.is_default,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// All providers of a user, defaults first, then newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ProviderSummary>> {
        let rows = sqlx::query_as::<_, ProviderRow>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM storage_providers
             WHERE user_id = ? ORDER BY is_default DESC, created_at DESC, id"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|row| StorageProvider::try_from(row).map(|p| p.summary()))
            .collect()
    }

    /// One provider with its config redacted.
    pub async fn get(&self, user_id: &str, id: &str) -> Result<ProviderDetails> {
        Ok(self.load(user_id, id).await?.details())
    }

    /// Load an owned provider including its credentials.
    pub async fn load(&self, user_id: &str, id: &str) -> Result<StorageProvider> {
        let row = sqlx::query_as::<_, ProviderRow>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM storage_providers WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| HangarError::NotFound("storage provider".to_string()))?;

        debug!(provider_id = %id, "Storage provider loaded");
        row.try_into()
    }

    /// Update name, config or default flag.
    pub async fn update(
        &self,
        user_id: &str,
        id: &str,
        update: ProviderUpdate,
    ) -> Result<ProviderSummary> {
        let current = self.load(user_id, id).await?;

        let name = match update.name {
            Some(ref name) => validate_name(name)?,
            None => current.name.clone(),
        };
        let credentials = match update.config {
            Some(config) => validate_config(current.kind, config)?,
            None => current.credentials.clone(),
        };
        let is_default = update.is_default.unwrap_or(current.is_default);
        let now = datetime::now_db();

        let mut tx = self.pool.begin().await?;
        if is_default && !current.is_default {
            clear_default(&mut *tx, user_id, current.kind, &now).await?;
        }
        sqlx::query(
            "UPDATE storage_providers SET name = ?, config = ?, is_default = ?, updated_at = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(&name)
        .bind(credentials.to_json()?)
        .bind(is_default)
        .bind(&now)
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(user_id = %user_id, provider_id = %id, "Storage provider updated");

        Ok(ProviderSummary {
            id: current.id,
            name,
            storage_type: current.kind.as_str().to_string(),
            is_default,
            created_at: current.created_at,
            updated_at: now,
        })
    }

    /// Remove a provider no file refers to.
    ///
    /// `NotFound` when absent or owned by someone else; `Conflict` while any
    /// file is stored through it.
    pub async fn delete(&self, user_id: &str, id: &str) -> Result<()> {
        // The write comes first so a concurrent commit cannot invalidate an
        // earlier read; files referencing the row trip the foreign key.
        let result = sqlx::query("DELETE FROM storage_providers WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => {
                Err(HangarError::NotFound("storage provider".to_string()))
            }
            Ok(_) => {
                info!(user_id = %user_id, provider_id = %id, "Storage provider deleted");
                Ok(())
            }
            Err(e) if crate::db::is_foreign_key_violation(&e) => {
                let in_use: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE storage_id = ?")
                        .bind(id)
                        .fetch_one(self.pool)
                        .await?;
                debug!(provider_id = %id, in_use, "Storage provider delete refused");
                Err(HangarError::Conflict(format!(
                    "storage provider is in use by {in_use} file(s)"
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ask a provider to renew its credentials.
    ///
    /// Local providers have none (`UnsupportedOperation`). For the OAuth
    /// drives the renewal itself happens in the provider's OAuth flow outside
    /// this service; the request is acknowledged.
    pub async fn refresh_credentials(&self, user_id: &str, id: &str) -> Result<RefreshStatus> {
        let provider = self.load(user_id, id).await?;
        if provider.kind == StorageKind::Local {
            return Err(HangarError::UnsupportedOperation(
                "local storage has no credentials to refresh".to_string(),
            ));
        }

        info!(user_id = %user_id, provider_id = %id, kind = %provider.kind, "Credential refresh requested");
        Ok(RefreshStatus {
            id: provider.id,
            storage_type: provider.kind.as_str().to_string(),
            message: "credential refresh is completed through the provider's OAuth flow"
                .to_string(),
        })
    }
}

async fn clear_default(
    conn: &mut sqlx::SqliteConnection,
    user_id: &str,
    kind: StorageKind,
    now: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE storage_providers SET is_default = 0, updated_at = ?
         WHERE user_id = ? AND type = ? AND is_default = 1",
    )
    .bind(now)
    .bind(user_id)
    .bind(kind.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(HangarError::Validation("provider name is empty".to_string()));
    }
    Ok(name.to_string())
}

fn parse_kind(storage_type: &str) -> Result<StorageKind> {
    storage_type.parse().map_err(HangarError::Validation)
}

fn validate_config(kind: StorageKind, config: Value) -> Result<ProviderCredentials> {
    let credentials = ProviderCredentials::from_value(config)?;
    let missing = credentials.missing(kind.required_fields());
    if !missing.is_empty() {
        return Err(HangarError::Validation(format!(
            "missing required fields for {kind}: {}",
            missing.join(", ")
        )));
    }
    Ok(credentials)
}
