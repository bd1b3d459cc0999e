//! Application context.
//!
//! [`Hangar`] owns the database, the local backend, the link signer and the
//! upload policy. Services are cheap borrowing views created on demand.

use tracing::{info, warn};

use crate::access::{generate_secret, DirectLinkSigner};
use crate::auth::Accounts;
use crate::config::Config;
use crate::db::Database;
use crate::file::FileService;
use crate::provider::ProviderRegistry;
use crate::quota::QuotaLedger;
use crate::stats::StatsService;
use crate::storage::{LocalBackend, UploadPolicy};
use crate::Result;

/// `system_config` key holding a generated link secret.
pub const TOKEN_SECRET_KEY: &str = "token_secret";

/// Main application handle.
#[derive(Debug)]
pub struct Hangar {
    db: Database,
    local: LocalBackend,
    signer: DirectLinkSigner,
    policy: UploadPolicy,
    default_quota: i64,
}

impl Hangar {
    /// Open the database and local storage named in `config`.
    ///
    /// Without a configured link secret one is generated on first start and
    /// kept in `system_config`, so issued links survive restarts.
    pub async fn open(config: &Config) -> Result<Self> {
        let db = Database::open(&config.database.path).await?;
        Self::with_database(db, config).await
    }

    /// Build the context around an already opened database.
    pub async fn with_database(db: Database, config: &Config) -> Result<Self> {
        config.validate()?;
        let local = LocalBackend::new(&config.storage.local_path)?;

        let secret = if config.links.secret.is_empty() {
            let secret = db
                .get_or_init_setting(TOKEN_SECRET_KEY, &generate_secret())
                .await?;
            warn!("No link secret configured, using the one stored in the database");
            secret
        } else {
            config.links.secret.clone()
        };
        let signer = DirectLinkSigner::new(&secret, &config.links.base_url)?;

        info!(
            local_path = %local.base_path().display(),
            base_url = %config.links.base_url,
            "Hangar ready"
        );

        Ok(Self {
            db,
            local,
            signer,
            policy: UploadPolicy::new(config.storage.max_file_size),
            default_quota: config.storage.default_quota,
        })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn local(&self) -> &LocalBackend {
        &self.local
    }

    pub fn signer(&self) -> &DirectLinkSigner {
        &self.signer
    }

    pub fn files(&self) -> FileService<'_> {
        FileService::new(&self.db, &self.local, &self.signer, &self.policy)
    }

    pub fn providers(&self) -> ProviderRegistry<'_> {
        ProviderRegistry::new(self.db.pool())
    }

    pub fn accounts(&self) -> Accounts<'_> {
        Accounts::new(self.db.pool(), self.default_quota)
    }

    pub fn quota(&self) -> QuotaLedger<'_> {
        QuotaLedger::new(self.db.pool())
    }

    pub fn stats(&self) -> StatsService<'_> {
        StatsService::new(self.db.pool())
    }

    /// Close the database pool.
    pub async fn close(&self) {
        self.db.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.database.path = dir.join("hangar.db").to_string_lossy().into_owned();
        config.storage.local_path = dir.join("uploads").to_string_lossy().into_owned();
        config.links.secret = String::new();
        config
    }

    #[tokio::test]
    async fn test_generated_secret_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let first = Hangar::open(&config).await.unwrap();
        let stored = first.db().get_setting(TOKEN_SECRET_KEY).await.unwrap().unwrap();
        assert_eq!(stored.len(), 64);
        let link = first
            .signer()
            .issue("file-1", chrono::Utc::now())
            .unwrap();
        first.close().await;

        let second = Hangar::open(&config).await.unwrap();
        assert_eq!(
            second.db().get_setting(TOKEN_SECRET_KEY).await.unwrap(),
            Some(stored)
        );
        assert!(second.signer().verify(&link.token).is_ok());
        second.close().await;
    }

    #[tokio::test]
    async fn test_configured_secret_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.links.secret = "configured".to_string();

        let db = Database::open_in_memory().await.unwrap();
        let hangar = Hangar::with_database(db, &config).await.unwrap();
        assert_eq!(hangar.db().get_setting(TOKEN_SECRET_KEY).await.unwrap(), None);

        let link = hangar.signer().issue("f", chrono::Utc::now()).unwrap();
        let other = DirectLinkSigner::new("configured", &config.links.base_url).unwrap();
        assert!(other.verify(&link.token).is_ok());
    }

    #[tokio::test]
    async fn test_accounts_use_default_quota() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.storage.default_quota = 4096;

        let db = Database::open_in_memory().await.unwrap();
        let hangar = Hangar::with_database(db, &config).await.unwrap();
        let user = hangar
            .accounts()
            .register(crate::auth::RegistrationRequest::new(
                "alice",
                "alice@example.com",
                "password123",
            ))
            .await
            .unwrap();

        let usage = hangar.quota().usage(&user.id).await.unwrap();
        assert_eq!(usage.quota, 4096);
        assert_eq!(usage.used, 0);
    }
}
