//! File service for Hangar.
//!
//! This module provides the high-level file operations:
//! - Upload with admission, quota reservation and compensation
//! - Download with access control and download accounting
//! - Direct-link issuance, visibility changes and deletion

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::query::{FilePage, ListQuery};
use super::record::{FileRecord, FileRepository, NewFileRecord};
use crate::access::{authorize, Access, DirectLink, DirectLinkSigner, LinkGrant, Requester};
use crate::db::{Database, DbPool, Principal};
use crate::downloads::{DownloadLogEntry, DownloadLogRepository, DownloadPage, RequestOrigin};
use crate::provider::ProviderRegistry;
use crate::quota::QuotaLedger;
use crate::storage::{
    new_handle, Backend, ByteStream, LocalBackend, StorageBackend, StorageError, StorageKind,
    UploadPolicy,
};
use crate::{HangarError, Result};

/// Request data for file upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Original filename.
    pub filename: String,
    /// Declared content type, parameters allowed.
    pub content_type: String,
    /// File content.
    pub content: Bytes,
    /// Provider to store through; local storage when `None`.
    pub storage_id: Option<String>,
}

impl UploadRequest {
    /// Create a new upload request for local storage.
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content: content.into(),
            storage_id: None,
        }
    }

    /// Store through a registered provider.
    pub fn with_storage(mut self, storage_id: impl Into<String>) -> Self {
        self.storage_id = Some(storage_id.into());
        self
    }
}

/// Result of a file download.
pub struct Download {
    /// File metadata, with the counter already incremented.
    pub record: FileRecord,
    /// File content.
    pub stream: ByteStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

/// File service for managing uploads, downloads and deletions.
pub struct FileService<'a> {
    db: &'a Database,
    local: &'a LocalBackend,
    signer: &'a DirectLinkSigner,
    policy: &'a UploadPolicy,
}

impl<'a> FileService<'a> {
    /// Create a new FileService.
    pub fn new(
        db: &'a Database,
        local: &'a LocalBackend,
        signer: &'a DirectLinkSigner,
        policy: &'a UploadPolicy,
    ) -> Self {
        Self {
            db,
            local,
            signer,
            policy,
        }
    }

    /// Upload a file.
    ///
    /// Admission runs before anything is persisted. The quota is reserved
    /// next, then bytes are written and finally the record is inserted. Any
    /// failure after the reservation deletes the written bytes and releases
    /// the reservation before the error is returned; if the future is
    /// dropped mid-flight the same cleanup is scheduled on the runtime.
    pub async fn upload(&self, principal: &Principal, request: UploadRequest) -> Result<FileRecord> {
        let size = request.content.len() as u64;
        let mime_type = self
            .policy
            .admit(&request.filename, &request.content_type, size)?;
        let size = size as i64;

        let (backend, storage_type) = self
            .backend_for_upload(principal, request.storage_id.as_deref())
            .await?;

        QuotaLedger::new(self.db.pool())
            .reserve(&principal.id, size)
            .await?;

        let handle = new_handle(&request.filename);
        let mut guard = PendingUpload::new(
            self.db.pool().clone(),
            backend.clone(),
            principal.id.clone(),
            handle.clone(),
            size,
        );

        let result = async {
            backend.write(&handle, request.content).await?;
            FileRepository::new(self.db.pool())
                .create(&NewFileRecord {
                    user_id: principal.id.clone(),
                    stored_name: handle.clone(),
                    original_name: request.filename.clone(),
                    file_size: size,
                    mime_type,
                    storage_type,
                    storage_id: request.storage_id.clone(),
                })
                .await
        }
        .await;
        guard.disarm();

        match result {
            Ok(record) => {
                info!(
                    user_id = %principal.id,
                    file_id = %record.id,
                    size = record.file_size,
                    storage_type = %record.storage_type,
                    "File uploaded"
                );
                Ok(record)
            }
            Err(e) => {
                warn!(user_id = %principal.id, error = %e, "Upload failed, rolling back");
                compensate(self.db.pool(), &backend, &principal.id, &handle, size).await;
                Err(e)
            }
        }
    }

    /// One page of the principal's own files.
    pub async fn list(&self, principal: &Principal, query: &ListQuery) -> Result<FilePage> {
        let (files, total) = FileRepository::new(self.db.pool())
            .list_by_owner(&principal.id, query)
            .await?;
        debug!(user_id = %principal.id, total, "Files listed");
        Ok(FilePage::new(files, total, query))
    }

    /// File metadata for its owner or an admin.
    pub async fn get(&self, principal: &Principal, file_id: &str) -> Result<FileRecord> {
        self.get_managed(principal, file_id).await
    }

    /// Verify a direct-link token for use in a [`Requester`].
    pub fn verify_link(&self, token: &str) -> Result<LinkGrant> {
        self.signer.verify(token)
    }

    /// Download a file.
    ///
    /// The counter increment and the log entry share one transaction that
    /// commits before the content stream is opened.
    pub async fn download(
        &self,
        requester: &Requester,
        file_id: &str,
        origin: &RequestOrigin,
    ) -> Result<Download> {
        self.download_at(requester, file_id, origin, Utc::now()).await
    }

    /// [`Self::download`] with an explicit clock.
    pub async fn download_at(
        &self,
        requester: &Requester,
        file_id: &str,
        origin: &RequestOrigin,
        now: DateTime<Utc>,
    ) -> Result<Download> {
        let mut record = FileRepository::new(self.db.pool())
            .get(file_id)
            .await?
            .ok_or_else(|| HangarError::NotFound("file".to_string()))?;

        let path = match authorize(&record, requester, now) {
            Access::Allow(path) => path,
            Access::Gone => return Err(HangarError::Gone("file".to_string())),
            Access::Deny(reason) => {
                debug!(file_id = %file_id, reason = reason.as_str(), "Download denied");
                return Err(HangarError::Forbidden(reason.as_str().to_string()));
            }
        };

        let backend = self.backend_for_record(&record).await?;
        let downloader = requester.principal.as_ref().map(|p| p.id.as_str());

        let mut tx = self.db.begin().await?;
        if !FileRepository::record_download(&mut *tx, &record.id).await? {
            return Err(HangarError::NotFound("file".to_string()));
        }
        DownloadLogRepository::append_in(&mut *tx, &record.id, downloader, origin).await?;
        tx.commit().await?;
        record.download_count += 1;

        let stream = backend.get(&record.stored_name).await?;

        info!(
            file_id = %record.id,
            user_id = downloader.unwrap_or("anonymous"),
            access = ?path,
            "File downloaded"
        );
        Ok(Download { record, stream })
    }

    /// Issue a 24-hour direct link.
    ///
    /// Only the owner or an admin may issue one; anyone else gets
    /// `NotFound`. An expired file yields `Gone`.
    pub async fn issue_direct_link(&self, principal: &Principal, file_id: &str) -> Result<DirectLink> {
        let record = self.get_managed(principal, file_id).await?;
        let now = Utc::now();
        if record.is_expired_at(now) {
            return Err(HangarError::Gone("file".to_string()));
        }

        let link = self.signer.issue(&record.id, now)?;
        info!(
            user_id = %principal.id,
            file_id = %record.id,
            expires_at = %link.expires_at,
            "Direct link issued"
        );
        Ok(link)
    }

    /// Change the public flag and expiry of an owned file.
    pub async fn set_visibility(
        &self,
        principal: &Principal,
        file_id: &str,
        is_public: bool,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<FileRecord> {
        let repo = FileRepository::new(self.db.pool());
        if !repo
            .update_visibility(file_id, &principal.id, is_public, expires_at)
            .await?
        {
            return Err(HangarError::NotFound("file".to_string()));
        }

        info!(user_id = %principal.id, file_id = %file_id, is_public, "File visibility changed");
        repo.get(file_id)
            .await?
            .ok_or_else(|| HangarError::NotFound("file".to_string()))
    }

    /// Delete an owned file.
    ///
    /// The row is first hidden in a short transaction, then the bytes are
    /// removed with no transaction open, and finally the row removal and
    /// the quota release commit together. Bytes that are already missing do
    /// not block the deletion; any other backend failure makes the file
    /// visible again. A second delete yields `NotFound`.
    pub async fn delete(&self, principal: &Principal, file_id: &str) -> Result<()> {
        let repo = FileRepository::new(self.db.pool());
        let record = repo
            .get_owned(file_id, &principal.id)
            .await?
            .ok_or_else(|| HangarError::NotFound("file".to_string()))?;
        let backend = self.backend_for_record(&record).await?;

        let marked = repo
            .mark_deleting(&record.id, &principal.id)
            .await?
            .ok_or_else(|| HangarError::NotFound("file".to_string()))?;

        let mut guard = PendingDelete::new(self.db.pool().clone(), backend.clone(), marked.clone());
        let result = finish_delete(self.db.pool(), &backend, &marked).await;
        guard.disarm();
        result?;

        info!(
            user_id = %principal.id,
            file_id = %marked.id,
            size = marked.file_size,
            "File deleted"
        );
        Ok(())
    }

    /// Download history across the principal's files.
    pub async fn downloads_for_owner(
        &self,
        principal: &Principal,
        page: u32,
        limit: u32,
    ) -> Result<DownloadPage> {
        DownloadLogRepository::new(self.db.pool())
            .list_for_owner(&principal.id, page, limit)
            .await
    }

    /// Latest downloads of one owned file.
    pub async fn downloads_for_file(
        &self,
        principal: &Principal,
        file_id: &str,
    ) -> Result<Vec<DownloadLogEntry>> {
        FileRepository::new(self.db.pool())
            .get_owned(file_id, &principal.id)
            .await?
            .ok_or_else(|| HangarError::NotFound("file".to_string()))?;
        DownloadLogRepository::new(self.db.pool())
            .list_for_file(file_id)
            .await
    }

    /// Record visible to its owner or an admin; `NotFound` for anyone else.
    async fn get_managed(&self, principal: &Principal, file_id: &str) -> Result<FileRecord> {
        let record = FileRepository::new(self.db.pool())
            .get(file_id)
            .await?
            .filter(|r| r.user_id == principal.id || principal.is_admin());
        record.ok_or_else(|| HangarError::NotFound("file".to_string()))
    }

    async fn backend_for_upload(
        &self,
        principal: &Principal,
        storage_id: Option<&str>,
    ) -> Result<(Backend, String)> {
        match storage_id {
            None => Ok((
                Backend::Local(self.local.clone()),
                StorageKind::Local.as_str().to_string(),
            )),
            Some(id) => {
                let provider = ProviderRegistry::new(self.db.pool())
                    .load(&principal.id, id)
                    .await?;
                let backend = provider.open_backend(self.local)?;
                Ok((backend, provider.kind.as_str().to_string()))
            }
        }
    }

    async fn backend_for_record(&self, record: &FileRecord) -> Result<Backend> {
        match record.storage_id.as_deref() {
            None => Ok(Backend::Local(self.local.clone())),
            Some(id) => ProviderRegistry::new(self.db.pool())
                .load(&record.user_id, id)
                .await?
                .open_backend(self.local),
        }
    }
}

/// Cleanup owed by an upload that has reserved quota but not yet inserted
/// its record.
struct PendingUpload {
    pool: DbPool,
    backend: Backend,
    user_id: String,
    handle: String,
    size: i64,
    armed: bool,
}

impl PendingUpload {
    fn new(pool: DbPool, backend: Backend, user_id: String, handle: String, size: i64) -> Self {
        Self {
            pool,
            backend,
            user_id,
            handle,
            size,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                user_id = %self.user_id,
                handle = %self.handle,
                "Upload cancelled outside a runtime, cleanup skipped"
            );
            return;
        };

        let pool = self.pool.clone();
        let backend = self.backend.clone();
        let user_id = std::mem::take(&mut self.user_id);
        let handle = std::mem::take(&mut self.handle);
        let size = self.size;
        warn!(user_id = %user_id, handle = %handle, "Upload cancelled, scheduling cleanup");
        runtime.spawn(async move {
            compensate(&pool, &backend, &user_id, &handle, size).await;
        });
    }
}

/// Delete partially written bytes and return the reservation.
async fn compensate(pool: &DbPool, backend: &Backend, user_id: &str, handle: &str, size: i64) {
    match backend.delete(handle).await {
        Ok(()) | Err(StorageError::NotFound(_)) => {}
        Err(e) => warn!(handle = %handle, error = %e, "Failed to remove upload bytes"),
    }
    if let Err(e) = QuotaLedger::new(pool).release(user_id, size).await {
        warn!(user_id = %user_id, size, error = %e, "Failed to release quota reservation");
    }
}

/// A delete that has hidden its row but not yet removed it.
struct PendingDelete {
    pool: DbPool,
    backend: Backend,
    record: Option<FileRecord>,
}

impl PendingDelete {
    fn new(pool: DbPool, backend: Backend, record: FileRecord) -> Self {
        Self {
            pool,
            backend,
            record: Some(record),
        }
    }

    fn disarm(&mut self) {
        self.record = None;
    }
}

impl Drop for PendingDelete {
    fn drop(&mut self) {
        let Some(record) = self.record.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(file_id = %record.id, "Delete cancelled outside a runtime, file stays hidden");
            return;
        };

        let pool = self.pool.clone();
        let backend = self.backend.clone();
        warn!(file_id = %record.id, "Delete cancelled, scheduling completion");
        runtime.spawn(async move {
            if let Err(e) = finish_delete(&pool, &backend, &record).await {
                warn!(file_id = %record.id, error = %e, "Failed to complete cancelled delete");
            }
        });
    }
}

/// Remove the bytes of a hidden file, then its row and its quota share.
async fn finish_delete(pool: &DbPool, backend: &Backend, record: &FileRecord) -> Result<()> {
    match backend.delete(&record.stored_name).await {
        Ok(()) => {}
        Err(StorageError::NotFound(_)) => {
            warn!(file_id = %record.id, handle = %record.stored_name, "File bytes already missing");
        }
        Err(e) => {
            warn!(file_id = %record.id, error = %e, "Failed to remove file bytes, restoring file");
            FileRepository::new(pool).clear_deleting(&record.id).await?;
            return Err(e.into());
        }
    }

    let mut tx = pool.begin().await?;
    let removed = FileRepository::delete_owned(&mut *tx, &record.id, &record.user_id)
        .await?
        .ok_or_else(|| HangarError::NotFound("file".to_string()))?;
    QuotaLedger::release_in(&mut *tx, &removed.user_id, removed.file_size).await?;
    tx.commit().await?;
    Ok(())
}
