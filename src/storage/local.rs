//! Local filesystem backend.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{check_handle, ByteStream, StorageBackend, StorageError, StorageKind, StorageResult};

/// Files on local disk in a sharded directory structure:
/// ```text
/// {base_path}/
/// ├── ab/
/// │   └── ab12cd34-5678-90ab-cdef-123456789012.txt
/// ├── cd/
/// │   └── cd90ab12-3456-7890-abcd-ef1234567890.bin
/// └── ...
/// ```
#[derive(Debug, Clone)]
pub struct LocalBackend {
    base_path: PathBuf,
}

impl LocalBackend {
    /// Create the backend, creating the base directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Full path for a handle: `{base_path}/{first two chars}/{handle}`.
    pub fn path_for(&self, handle: &str) -> StorageResult<PathBuf> {
        check_handle(handle)?;
        let shard = handle.get(..2).unwrap_or(handle);
        Ok(self.base_path.join(shard).join(handle))
    }

    /// Whether content exists under `handle`.
    pub async fn exists(&self, handle: &str) -> bool {
        match self.path_for(handle) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn write(&self, handle: &str, content: Bytes) -> StorageResult<()> {
        let start = Instant::now();
        let path = self.path_for(handle)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {e}", path.display())))?;
        file.write_all(&content)
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {e}", path.display())))?;
        file.flush().await?;

        info!(
            handle = %handle,
            size_bytes = content.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local write successful"
        );
        Ok(())
    }

    async fn get(&self, handle: &str) -> StorageResult<ByteStream> {
        let path = self.path_for(handle)?;

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(handle.to_string()))
            }
            Err(e) => return Err(StorageError::DownloadFailed(e.to_string())),
        };

        debug!(handle = %handle, "Local read opened");
        let stream = tokio_util::io::ReaderStream::new(file)
            .map(|chunk| chunk.map_err(|e| StorageError::DownloadFailed(e.to_string())));
        Ok(stream.boxed())
    }

    async fn delete(&self, handle: &str) -> StorageResult<()> {
        let path = self.path_for(handle)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                // Shard directories stay: a concurrent write may have just
                // created its parent.
                info!(handle = %handle, "Local delete successful");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(handle.to_string()))
            }
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }

    async fn refresh_credentials(&self) -> StorageResult<()> {
        Err(StorageError::Unsupported(
            "local storage has no credentials to refresh".to_string(),
        ))
    }

    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }
}
