//! Byte storage backends.
//!
//! A backend stores opaque blobs under collision-free handles of the form
//! `{uuid}.{ext}`. The user-supplied filename only contributes the
//! extension and never reaches a path or object key.
//!
//! - [`LocalBackend`]: sharded directory tree on local disk
//! - [`RemoteBackend`]: any `object_store` implementation (S3-compatible
//!   buckets, HTTP/WebDAV drives)
//! - [`Backend`]: enum dispatch over the two, used by the file service

mod admission;
mod local;
mod remote;

pub use admission::{UploadPolicy, ALLOWED_MIME_TYPES};
pub use local::LocalBackend;
pub use remote::RemoteBackend;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;
use uuid::Uuid;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid storage handle: {0}")]
    InvalidHandle(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("delete failed: {0}")]
    DeleteFailed(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("backend configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Stream of file content chunks.
pub type ByteStream = BoxStream<'static, StorageResult<Bytes>>;

/// Backend kinds a provider can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Local,
    Aliyun,
    Qcloud,
    Huawei,
    OneDrive,
}

impl StorageKind {
    pub const ALL: [StorageKind; 5] = [
        StorageKind::Local,
        StorageKind::Aliyun,
        StorageKind::Qcloud,
        StorageKind::Huawei,
        StorageKind::OneDrive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::Aliyun => "aliyun",
            StorageKind::Qcloud => "qcloud",
            StorageKind::Huawei => "huawei",
            StorageKind::OneDrive => "onedrive",
        }
    }

    /// Config fields that must be present when a provider is registered.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            StorageKind::Local => &[],
            StorageKind::Aliyun => &["access_token", "refresh_token"],
            StorageKind::Qcloud => &["secret_id", "secret_key", "region"],
            StorageKind::Huawei | StorageKind::OneDrive => &["client_id", "client_secret"],
        }
    }

    pub fn is_remote(&self) -> bool {
        !matches!(self, StorageKind::Local)
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StorageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unsupported storage type: {s}"))
    }
}

/// Byte-level storage operations.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write `content` under an already generated handle.
    async fn write(&self, handle: &str, content: Bytes) -> StorageResult<()>;

    /// Store `content` under a fresh handle derived from `suggested_name`.
    async fn put(&self, content: Bytes, suggested_name: &str) -> StorageResult<String> {
        let handle = new_handle(suggested_name);
        self.write(&handle, content).await?;
        Ok(handle)
    }

    /// Stream the content stored under `handle`.
    async fn get(&self, handle: &str) -> StorageResult<ByteStream>;

    /// Remove the content stored under `handle`.
    ///
    /// Returns `NotFound` when nothing is stored there.
    async fn delete(&self, handle: &str) -> StorageResult<()>;

    /// Renew provider credentials.
    async fn refresh_credentials(&self) -> StorageResult<()>;

    fn kind(&self) -> StorageKind;
}

/// Enum dispatch over the concrete backends.
#[derive(Debug, Clone)]
pub enum Backend {
    Local(LocalBackend),
    Remote(RemoteBackend),
}

#[async_trait]
impl StorageBackend for Backend {
    async fn write(&self, handle: &str, content: Bytes) -> StorageResult<()> {
        match self {
            Backend::Local(b) => b.write(handle, content).await,
            Backend::Remote(b) => b.write(handle, content).await,
        }
    }

    async fn get(&self, handle: &str) -> StorageResult<ByteStream> {
        match self {
            Backend::Local(b) => b.get(handle).await,
            Backend::Remote(b) => b.get(handle).await,
        }
    }

    async fn delete(&self, handle: &str) -> StorageResult<()> {
        match self {
            Backend::Local(b) => b.delete(handle).await,
            Backend::Remote(b) => b.delete(handle).await,
        }
    }

    async fn refresh_credentials(&self) -> StorageResult<()> {
        match self {
            Backend::Local(b) => b.refresh_credentials().await,
            Backend::Remote(b) => b.refresh_credentials().await,
        }
    }

    fn kind(&self) -> StorageKind {
        match self {
            Backend::Local(b) => b.kind(),
            Backend::Remote(b) => b.kind(),
        }
    }
}

impl From<LocalBackend> for Backend {
    fn from(b: LocalBackend) -> Self {
        Backend::Local(b)
    }
}

impl From<RemoteBackend> for Backend {
    fn from(b: RemoteBackend) -> Self {
        Backend::Remote(b)
    }
}

/// Generate a fresh `{uuid}.{ext}` handle.
pub fn new_handle(suggested_name: &str) -> String {
    format!("{}.{}", Uuid::new_v4(), extension_of(suggested_name))
}

/// Extension taken from a user-supplied name, or `bin`.
///
/// Only short ASCII-alphanumeric extensions are kept; they are lowercased.
fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|s| s.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 16)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

/// Reject handles that could escape the storage root.
pub(crate) fn check_handle(handle: &str) -> StorageResult<()> {
    if handle.len() < 3
        || handle.contains("..")
        || handle.contains('/')
        || handle.contains('\\')
        || handle.contains('\0')
    {
        return Err(StorageError::InvalidHandle(handle.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        for kind in StorageKind::ALL {
            assert_eq!(kind.as_str().parse::<StorageKind>().unwrap(), kind);
        }
        assert!("dropbox".parse::<StorageKind>().is_err());
        assert!("Local".parse::<StorageKind>().is_err());
    }

    #[test]
    fn test_required_fields() {
        assert!(StorageKind::Local.required_fields().is_empty());
        assert_eq!(
            StorageKind::Qcloud.required_fields(),
            &["secret_id", "secret_key", "region"]
        );
        assert_eq!(
            StorageKind::OneDrive.required_fields(),
            StorageKind::Huawei.required_fields()
        );
        assert!(!StorageKind::Local.is_remote());
        assert!(StorageKind::Aliyun.is_remote());
    }

    #[test]
    fn test_new_handle_shape() {
        let handle = new_handle("report.PDF");
        let (stem, ext) = handle.split_once('.').unwrap();
        assert!(Uuid::parse_str(stem).is_ok());
        assert_eq!(ext, "pdf");
        assert_ne!(new_handle("a.txt"), new_handle("a.txt"));
    }

    #[test]
    fn test_extension_fallbacks() {
        assert_eq!(extension_of("noext"), "bin");
        assert_eq!(extension_of(""), "bin");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("evil.p/hp"), "bin");
        assert_eq!(extension_of("weird.ex-t"), "bin");
        assert_eq!(extension_of("../../etc/passwd"), "bin");
    }

    #[test]
    fn test_check_handle() {
        assert!(check_handle("ab12.txt").is_ok());
        assert!(check_handle("../secret").is_err());
        assert!(check_handle("ab/cd.txt").is_err());
        assert!(check_handle("ab\\cd.txt").is_err());
        assert!(check_handle("").is_err());
    }
}
