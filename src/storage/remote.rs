//! Remote backends on top of `object_store`.
//!
//! Tencent COS (`qcloud`) speaks the S3 protocol. The OAuth drives
//! (`aliyun`, `huawei`, `onedrive`) are reached through an HTTP/WebDAV
//! endpoint using the bearer token their OAuth flow produced.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use object_store::aws::AmazonS3Builder;
use object_store::http::HttpBuilder;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ClientOptions, Error as ObjectStoreError, ObjectStore, ObjectStoreExt, PutPayload};
use tracing::{debug, error, info};

use super::{check_handle, ByteStream, StorageBackend, StorageError, StorageKind, StorageResult};
use crate::provider::ProviderCredentials;

/// A provider-backed object store.
#[derive(Clone)]
pub struct RemoteBackend {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
}

impl RemoteBackend {
    /// Wrap an existing store.
    pub fn new(kind: StorageKind, store: Arc<dyn ObjectStore>) -> Self {
        Self { kind, store }
    }

    /// Backend over a process-local in-memory store.
    pub fn in_memory(kind: StorageKind) -> Self {
        Self::new(kind, Arc::new(InMemory::new()))
    }

    /// Build the client for a configured provider.
    ///
    /// Fails with `Config` when the provider lacks the settings needed to
    /// connect (bucket, endpoint, or an OAuth token not yet issued).
    pub fn open(kind: StorageKind, credentials: &ProviderCredentials) -> StorageResult<Self> {
        let store: Arc<dyn ObjectStore> = match kind {
            StorageKind::Local => {
                return Err(StorageError::Config(
                    "local storage is not a remote backend".to_string(),
                ))
            }
            StorageKind::Qcloud => Arc::new(Self::build_cos(credentials)?),
            StorageKind::Aliyun | StorageKind::Huawei | StorageKind::OneDrive => {
                Arc::new(Self::build_drive(kind, credentials)?)
            }
        };

        debug!(kind = %kind, "Remote backend opened");
        Ok(Self::new(kind, store))
    }

    fn build_cos(credentials: &ProviderCredentials) -> StorageResult<object_store::aws::AmazonS3> {
        let secret_id = require(credentials, "secret_id")?;
        let secret_key = require(credentials, "secret_key")?;
        let region = require(credentials, "region")?;
        let bucket = require(credentials, "bucket")?;
        let endpoint = credentials
            .get("endpoint")
            .map(str::to_string)
            .unwrap_or_else(|| format!("https://{bucket}.cos.{region}.myqcloud.com"));

        AmazonS3Builder::new()
            .with_access_key_id(secret_id)
            .with_secret_access_key(secret_key)
            .with_region(region)
            .with_bucket_name(bucket)
            .with_allow_http(endpoint.starts_with("http://"))
            .with_endpoint(endpoint)
            .with_virtual_hosted_style_request(true)
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))
    }

    fn build_drive(
        kind: StorageKind,
        credentials: &ProviderCredentials,
    ) -> StorageResult<object_store::http::HttpStore> {
        let endpoint = credentials.get("endpoint").ok_or_else(|| {
            StorageError::Config(format!("{kind} provider has no endpoint configured"))
        })?;
        let token = credentials.get("access_token").ok_or_else(|| {
            StorageError::Config(format!(
                "{kind} provider has no access token; complete the OAuth flow first"
            ))
        })?;

        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| StorageError::Config(format!("invalid access token: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        HttpBuilder::new()
            .with_url(endpoint)
            .with_client_options(ClientOptions::new().with_default_headers(headers))
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))
    }

    fn location(handle: &str) -> StorageResult<Path> {
        check_handle(handle)?;
        Ok(Path::from(handle))
    }
}

fn require<'c>(credentials: &'c ProviderCredentials, field: &str) -> StorageResult<&'c str> {
    credentials
        .get(field)
        .ok_or_else(|| StorageError::Config(format!("missing provider field: {field}")))
}

impl fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("kind", &self.kind)
            .field("store", &self.store.to_string())
            .finish()
    }
}

#[async_trait]
impl StorageBackend for RemoteBackend {
    async fn write(&self, handle: &str, content: Bytes) -> StorageResult<()> {
        let location = Self::location(handle)?;
        let size = content.len();
        let start = Instant::now();

        self.store
            .put(&location, PutPayload::from(content))
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    kind = %self.kind,
                    handle = %handle,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Remote upload failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        info!(
            kind = %self.kind,
            handle = %handle,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Remote upload successful"
        );
        Ok(())
    }

    async fn get(&self, handle: &str) -> StorageResult<ByteStream> {
        let location = Self::location(handle)?;

        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(handle.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;

        let kind = self.kind;
        let handle = handle.to_string();
        let stream = result.into_stream().map(move |chunk| {
            chunk.map_err(|e| {
                error!(error = %e, kind = %kind, handle = %handle, "Remote stream error");
                StorageError::DownloadFailed(e.to_string())
            })
        });
        Ok(stream.boxed())
    }

    async fn delete(&self, handle: &str) -> StorageResult<()> {
        let location = Self::location(handle)?;

        // Some stores treat deleting a missing key as success.
        match self.store.head(&location).await {
            Ok(_) => {}
            Err(ObjectStoreError::NotFound { .. }) => {
                return Err(StorageError::NotFound(handle.to_string()))
            }
            Err(e) => return Err(StorageError::DeleteFailed(e.to_string())),
        }

        self.store
            .delete(&location)
            .await
            .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

        info!(kind = %self.kind, handle = %handle, "Remote delete successful");
        Ok(())
    }

    async fn refresh_credentials(&self) -> StorageResult<()> {
        info!(kind = %self.kind, "Credential refresh requested; completed by the provider OAuth flow");
        Ok(())
    }

    fn kind(&self) -> StorageKind {
        self.kind
    }
}
