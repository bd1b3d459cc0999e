//! Hangar - multi-tenant file hosting core
//!
//! Quota-accounted uploads, access-controlled downloads with signed direct
//! links, and pluggable local or remote storage backends.

pub mod access;
pub mod app;
pub mod auth;
pub mod config;
pub mod datetime;
pub mod db;
pub mod downloads;
pub mod error;
pub mod file;
pub mod logging;
pub mod provider;
pub mod quota;
pub mod stats;
pub mod storage;

pub use access::{
    authorize, Access, AccessPath, DenyReason, DirectLink, DirectLinkSigner, LinkGrant, Requester,
};
pub use app::Hangar;
pub use auth::{hash_password, verify_password, Accounts, Profile, RegistrationRequest};
pub use config::Config;
pub use db::{Database, NewUser, Principal, Role, User, UserRepository};
pub use downloads::{DownloadLogEntry, DownloadPage, RequestOrigin};
pub use error::{HangarError, Result};
pub use file::{
    Download, FilePage, FileRecord, FileRepository, FileService, ListQuery, SortKey, SortOrder,
    UploadRequest,
};
pub use provider::{NewProvider, ProviderCredentials, ProviderRegistry, ProviderUpdate};
pub use quota::{QuotaLedger, QuotaUsage};
pub use stats::StatsService;
pub use storage::{Backend, LocalBackend, RemoteBackend, StorageBackend, StorageError, StorageKind};
