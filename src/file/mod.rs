//! File management module for Hangar.
//!
//! This module provides the file catalog and the operations on it:
//! - File records with ownership, visibility and expiry
//! - Paged, sorted and searchable listings
//! - Upload, download, direct links and deletion through [`FileService`]

mod query;
mod record;
mod service;

pub use query::{FilePage, ListQuery, SortKey, SortOrder, DEFAULT_LIMIT, MAX_LIMIT};
pub(crate) use record::FILE_COLUMNS;
pub use record::{FileRecord, FileRepository, NewFileRecord};
pub use service::{Download, FileService, UploadRequest};
