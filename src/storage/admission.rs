//! Upload admission checks, applied before any quota or bytes are touched.

use crate::{HangarError, Result};

/// Content types accepted for upload.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "video/mp4",
    "video/webm",
    "video/quicktime",
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "application/zip",
    "application/x-rar-compressed",
    "text/plain",
    "text/csv",
    "application/json",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// Size and type limits for uploads.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_size: u64,
}

impl UploadPolicy {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Check an upload and return the normalized content type.
    pub fn admit(&self, filename: &str, content_type: &str, size: u64) -> Result<String> {
        if filename.trim().is_empty() {
            return Err(HangarError::Validation("filename is empty".to_string()));
        }
        if size > self.max_file_size {
            return Err(HangarError::Validation(format!(
                "file is {size} bytes, the limit is {} bytes",
                self.max_file_size
            )));
        }

        let mime = normalize_mime(content_type);
        if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(HangarError::UnsupportedMediaType(content_type.to_string()));
        }
        Ok(mime)
    }
}

/// Strip parameters and lowercase: `Text/Plain; charset=utf-8` → `text/plain`.
fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
