//! Wire types for the DropLite HTTP API

use crate::error::{ClientError, ClientResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Storage readiness of a file as reported by the server.
///
/// Unknown values are kept verbatim so newer server states survive a
/// round trip through the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileStatus {
    Pending,
    Stored,
    Error,
    Failed,
    Deleted,
    Other(String),
}

impl FileStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Stored => "stored",
            FileStatus::Error => "error",
            FileStatus::Failed => "failed",
            FileStatus::Deleted => "deleted",
            FileStatus::Other(value) => value,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, FileStatus::Stored)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for FileStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => FileStatus::Pending,
            "stored" => FileStatus::Stored,
            "error" => FileStatus::Error,
            "failed" => FileStatus::Failed,
            "deleted" => FileStatus::Deleted,
            _ => FileStatus::Other(value),
        }
    }
}

impl From<&str> for FileStatus {
    fn from(value: &str) -> Self {
        value.to_string().into()
    }
}

impl From<FileStatus> for String {
    fn from(status: FileStatus) -> Self {
        match status {
            FileStatus::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

/// Server-authoritative metadata for one stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub original_name: String,
    #[serde(default)]
    pub mime_type: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub storage_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl FileRecord {
    /// Downloads are only allowed once the server reports `stored`.
    pub fn is_downloadable(&self) -> bool {
        self.status.is_stored()
    }

    /// `created_at` parsed as RFC 3339, `None` when the server sent something else.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// `{data: T}` success envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: Option<T>,
}

/// `{error?: string}` failure body.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Optional filters forwarded to `GET /files`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub statuses: Vec<FileStatus>,
}

impl ListQuery {
    pub fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        if let Some(limit) = self.limit {
            parts.push(format!("limit={}", limit));
        }
        if let Some(offset) = self.offset {
            parts.push(format!("offset={}", offset));
        }
        for status in &self.statuses {
            parts.push(format!("status={}", urlencoding::encode(status.as_str())));
        }
        parts.join("&")
    }
}

/// A local file selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

impl LocalFile {
    /// Resolve a path on disk into an upload candidate.
    pub async fn from_path(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ClientError::Validation(format!("File not found: {}", path.display()))
                }
                _ => ClientError::Validation(format!("Cannot read {}: {}", path.display(), e)),
            })?;

        if !metadata.is_file() {
            return Err(ClientError::Validation(format!(
                "Not a regular file: {}",
                path.display()
            )));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(LocalFile {
            path: path.to_path_buf(),
            name,
            size_bytes: metadata.len(),
            mime_type: guess_mime_type(path),
        })
    }
}

pub(crate) fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
