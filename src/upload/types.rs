//! Upload task types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, UploadStatus::Uploading)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One upload attempt. Lives only in memory for the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadTask {
    pub id: String,
    pub filename: String,
    pub size_bytes: u64,
    /// Whole percent, 0..=100.
    pub progress: u8,
    pub status: UploadStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
