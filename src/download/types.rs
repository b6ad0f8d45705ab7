//! Download progress and result payloads

use serde::Serialize;
use std::path::PathBuf;

/// Progress snapshot emitted on every buffer flush and once at completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub file_id: String,
    pub percent: u8,
    pub downloaded_bytes: u64,
    /// Zero when the server sent no length and the record has no size.
    pub total_bytes: u64,
    pub speed: f64, // bytes per second
}

pub type DownloadProgressCallback = Box<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Where a finished download landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub file_id: String,
    pub destination: PathBuf,
    pub bytes_written: u64,
}
