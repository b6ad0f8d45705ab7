//! File download module
//!
//! - `types`: Progress and report payloads
//! - `worker`: Streams a response body into the save target with buffered writes
//!
//! `DownloadAccess` applies the status gate and the deleting check before any
//! request is made.

mod types;
mod worker;

pub use types::{DownloadProgress, DownloadProgressCallback, DownloadReport};

use crate::api::{FileRecord, Transport};
use crate::deletion::DeletionRegistry;
use crate::error::{ClientError, ClientResult};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

pub struct DownloadAccess {
    transport: Arc<dyn Transport>,
    deletions: Arc<DeletionRegistry>,
}

impl DownloadAccess {
    pub fn new(transport: Arc<dyn Transport>, deletions: Arc<DeletionRegistry>) -> Self {
        Self {
            transport,
            deletions,
        }
    }

    /// Save the bytes of `file` to `destination`.
    ///
    /// A directory destination receives the file under its original name.
    pub async fn download(
        &self,
        file: &FileRecord,
        destination: &Path,
        on_progress: Option<DownloadProgressCallback>,
    ) -> ClientResult<DownloadReport> {
        if !file.is_downloadable() {
            return Err(ClientError::Precondition(format!(
                "file {} is {}; only stored files can be downloaded",
                file.id, file.status
            )));
        }
        if self.deletions.is_deleting(&file.id) {
            return Err(ClientError::Precondition(format!(
                "file {} is being deleted",
                file.id
            )));
        }

        let target = worker::resolve_destination(destination, &file.original_name).await;
        info!("download: {} -> {}", file.id, target.display());

        let body = self.transport.fetch_download(&file.id).await?;
        let size_hint = body.content_length.unwrap_or(file.size_bytes);

        match worker::stream_to_file(body.stream, &target, &file.id, size_hint, on_progress).await {
            Ok(bytes_written) => {
                info!("download: {} done bytes={}", file.id, bytes_written);
                Ok(DownloadReport {
                    file_id: file.id.clone(),
                    destination: target,
                    bytes_written,
                })
            }
            Err(e) => {
                warn!("download: {} failed: {}", file.id, e);
                Err(e)
            }
        }
    }
}
