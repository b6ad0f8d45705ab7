//! Streaming multipart upload

use super::client::{read_envelope, read_error, HttpTransport};
use super::{FileRecord, LocalFile, ProgressCallback};
use crate::error::{ClientError, ClientResult};
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Read size for the request body stream (256 KB)
const CHUNK_SIZE: usize = 256 * 1024;

/// Turns bytes handed to the HTTP body into whole-percent progress events.
pub(crate) struct ProgressTracker {
    sent: u64,
    total: u64,
    last_percent: Option<u8>,
    on_progress: ProgressCallback,
}

impl ProgressTracker {
    pub(crate) fn new(total: u64, on_progress: ProgressCallback) -> Self {
        Self {
            sent: 0,
            total,
            last_percent: None,
            on_progress,
        }
    }

    /// Record `len` more bytes sent. Reports only when the length is known
    /// and the rounded percentage changed.
    pub(crate) fn advance(&mut self, len: usize) {
        if self.total == 0 {
            return;
        }
        self.sent = self.sent.saturating_add(len as u64);
        let percent = ((self.sent as f64 / self.total as f64) * 100.0).round().min(100.0) as u8;
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            (self.on_progress)(percent);
        }
    }
}

/// Upload one file as multipart field `file`, reporting progress while the
/// body streams from disk.
pub(crate) async fn upload_file(
    transport: &HttpTransport,
    file: &LocalFile,
    on_progress: ProgressCallback,
) -> ClientResult<FileRecord> {
    let handle = File::open(&file.path)
        .await
        .map_err(|e| ClientError::Io(format!("Failed to open {}: {}", file.path.display(), e)))?;

    let mut tracker = ProgressTracker::new(file.size_bytes, on_progress);
    let stream = ReaderStream::with_capacity(handle, CHUNK_SIZE).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            tracker.advance(bytes.len());
        }
        chunk
    });

    let part = Part::stream_with_length(Body::wrap_stream(stream), file.size_bytes)
        .file_name(file.name.clone())
        .mime_str(&file.mime_type)
        .map_err(|e| ClientError::Validation(format!("Invalid mime type {}: {}", file.mime_type, e)))?;
    let form = Form::new().part("file", part);

    log::debug!(
        "upload: POST {} ({}, {} bytes)",
        transport.files_url(),
        file.name,
        file.size_bytes
    );

    let response = transport
        .json_request(transport.client.post(transport.files_url()))?
        .multipart(form)
        .send()
        .await
        .map_err(|e| ClientError::Network(format!("Upload request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(read_error(response, "upload failed").await);
    }

    read_envelope::<FileRecord>(response)
        .await?
        .ok_or_else(|| ClientError::Parse("server returned no file record".to_string()))
}
