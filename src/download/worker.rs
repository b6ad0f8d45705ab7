//! Download worker - streams a response body to disk with buffered writes

use super::types::{DownloadProgress, DownloadProgressCallback};
use crate::error::{ClientError, ClientResult};
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Write buffer size for downloads (2 MB) - reduces I/O operations
const WRITE_BUFFER_SIZE: usize = 2 * 1024 * 1024;

const FALLBACK_FILE_NAME: &str = "download";

/// Removes the file at `path` when dropped unless `keep` was called.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Strip path components so a server-supplied name can't escape the target directory.
pub(crate) fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_FILE_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// An existing directory receives `original_name`; anything else is used as the file path.
pub(crate) async fn resolve_destination(destination: &Path, original_name: &str) -> PathBuf {
    let is_dir = tokio::fs::metadata(destination)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if is_dir {
        destination.join(sanitize_file_name(original_name))
    } else {
        destination.to_path_buf()
    }
}

/// `dir/name` -> `dir/.name.part`
fn part_path_for(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
    destination.with_file_name(format!(".{}.part", name))
}

fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).min(100.0) as u8
}

/// Stream `body` into `destination`, returning the bytes written.
///
/// Bytes land in a sibling `.part` file that replaces `destination` only once
/// the whole body was written. On any error the `.part` file is removed and an
/// existing file at `destination` is left as it was.
pub(crate) async fn stream_to_file(
    mut body: BoxStream<'static, ClientResult<Bytes>>,
    destination: &Path,
    file_id: &str,
    total_bytes: u64,
    on_progress: Option<DownloadProgressCallback>,
) -> ClientResult<u64> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::Io(format!("Failed to create directory: {}", e)))?;
        }
    }

    let part_path = part_path_for(destination);
    let mut file = File::create(&part_path)
        .await
        .map_err(|e| ClientError::Io(format!("Failed to create file: {}", e)))?;
    let partial = PartialFile {
        path: part_path.clone(),
        armed: true,
    };

    let start_time = std::time::Instant::now();
    let mut downloaded: u64 = 0;
    let emit = |downloaded: u64, percent: u8| {
        if let Some(callback) = &on_progress {
            let elapsed = start_time.elapsed().as_secs_f64();
            callback(&DownloadProgress {
                file_id: file_id.to_string(),
                percent,
                downloaded_bytes: downloaded,
                total_bytes,
                speed: if elapsed > 0.0 {
                    downloaded as f64 / elapsed
                } else {
                    0.0
                },
            });
        }
    };

    let mut write_buffer = Vec::with_capacity(WRITE_BUFFER_SIZE);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        write_buffer.extend_from_slice(&chunk);
        downloaded += chunk.len() as u64;

        if write_buffer.len() >= WRITE_BUFFER_SIZE {
            file.write_all(&write_buffer)
                .await
                .map_err(|e| ClientError::Io(format!("Failed to write buffer: {}", e)))?;
            write_buffer.clear();
            emit(downloaded, percent_of(downloaded, total_bytes));
        }
    }

    if !write_buffer.is_empty() {
        file.write_all(&write_buffer)
            .await
            .map_err(|e| ClientError::Io(format!("Failed to write remaining buffer: {}", e)))?;
    }
    file.flush()
        .await
        .map_err(|e| ClientError::Io(format!("Failed to flush file: {}", e)))?;
    drop(file);

    tokio::fs::rename(&part_path, destination)
        .await
        .map_err(|e| ClientError::Io(format!("Failed to move download into place: {}", e)))?;
    partial.keep();
    emit(downloaded, 100);
    Ok(downloaded)
}
