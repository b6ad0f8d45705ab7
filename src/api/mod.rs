//! DropLite HTTP API module
//!
//! This module is organized into submodules:
//! - `types`: Wire types (file records, envelopes, list filters, local files)
//! - `credentials`: Authorization header providers
//! - `client`: reqwest-backed [`HttpTransport`] and response helpers
//! - `upload`: Streaming multipart upload with progress
//! - `objects`: List, delete and download requests

mod client;
pub mod credentials;
mod objects;
mod types;
mod upload;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::ClientResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

pub use client::HttpTransport;
pub use credentials::{ApiKeyCredential, BearerCredential, CredentialProvider};
pub use types::{FileRecord, FileStatus, ListQuery, LocalFile};
pub(crate) use types::{Envelope, ErrorBody};

/// Upload progress sink, called with a whole percentage in `0..=100`.
pub type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;

/// Raw bytes of a download, as they arrive.
pub struct DownloadBody {
    pub content_length: Option<u64>,
    pub stream: BoxStream<'static, ClientResult<Bytes>>,
}

/// One request per call against the DropLite API.
///
/// No timeout or cancellation: once a call starts it runs to completion.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `POST /files` with the file as multipart field `file`.
    async fn upload(&self, file: &LocalFile, on_progress: ProgressCallback)
        -> ClientResult<FileRecord>;

    /// `DELETE /files/{id}`
    async fn remove(&self, id: &str) -> ClientResult<()>;

    /// `GET /files`, in server order.
    async fn list(&self, query: &ListQuery) -> ClientResult<Vec<FileRecord>>;

    /// `GET /files/{id}/download`
    async fn fetch_download(&self, id: &str) -> ClientResult<DownloadBody>;
}
