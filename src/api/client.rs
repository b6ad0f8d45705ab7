//! reqwest transport and shared response handling

use super::credentials::CredentialProvider;
use super::{objects, upload};
use super::{DownloadBody, Envelope, ErrorBody, FileRecord, ListQuery, LocalFile, ProgressCallback, Transport};
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub(crate) const JSON: &str = "application/json";

pub struct HttpTransport {
    pub(crate) client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpTransport {
    pub fn new(base_url: &str, credentials: Arc<dyn CredentialProvider>) -> ClientResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, base_url, credentials))
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn files_url(&self) -> String {
        format!("{}/files", self.base_url)
    }

    pub(crate) fn file_url(&self, id: &str) -> String {
        format!("{}/files/{}", self.base_url, urlencoding::encode(id))
    }

    /// Attach the configured credential to a request.
    pub(crate) fn authorized(&self, request: RequestBuilder) -> ClientResult<RequestBuilder> {
        let value = self.credentials.authorization()?;
        Ok(request.header(AUTHORIZATION, value))
    }

    pub(crate) fn json_request(&self, request: RequestBuilder) -> ClientResult<RequestBuilder> {
        Ok(self.authorized(request)?.header(ACCEPT, JSON))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn upload(
        &self,
        file: &LocalFile,
        on_progress: ProgressCallback,
    ) -> ClientResult<FileRecord> {
        upload::upload_file(self, file, on_progress).await
    }

    async fn remove(&self, id: &str) -> ClientResult<()> {
        objects::delete_file(self, id).await
    }

    async fn list(&self, query: &ListQuery) -> ClientResult<Vec<FileRecord>> {
        objects::list_files(self, query).await
    }

    async fn fetch_download(&self, id: &str) -> ClientResult<DownloadBody> {
        objects::download_file(self, id).await
    }
}

/// Convert a non-2xx response into [`ClientError::Http`].
///
/// The message is the body's `error` field when present, otherwise `fallback`.
pub(crate) async fn read_error(response: Response, fallback: &str) -> ClientError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string());

    ClientError::Http { status, message }
}

/// Decode a `{data: T}` body. `data` may be absent or null.
pub(crate) async fn read_envelope<T: DeserializeOwned>(response: Response) -> ClientResult<Option<T>> {
    let text = response
        .text()
        .await
        .map_err(|e| ClientError::Network(format!("Failed to read response: {}", e)))?;

    let envelope: Envelope<T> =
        serde_json::from_str(&text).map_err(|e| ClientError::Parse(e.to_string()))?;

    Ok(envelope.data)
}
