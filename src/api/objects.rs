//! File operations (list, delete, download)

use super::client::{read_envelope, read_error, HttpTransport};
use super::{DownloadBody, FileRecord, ListQuery};
use crate::error::{ClientError, ClientResult};
use futures_util::{StreamExt, TryStreamExt};

/// List files in server order
pub(crate) async fn list_files(
    transport: &HttpTransport,
    query: &ListQuery,
) -> ClientResult<Vec<FileRecord>> {
    let mut url = transport.files_url();
    let query_string = query.to_query_string();
    if !query_string.is_empty() {
        url.push('?');
        url.push_str(&query_string);
    }

    let response = transport
        .json_request(transport.client.get(&url))?
        .send()
        .await
        .map_err(|e| ClientError::Network(format!("List request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(read_error(response, "failed to fetch file list").await);
    }

    Ok(read_envelope::<Vec<FileRecord>>(response)
        .await?
        .unwrap_or_default())
}

/// Delete a single file
pub(crate) async fn delete_file(transport: &HttpTransport, id: &str) -> ClientResult<()> {
    let response = transport
        .json_request(transport.client.delete(transport.file_url(id)))?
        .send()
        .await
        .map_err(|e| ClientError::Network(format!("Delete request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(read_error(response, "delete failed").await);
    }

    Ok(())
}

/// Open the raw byte stream of a stored file
pub(crate) async fn download_file(transport: &HttpTransport, id: &str) -> ClientResult<DownloadBody> {
    let url = format!("{}/download", transport.file_url(id));
    let response = transport
        .authorized(transport.client.get(&url))?
        .send()
        .await
        .map_err(|e| ClientError::Network(format!("Download request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(read_error(response, "download failed").await);
    }

    let content_length = response.content_length();
    let stream = response
        .bytes_stream()
        .map_err(|e| ClientError::Network(format!("Failed to read chunk: {}", e)))
        .boxed();

    Ok(DownloadBody {
        content_length,
        stream,
    })
}
