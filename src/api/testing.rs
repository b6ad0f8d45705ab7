//! Scripted in-memory transport for orchestration tests.

use super::{DownloadBody, FileRecord, FileStatus, ListQuery, LocalFile, ProgressCallback, Transport};
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub(crate) fn record(id: &str, created_at: &str, status: FileStatus) -> FileRecord {
    FileRecord {
        id: id.to_string(),
        original_name: format!("{}.bin", id),
        mime_type: "application/octet-stream".to_string(),
        size_bytes: 1024,
        storage_path: format!("objects/{}", id),
        checksum: None,
        status,
        metadata: None,
        created_at: created_at.to_string(),
        updated_at: None,
        expires_at: None,
    }
}

/// How one upload (matched by file name) behaves.
pub(crate) struct UploadScript {
    pub progress: Vec<u8>,
    pub outcome: ClientResult<FileRecord>,
    /// When set, the upload holds after its progress steps until a permit is added.
    pub gate: Option<Arc<Semaphore>>,
}

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    files: Mutex<Vec<FileRecord>>,
    list_failures: Mutex<VecDeque<ClientError>>,
    list_gate: Mutex<Option<Arc<Semaphore>>>,
    uploads: Mutex<HashMap<String, UploadScript>>,
    removals: Mutex<HashMap<String, ClientError>>,
    remove_gate: Mutex<Option<Arc<Semaphore>>>,
    downloads: Mutex<HashMap<String, Vec<ClientResult<Bytes>>>>,
    list_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    download_calls: AtomicUsize,
    active_uploads: AtomicUsize,
    peak_uploads: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_files(&self, files: Vec<FileRecord>) {
        *self.files.lock().unwrap() = files;
    }

    pub fn fail_next_list(&self, err: ClientError) {
        self.list_failures.lock().unwrap().push_back(err);
    }

    /// Every list call waits for one permit from the returned semaphore.
    pub fn gate_lists(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.list_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Every remove call waits for one permit from the returned semaphore.
    pub fn gate_removals(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.remove_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn script_upload(&self, name: &str, script: UploadScript) {
        self.uploads.lock().unwrap().insert(name.to_string(), script);
    }

    pub fn fail_removal(&self, id: &str, err: ClientError) {
        self.removals.lock().unwrap().insert(id.to_string(), err);
    }

    pub fn set_download(&self, id: &str, chunks: Vec<ClientResult<Bytes>>) {
        self.downloads.lock().unwrap().insert(id.to_string(), chunks);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn peak_uploads(&self) -> usize {
        self.peak_uploads.load(Ordering::SeqCst)
    }

    pub async fn wait_for_list_calls(&self, count: usize) {
        while self.list_calls() < count {
            tokio::task::yield_now().await;
        }
    }

    pub async fn wait_for_upload_calls(&self, count: usize) {
        while self.upload_calls() < count {
            tokio::task::yield_now().await;
        }
    }

    pub async fn wait_for_remove_calls(&self, count: usize) {
        while self.remove_calls() < count {
            tokio::task::yield_now().await;
        }
    }
}

async fn pass_gate(gate: Option<Arc<Semaphore>>) {
    if let Some(gate) = gate {
        if let Ok(permit) = gate.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn upload(
        &self,
        file: &LocalFile,
        on_progress: ProgressCallback,
    ) -> ClientResult<FileRecord> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active_uploads.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_uploads.fetch_max(active, Ordering::SeqCst);

        let script = self.uploads.lock().unwrap().remove(&file.name);
        let script = script.unwrap_or_else(|| UploadScript {
            progress: vec![50, 100],
            outcome: Ok(record(&file.name, "2024-06-01T00:00:00Z", FileStatus::Stored)),
            gate: None,
        });

        for percent in script.progress {
            on_progress(percent);
            tokio::task::yield_now().await;
        }
        pass_gate(script.gate).await;

        if let Ok(created) = &script.outcome {
            self.files.lock().unwrap().push(created.clone());
        }
        self.active_uploads.fetch_sub(1, Ordering::SeqCst);
        script.outcome
    }

    async fn remove(&self, id: &str) -> ClientResult<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.remove_gate.lock().unwrap().clone();
        pass_gate(gate).await;

        if let Some(err) = self.removals.lock().unwrap().remove(id) {
            return Err(err);
        }
        self.files.lock().unwrap().retain(|file| file.id != id);
        Ok(())
    }

    async fn list(&self, _query: &ListQuery) -> ClientResult<Vec<FileRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.list_gate.lock().unwrap().clone();
        pass_gate(gate).await;

        if let Some(err) = self.list_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.files.lock().unwrap().clone())
    }

    async fn fetch_download(&self, id: &str) -> ClientResult<DownloadBody> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        let chunks = self
            .downloads
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| ClientError::Http {
                status: 404,
                message: "file not found".to_string(),
            })?;

        let content_length = chunks
            .iter()
            .map(|chunk| chunk.as_ref().map(|b| b.len() as u64).unwrap_or(0))
            .sum();
        Ok(DownloadBody {
            content_length: Some(content_length),
            stream: futures_util::stream::iter(chunks).boxed(),
        })
    }
}
