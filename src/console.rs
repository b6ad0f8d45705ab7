//! File console
//!
//! Wires transport, list store, registries, orchestrator and download access
//! together and derives the rows a UI renders from the current snapshot.

use crate::api::credentials::provider_from_config;
use crate::api::{FileRecord, HttpTransport, ListQuery, Transport};
use crate::config::ClientConfig;
use crate::deletion::{DeletionRegistry, FileControls};
use crate::download::DownloadAccess;
use crate::error::ClientResult;
use crate::format::format_bytes;
use crate::store::{FileListSnapshot, FileListStore};
use crate::upload::{UploadOrchestrator, UploadPolicy, UploadTaskRegistry};
use log::debug;
use serde::Serialize;
use std::sync::Arc;

/// One rendered line of the file list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRow {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: String,
    pub status: String,
    pub created_at: String,
    pub controls: FileControls,
}

pub struct FileConsole {
    transport: Arc<dyn Transport>,
    store: FileListStore,
    uploads: UploadOrchestrator,
    deletions: Arc<DeletionRegistry>,
    downloads: DownloadAccess,
}

impl FileConsole {
    pub fn from_config(config: &ClientConfig, query: ListQuery) -> ClientResult<Self> {
        config.validate()?;
        let credentials = provider_from_config(&config.credential);
        debug!(
            "console: {} auth against {}",
            credentials.scheme(),
            config.api_base
        );
        let transport = HttpTransport::new(&config.api_base, credentials)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            query,
            UploadPolicy::from(config),
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        query: ListQuery,
        policy: UploadPolicy,
    ) -> Self {
        let store = FileListStore::new(transport.clone(), query);
        let registry = Arc::new(UploadTaskRegistry::new());
        let uploads =
            UploadOrchestrator::new(transport.clone(), registry, store.clone(), policy);
        let deletions = Arc::new(DeletionRegistry::new(transport.clone(), store.clone()));
        let downloads = DownloadAccess::new(transport.clone(), deletions.clone());
        Self {
            transport,
            store,
            uploads,
            deletions,
            downloads,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn store(&self) -> &FileListStore {
        &self.store
    }

    pub fn uploads(&self) -> &UploadOrchestrator {
        &self.uploads
    }

    pub fn deletions(&self) -> &Arc<DeletionRegistry> {
        &self.deletions
    }

    pub fn downloads(&self) -> &DownloadAccess {
        &self.downloads
    }

    /// Fetch the list now and return the new snapshot.
    pub async fn refresh(&self) -> ClientResult<Arc<FileListSnapshot>> {
        self.store.fetch().await
    }

    /// Rows for the last-known-good snapshot, newest first. Empty before the
    /// first successful fetch.
    pub fn rows(&self) -> Vec<FileRow> {
        let Some(snapshot) = self.store.snapshot() else {
            return Vec::new();
        };
        snapshot.files.iter().map(|file| self.row(file)).collect()
    }

    pub fn find(&self, id: &str) -> Option<FileRecord> {
        self.store.snapshot()?.find(id).cloned()
    }

    fn row(&self, file: &FileRecord) -> FileRow {
        FileRow {
            id: file.id.clone(),
            name: file.original_name.clone(),
            mime_type: file.mime_type.clone(),
            size: format_bytes(file.size_bytes as f64),
            status: file.status.to_string(),
            created_at: file
                .created_at_utc()
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| file.created_at.clone()),
            controls: self.deletions.controls(file),
        }
    }
}
