//! Deletion registry
//!
//! Tracks ids with a delete in flight. While an id is in the set its
//! download and delete controls are disabled, and a second delete for it is
//! rejected without touching the network.

use crate::api::{FileRecord, Transport};
use crate::error::{ClientError, ClientResult};
use crate::store::FileListStore;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

pub type DeletingSnapshot = Arc<HashSet<String>>;

/// User confirmation step in front of every delete.
pub trait Confirm: Send + Sync {
    fn confirm_delete(&self, file: &FileRecord) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&FileRecord) -> bool + Send + Sync,
{
    fn confirm_delete(&self, file: &FileRecord) -> bool {
        self(file)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The user declined; nothing was sent.
    Declined,
}

/// Which row actions a UI may offer for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileControls {
    pub can_download: bool,
    pub can_delete: bool,
    pub deleting: bool,
}

pub struct DeletionRegistry {
    transport: Arc<dyn Transport>,
    store: FileListStore,
    deleting: Mutex<HashSet<String>>,
    snapshots: watch::Sender<DeletingSnapshot>,
}

/// Removes its id from the deleting set when dropped, on every exit path.
struct DeletingGuard<'a> {
    registry: &'a DeletionRegistry,
    id: String,
}

impl Drop for DeletingGuard<'_> {
    fn drop(&mut self) {
        let mut deleting = self.registry.lock_deleting();
        if deleting.remove(&self.id) {
            self.registry.publish(&deleting);
        }
    }
}

impl DeletionRegistry {
    pub fn new(transport: Arc<dyn Transport>, store: FileListStore) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(HashSet::new()));
        Self {
            transport,
            store,
            deleting: Mutex::new(HashSet::new()),
            snapshots,
        }
    }

    fn lock_deleting(&self) -> MutexGuard<'_, HashSet<String>> {
        self.deleting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, deleting: &HashSet<String>) {
        self.snapshots.send_replace(Arc::new(deleting.clone()));
    }

    fn begin(&self, id: &str) -> ClientResult<DeletingGuard<'_>> {
        let mut deleting = self.lock_deleting();
        if !deleting.insert(id.to_string()) {
            return Err(ClientError::DeleteInProgress(id.to_string()));
        }
        self.publish(&deleting);
        Ok(DeletingGuard {
            registry: self,
            id: id.to_string(),
        })
    }

    pub fn is_deleting(&self, id: &str) -> bool {
        self.lock_deleting().contains(id)
    }

    pub fn controls(&self, file: &FileRecord) -> FileControls {
        let deleting = self.is_deleting(&file.id);
        FileControls {
            can_download: file.is_downloadable() && !deleting,
            can_delete: !deleting,
            deleting,
        }
    }

    pub fn snapshot(&self) -> DeletingSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeletingSnapshot> {
        self.snapshots.subscribe()
    }

    /// Confirm, then delete `file` on the server.
    ///
    /// On success the file list is refreshed before returning. On failure the
    /// list is left untouched and the server's message is returned.
    pub async fn delete(&self, file: &FileRecord, confirm: &dyn Confirm) -> ClientResult<DeleteOutcome> {
        if self.is_deleting(&file.id) {
            return Err(ClientError::DeleteInProgress(file.id.clone()));
        }
        if !confirm.confirm_delete(file) {
            info!("delete: {} declined", file.id);
            return Ok(DeleteOutcome::Declined);
        }

        let guard = self.begin(&file.id)?;
        info!("delete: {} ({}) started", file.id, file.original_name);
        let result = self.transport.remove(&file.id).await;
        drop(guard);

        match result {
            Ok(()) => {
                info!("delete: {} done", file.id);
                if let Err(e) = self.store.invalidate().outcome().await {
                    warn!("delete: list refresh after {} failed: {}", file.id, e);
                }
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) => {
                warn!("delete: {} failed: {}", file.id, e);
                Err(e)
            }
        }
    }
}
