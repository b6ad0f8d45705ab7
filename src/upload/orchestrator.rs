//! Upload orchestration: one spawned task per submitted file

use super::registry::UploadTaskRegistry;
use super::types::UploadStatus;
use crate::api::{LocalFile, ProgressCallback, Transport};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::format::format_bytes;
use crate::store::FileListStore;
use chrono::Utc;
use log::{error, info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Limits applied to every submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_upload_bytes: u64,
    pub max_concurrent_uploads: usize,
    /// Terminal tasks older than this are pruned on the next submission.
    pub task_retention: Duration,
}

impl From<&ClientConfig> for UploadPolicy {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            max_concurrent_uploads: config.max_concurrent_uploads.max(1),
            task_retention: config.task_retention(),
        }
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        (&ClientConfig::default()).into()
    }
}

/// A submitted upload. Dropping the handle does not cancel the upload.
pub struct UploadHandle {
    task_id: String,
    join: JoinHandle<UploadStatus>,
}

impl UploadHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Wait for the terminal status. Resolves after the list refresh that a
    /// successful upload requests.
    pub async fn finished(self) -> UploadStatus {
        match self.join.await {
            Ok(status) => status,
            Err(e) => {
                error!("upload: task {} aborted: {}", self.task_id, e);
                UploadStatus::Error
            }
        }
    }
}

#[derive(Clone)]
pub struct UploadOrchestrator {
    transport: Arc<dyn Transport>,
    registry: Arc<UploadTaskRegistry>,
    store: FileListStore,
    permits: Arc<Semaphore>,
    policy: UploadPolicy,
}

impl UploadOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<UploadTaskRegistry>,
        store: FileListStore,
        policy: UploadPolicy,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(policy.max_concurrent_uploads.max(1)));
        Self {
            transport,
            registry,
            store,
            permits,
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<UploadTaskRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    fn validate(&self, file: &LocalFile) -> ClientResult<()> {
        if file.size_bytes > self.policy.max_upload_bytes {
            return Err(ClientError::Validation(format!(
                "{} is {}, larger than the {} upload limit",
                file.name,
                format_bytes(file.size_bytes as f64),
                format_bytes(self.policy.max_upload_bytes as f64)
            )));
        }
        Ok(())
    }

    fn prune_expired(&self) {
        let retention = chrono::Duration::from_std(self.policy.task_retention)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let removed = self.registry.prune_finished_before(Utc::now() - retention);
        if removed > 0 {
            info!("upload: pruned {} finished tasks", removed);
        }
    }

    /// Register a task for `file` and start uploading it in the background.
    pub fn submit(&self, file: LocalFile) -> ClientResult<UploadHandle> {
        self.validate(&file)?;
        self.prune_expired();

        let task = self.registry.create(&file);
        info!(
            "upload: {} queued ({}, {} bytes)",
            task.id, task.filename, file.size_bytes
        );

        let this = self.clone();
        let task_id = task.id.clone();
        let join = tokio::spawn(async move { this.run(task_id, file).await });

        Ok(UploadHandle {
            task_id: task.id,
            join,
        })
    }

    /// Submit a whole selection. Each file is validated and started on its
    /// own; one rejected file does not stop the others.
    pub fn submit_all(
        &self,
        files: Vec<LocalFile>,
    ) -> ClientResult<Vec<ClientResult<UploadHandle>>> {
        if files.is_empty() {
            return Err(ClientError::Validation("no file selected".to_string()));
        }
        Ok(files.into_iter().map(|file| self.submit(file)).collect())
    }

    /// Resolve paths on disk and submit them.
    pub async fn submit_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> ClientResult<Vec<ClientResult<UploadHandle>>> {
        if paths.is_empty() {
            return Err(ClientError::Validation("no file selected".to_string()));
        }

        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            let submitted = match LocalFile::from_path(path).await {
                Ok(file) => self.submit(file),
                Err(e) => Err(e),
            };
            results.push(submitted);
        }
        Ok(results)
    }

    async fn run(self, task_id: String, file: LocalFile) -> UploadStatus {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                self.registry.mark_failed(&task_id, format!("Upload queue closed: {}", e));
                return UploadStatus::Error;
            }
        };

        let registry = self.registry.clone();
        let progress_id = task_id.clone();
        let on_progress: ProgressCallback = Box::new(move |percent| {
            registry.apply_progress(&progress_id, percent);
        });

        let result = self.transport.upload(&file, on_progress).await;
        // The slot covers the transfer only; the list refresh runs outside it.
        drop(permit);

        match result {
            Ok(record) => {
                self.registry.mark_success(&task_id);
                info!(
                    "upload: {} stored as {} ({})",
                    task_id, record.id, record.original_name
                );
                if let Err(e) = self.store.invalidate().outcome().await {
                    warn!("upload: list refresh after {} failed: {}", task_id, e);
                }
                UploadStatus::Success
            }
            Err(e) => {
                self.registry.mark_failed(&task_id, e.user_message());
                UploadStatus::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{record, ScriptedTransport, UploadScript};
    use crate::api::{FileStatus, ListQuery};
    use std::path::PathBuf;

    const MB: u64 = 1024 * 1024;

    fn local(name: &str, size_bytes: u64) -> LocalFile {
        LocalFile {
            path: PathBuf::from(name),
            name: name.to_string(),
            size_bytes,
            mime_type: "application/octet-stream".to_string(),
        }
    }

    fn orchestrator(transport: &Arc<ScriptedTransport>, policy: UploadPolicy) -> UploadOrchestrator {
        let store = FileListStore::new(transport.clone(), ListQuery::default());
        UploadOrchestrator::new(
            transport.clone(),
            Arc::new(UploadTaskRegistry::new()),
            store,
            policy,
        )
    }

    #[tokio::test]
    async fn concurrent_uploads_settle_independently() {
        let transport = Arc::new(ScriptedTransport::new());
        let gate_b = Arc::new(Semaphore::new(0));
        transport.script_upload(
            "a.bin",
            UploadScript {
                progress: vec![10, 55, 100],
                outcome: Ok(record("a", "2024-06-01T00:00:00Z", FileStatus::Stored)),
                gate: None,
            },
        );
        transport.script_upload(
            "b.bin",
            UploadScript {
                progress: vec![5, 20],
                outcome: Ok(record("b", "2024-06-02T00:00:00Z", FileStatus::Stored)),
                gate: Some(gate_b.clone()),
            },
        );
        let uploads = orchestrator(&transport, UploadPolicy::default());
        let mut seen = uploads.registry().subscribe();

        let a = uploads.submit(local("a.bin", 2 * MB)).unwrap();
        let b = uploads.submit(local("b.bin", 10 * MB)).unwrap();
        let b_id = b.task_id().to_string();

        assert_eq!(a.finished().await, UploadStatus::Success);
        let b_task = uploads.registry().get(&b_id).unwrap();
        assert_eq!(b_task.status, UploadStatus::Uploading);
        assert_eq!(b_task.progress, 20);

        gate_b.add_permits(1);
        assert_eq!(b.finished().await, UploadStatus::Success);

        let tasks = seen.borrow_and_update().clone();
        assert_eq!(tasks.len(), 2);
        for task in tasks.iter() {
            assert_eq!(task.status, UploadStatus::Success);
            assert_eq!(task.progress, 100);
        }
    }

    #[tokio::test]
    async fn failed_upload_keeps_last_progress_and_message() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script_upload(
            "big.iso",
            UploadScript {
                progress: vec![12, 37],
                outcome: Err(ClientError::Http {
                    status: 413,
                    message: "file too large".to_string(),
                }),
                gate: None,
            },
        );
        let uploads = orchestrator(&transport, UploadPolicy::default());

        let handle = uploads.submit(local("big.iso", MB)).unwrap();
        let id = handle.task_id().to_string();
        assert_eq!(handle.finished().await, UploadStatus::Error);

        let task = uploads.registry().get(&id).unwrap();
        assert_eq!(task.progress, 37);
        assert_eq!(task.error.as_deref(), Some("file too large"));
        assert_eq!(transport.list_calls(), 0);
    }

    #[tokio::test]
    async fn success_requests_exactly_one_refresh() {
        let transport = Arc::new(ScriptedTransport::new());
        let uploads = orchestrator(&transport, UploadPolicy::default());

        let handle = uploads.submit(local("note.txt", 100)).unwrap();
        assert_eq!(handle.finished().await, UploadStatus::Success);

        assert_eq!(transport.list_calls(), 1);
        let snapshot = uploads.store.snapshot().unwrap();
        assert!(snapshot.find("note.txt").is_some());
    }

    #[tokio::test]
    async fn burst_of_completions_coalesces_refreshes() {
        let transport = Arc::new(ScriptedTransport::new());
        let list_gate = transport.gate_lists();
        let uploads = orchestrator(&transport, UploadPolicy::default());

        let handles: Vec<UploadHandle> = (0..4)
            .map(|i| uploads.submit(local(&format!("f{}.txt", i), 10)).unwrap())
            .collect();
        transport.wait_for_list_calls(1).await;
        // Let every upload finish and ask for its refresh while the first is held.
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }

        list_gate.add_permits(10);
        for handle in handles {
            assert_eq!(handle.finished().await, UploadStatus::Success);
        }

        assert!(transport.list_calls() <= 2);
        assert_eq!(uploads.store.snapshot().unwrap().files.len(), 4);
    }

    #[tokio::test]
    async fn oversized_and_empty_selections_are_rejected() {
        let transport = Arc::new(ScriptedTransport::new());
        let uploads = orchestrator(&transport, UploadPolicy::default());

        let err = uploads.submit(local("huge.bin", 101 * MB)).err().unwrap();
        assert!(matches!(err, ClientError::Validation(_)));

        let err = uploads.submit_all(Vec::new()).err().unwrap();
        assert_eq!(err, ClientError::Validation("no file selected".to_string()));

        assert!(uploads.registry().snapshot().is_empty());
        assert_eq!(transport.upload_calls(), 0);
    }

    #[tokio::test]
    async fn concurrency_is_capped_by_policy() {
        let transport = Arc::new(ScriptedTransport::new());
        let gate = Arc::new(Semaphore::new(0));
        for name in ["one.bin", "two.bin", "three.bin"] {
            transport.script_upload(
                name,
                UploadScript {
                    progress: vec![50],
                    outcome: Ok(record(name, "2024-06-01T00:00:00Z", FileStatus::Stored)),
                    gate: Some(gate.clone()),
                },
            );
        }
        let policy = UploadPolicy {
            max_concurrent_uploads: 1,
            ..UploadPolicy::default()
        };
        let uploads = orchestrator(&transport, policy);

        let handles = uploads
            .submit_all(vec![
                local("one.bin", 1),
                local("two.bin", 1),
                local("three.bin", 1),
            ])
            .unwrap();
        transport.wait_for_upload_calls(1).await;
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.upload_calls(), 1);
        assert_eq!(uploads.registry().snapshot().len(), 3);

        gate.add_permits(3);
        for handle in handles {
            assert_eq!(handle.unwrap().finished().await, UploadStatus::Success);
        }
        assert_eq!(transport.peak_uploads(), 1);
    }

    #[tokio::test]
    async fn pending_refresh_does_not_hold_an_upload_slot() {
        let transport = Arc::new(ScriptedTransport::new());
        let list_gate = transport.gate_lists();
        let policy = UploadPolicy {
            max_concurrent_uploads: 1,
            ..UploadPolicy::default()
        };
        let uploads = orchestrator(&transport, policy);

        let a = uploads.submit(local("a.txt", 10)).unwrap();
        let b = uploads.submit(local("b.txt", 10)).unwrap();
        let a_id = a.task_id().to_string();
        let b_id = b.task_id().to_string();

        // a is done and waiting on its list refresh, which stays blocked.
        transport.wait_for_list_calls(1).await;
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.upload_calls(), 2);
        assert_eq!(uploads.registry().get(&a_id).unwrap().status, UploadStatus::Success);
        assert_eq!(uploads.registry().get(&b_id).unwrap().status, UploadStatus::Success);

        list_gate.add_permits(10);
        assert_eq!(a.finished().await, UploadStatus::Success);
        assert_eq!(b.finished().await, UploadStatus::Success);
        assert_eq!(transport.peak_uploads(), 1);
    }

    #[tokio::test]
    async fn missing_paths_fail_validation_without_a_task() {
        let transport = Arc::new(ScriptedTransport::new());
        let uploads = orchestrator(&transport, UploadPolicy::default());

        let results = uploads
            .submit_paths(&[PathBuf::from("/no/such/upload.txt")])
            .await
            .unwrap();

        assert!(matches!(results[0], Err(ClientError::Validation(_))));
        assert!(uploads.registry().snapshot().is_empty());
    }
}
