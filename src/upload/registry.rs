//! In-memory upload task registry
//!
//! Every command is an atomic read-modify-write of one task under the
//! registry lock, followed by publishing a fresh immutable snapshot.

use super::types::{UploadStatus, UploadTask};
use crate::api::LocalFile;
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

pub type TaskSnapshot = Arc<Vec<UploadTask>>;

pub struct UploadTaskRegistry {
    tasks: Mutex<Vec<UploadTask>>,
    snapshots: watch::Sender<TaskSnapshot>,
    next_id: AtomicU64,
}

impl Default for UploadTaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadTaskRegistry {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            tasks: Mutex::new(Vec::new()),
            snapshots,
            next_id: AtomicU64::new(1),
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<UploadTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, tasks: &[UploadTask]) {
        self.snapshots.send_replace(Arc::new(tasks.to_vec()));
    }

    /// Apply `change` to task `id` if it exists; publish when it reports a change.
    fn update(&self, id: &str, change: impl FnOnce(&mut UploadTask) -> bool) -> bool {
        let mut tasks = self.lock_tasks();
        let changed = match tasks.iter_mut().find(|task| task.id == id) {
            Some(task) => change(task),
            None => {
                warn!("upload_registry: no task {}", id);
                false
            }
        };
        if changed {
            self.publish(&tasks);
        }
        changed
    }

    /// Register a new `uploading` task at 0% and return it.
    pub fn create(&self, file: &LocalFile) -> UploadTask {
        let sequence = self.next_id.fetch_add(1, Ordering::SeqCst);
        let task = UploadTask {
            id: format!("upload-{}", sequence),
            filename: file.name.clone(),
            size_bytes: file.size_bytes,
            progress: 0,
            status: UploadStatus::Uploading,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        };

        let mut tasks = self.lock_tasks();
        tasks.push(task.clone());
        self.publish(&tasks);
        task
    }

    /// Raise progress of an uploading task. Late or backwards events are dropped.
    pub fn apply_progress(&self, id: &str, percent: u8) -> bool {
        let percent = percent.min(100);
        self.update(id, |task| {
            if task.status != UploadStatus::Uploading || percent <= task.progress {
                return false;
            }
            task.progress = percent;
            true
        })
    }

    pub fn mark_success(&self, id: &str) -> bool {
        self.update(id, |task| {
            if task.status.is_terminal() {
                return false;
            }
            task.progress = 100;
            task.status = UploadStatus::Success;
            task.finished_at = Some(Utc::now());
            info!("upload_status: {} -> success", task.id);
            true
        })
    }

    /// Progress stays at its last observed value.
    pub fn mark_failed(&self, id: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(id, |task| {
            if task.status.is_terminal() {
                return false;
            }
            warn!("upload_status: {} -> error error={}", task.id, message);
            task.status = UploadStatus::Error;
            task.error = Some(message);
            task.finished_at = Some(Utc::now());
            true
        })
    }

    pub fn get(&self, id: &str) -> Option<UploadTask> {
        self.lock_tasks().iter().find(|task| task.id == id).cloned()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.snapshots.subscribe()
    }

    /// Drop terminal tasks that finished before `cutoff`.
    pub fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        self.remove_where(|task| matches!(task.finished_at, Some(at) if at < cutoff))
    }

    /// Drop every terminal task.
    pub fn clear_finished(&self) -> usize {
        self.remove_where(|task| task.status.is_terminal())
    }

    fn remove_where(&self, predicate: impl Fn(&UploadTask) -> bool) -> usize {
        let mut tasks = self.lock_tasks();
        let before = tasks.len();
        tasks.retain(|task| !predicate(task));
        let removed = before - tasks.len();
        if removed > 0 {
            self.publish(&tasks);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn local(name: &str) -> LocalFile {
        LocalFile {
            path: PathBuf::from(name),
            name: name.to_string(),
            size_bytes: 10,
            mime_type: "text/plain".to_string(),
        }
    }

    #[test]
    fn ids_are_unique_and_tasks_start_uploading() {
        let registry = UploadTaskRegistry::new();
        let a = registry.create(&local("a.txt"));
        let b = registry.create(&local("a.txt"));

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, UploadStatus::Uploading);
        assert_eq!(a.progress, 0);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn progress_never_moves_backwards() {
        let registry = UploadTaskRegistry::new();
        let task = registry.create(&local("a.txt"));

        assert!(registry.apply_progress(&task.id, 40));
        assert!(!registry.apply_progress(&task.id, 30));
        assert!(!registry.apply_progress(&task.id, 40));
        assert!(registry.apply_progress(&task.id, 250));

        assert_eq!(registry.get(&task.id).unwrap().progress, 100);
    }

    #[test]
    fn terminal_tasks_ignore_late_events() {
        let registry = UploadTaskRegistry::new();
        let task = registry.create(&local("a.txt"));
        registry.apply_progress(&task.id, 35);

        assert!(registry.mark_failed(&task.id, "upload failed"));
        assert!(!registry.apply_progress(&task.id, 90));
        assert!(!registry.mark_success(&task.id));
        assert!(!registry.mark_failed(&task.id, "again"));

        let task = registry.get(&task.id).unwrap();
        assert_eq!(task.status, UploadStatus::Error);
        assert_eq!(task.progress, 35);
        assert_eq!(task.error.as_deref(), Some("upload failed"));
    }

    #[test]
    fn updates_to_one_task_leave_others_alone() {
        let registry = UploadTaskRegistry::new();
        let a = registry.create(&local("a.txt"));
        let b = registry.create(&local("b.txt"));

        registry.apply_progress(&a.id, 60);
        registry.mark_success(&b.id);

        let a = registry.get(&a.id).unwrap();
        let b = registry.get(&b.id).unwrap();
        assert_eq!((a.status, a.progress), (UploadStatus::Uploading, 60));
        assert_eq!((b.status, b.progress), (UploadStatus::Success, 100));
    }

    #[test]
    fn retention_prunes_only_old_terminal_tasks() {
        let registry = UploadTaskRegistry::new();
        let done = registry.create(&local("done.txt"));
        let running = registry.create(&local("running.txt"));
        registry.mark_success(&done.id);

        let removed = registry.prune_finished_before(Utc::now() - chrono::Duration::hours(1));
        assert_eq!(removed, 0);

        let removed = registry.prune_finished_before(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(removed, 1);
        assert!(registry.get(&done.id).is_none());
        assert!(registry.get(&running.id).is_some());
    }

    #[test]
    fn clear_finished_publishes_new_snapshot() {
        let registry = UploadTaskRegistry::new();
        let mut receiver = registry.subscribe();
        let task = registry.create(&local("a.txt"));
        registry.mark_failed(&task.id, "boom");
        receiver.borrow_and_update();

        assert_eq!(registry.clear_finished(), 1);
        assert!(receiver.has_changed().unwrap());
        assert!(receiver.borrow().is_empty());
    }
}
