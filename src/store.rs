//! File list store with single-flight refresh
//!
//! Holds the last-known-good list of server files and coordinates refreshes:
//! - at most one `GET /files` is outstanding at any time
//! - requests arriving while a fetch is in flight collapse into one follow-up fetch
//! - every waiter gets the outcome of the first fetch that started after it asked
//! - a failed fetch keeps the previous snapshot

use crate::api::{FileRecord, ListQuery, Transport};
use crate::error::{ClientError, ClientResult};
use crate::format::sort_newest_first;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Server file list, already sorted newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct FileListSnapshot {
    pub files: Vec<FileRecord>,
    pub fetched_at: DateTime<Utc>,
}

impl FileListSnapshot {
    pub fn find(&self, id: &str) -> Option<&FileRecord> {
        self.files.iter().find(|file| file.id == id)
    }
}

/// Observable store state.
#[derive(Debug, Clone, Default)]
pub struct ListState {
    /// Last successful fetch; `None` until the first one lands.
    pub snapshot: Option<Arc<FileListSnapshot>>,
    pub is_fetching: bool,
    /// Error of the most recent fetch, cleared by the next success.
    pub last_error: Option<ClientError>,
}

#[derive(Debug, Clone)]
struct RefreshOutcome {
    /// Highest request generation this fetch covers.
    generation: u64,
    result: ClientResult<Arc<FileListSnapshot>>,
}

struct RefreshCoordinator {
    requested: u64,
    worker_running: bool,
}

struct StoreInner {
    transport: Arc<dyn Transport>,
    query: ListQuery,
    coordinator: Mutex<RefreshCoordinator>,
    outcomes: watch::Sender<Option<RefreshOutcome>>,
    state: watch::Sender<ListState>,
}

/// Cheap to clone; all clones share one list and one refresh worker.
#[derive(Clone)]
pub struct FileListStore {
    inner: Arc<StoreInner>,
}

impl FileListStore {
    pub fn new(transport: Arc<dyn Transport>, query: ListQuery) -> Self {
        let (outcomes, _) = watch::channel(None);
        let (state, _) = watch::channel(ListState::default());
        Self {
            inner: Arc::new(StoreInner {
                transport,
                query,
                coordinator: Mutex::new(RefreshCoordinator {
                    requested: 0,
                    worker_running: false,
                }),
                outcomes,
                state,
            }),
        }
    }

    /// Schedule a refresh. Overlapping calls share fetches; the returned
    /// handle can be awaited for the outcome or dropped.
    pub fn invalidate(&self) -> RefreshHandle {
        // Subscribe before bumping the generation so the outcome can't be missed.
        let receiver = self.inner.outcomes.subscribe();

        let (generation, start_worker) = {
            let mut coordinator = self.inner.lock_coordinator();
            coordinator.requested += 1;
            let start_worker = !coordinator.worker_running;
            coordinator.worker_running = true;
            (coordinator.requested, start_worker)
        };

        if start_worker {
            debug!("file_list: starting refresh worker at generation {}", generation);
            let inner = self.inner.clone();
            tokio::spawn(async move { inner.run_refreshes().await });
        } else {
            debug!("file_list: refresh {} coalesced into pending fetch", generation);
        }

        RefreshHandle {
            generation,
            receiver,
        }
    }

    /// Refresh and return the resulting snapshot.
    pub async fn fetch(&self) -> ClientResult<Arc<FileListSnapshot>> {
        self.invalidate().outcome().await
    }

    pub fn state(&self) -> ListState {
        self.inner.state.borrow().clone()
    }

    /// Last-known-good snapshot, if any fetch has succeeded.
    pub fn snapshot(&self) -> Option<Arc<FileListSnapshot>> {
        self.inner.state.borrow().snapshot.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.inner.state.subscribe()
    }
}

impl StoreInner {
    fn lock_coordinator(&self) -> MutexGuard<'_, RefreshCoordinator> {
        self.coordinator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_refreshes(self: Arc<Self>) {
        loop {
            let target = self.lock_coordinator().requested;
            self.state.send_modify(|state| state.is_fetching = true);

            let result = match self.transport.list(&self.query).await {
                Ok(mut files) => {
                    sort_newest_first(&mut files);
                    info!("file_list: fetched {} files (generation {})", files.len(), target);
                    Ok(Arc::new(FileListSnapshot {
                        files,
                        fetched_at: Utc::now(),
                    }))
                }
                Err(e) => {
                    warn!("file_list: refresh {} failed: {}", target, e);
                    Err(ClientError::Fetch(Box::new(e)))
                }
            };

            self.state.send_modify(|state| match &result {
                Ok(snapshot) => {
                    state.snapshot = Some(snapshot.clone());
                    state.last_error = None;
                }
                Err(e) => state.last_error = Some(e.clone()),
            });
            self.outcomes.send_replace(Some(RefreshOutcome {
                generation: target,
                result,
            }));

            let mut coordinator = self.lock_coordinator();
            if coordinator.requested == target {
                coordinator.worker_running = false;
                self.state.send_modify(|state| state.is_fetching = false);
                return;
            }
        }
    }
}

/// Pending result of one [`FileListStore::invalidate`] call.
pub struct RefreshHandle {
    generation: u64,
    receiver: watch::Receiver<Option<RefreshOutcome>>,
}

impl RefreshHandle {
    pub async fn outcome(self) -> ClientResult<Arc<FileListSnapshot>> {
        let RefreshHandle {
            generation,
            mut receiver,
        } = self;

        let result = match receiver
            .wait_for(|outcome| matches!(outcome, Some(o) if o.generation >= generation))
            .await
        {
            Ok(outcome) => (*outcome).as_ref().map(|o| o.result.clone()),
            Err(_) => None,
        };

        result.unwrap_or_else(|| {
            Err(ClientError::Fetch(Box::new(ClientError::Network(
                "refresh worker stopped".to_string(),
            ))))
        })
    }
}
