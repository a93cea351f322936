//! Bounded, priority-aware worker execution.

use crate::worker::{Priority, Worker, WorkerFilter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long a cancelled worker gets to unwind before its task is aborted.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Pool sizing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of concurrently supervised workers.
    pub capacity: usize,
    /// Slots withheld from low-priority admissions. High-priority
    /// workers (servers, accepted inbound connections) may use the full
    /// capacity; outgoing attempts only `capacity - reserve`.
    pub high_priority_reserve: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            high_priority_reserve: 4,
        }
    }
}

struct Entry {
    worker: Arc<dyn Worker>,
    handle: Option<JoinHandle<()>>,
}

/// Supervises worker run loops under a capacity bound.
///
/// Admission, listing, and removal all serialize on the registry lock,
/// so two concurrent admissions can never both take the last slot and
/// a caller observing the result of [`WorkerPool::remove`] sees no
/// matching worker.
pub struct WorkerPool {
    config: PoolConfig,
    entries: Mutex<HashMap<String, Entry>>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Try to take ownership of `worker` and run it.
    ///
    /// Returns `false` when no slot can be granted or a worker with the
    /// same id is already supervised. On `false` the pool holds nothing:
    /// the caller still owns the worker and must release its resource.
    pub fn admit(self: &Arc<Self>, worker: Arc<dyn Worker>, priority: Priority) -> bool {
        let worker_id = worker.worker_id();
        let mut entries = self.entries.lock().unwrap();

        if entries.contains_key(&worker_id) {
            debug!(%worker_id, "admission denied: id already supervised");
            return false;
        }

        let limit = match priority {
            Priority::High => self.config.capacity,
            Priority::Low => self
                .config
                .capacity
                .saturating_sub(self.config.high_priority_reserve),
        };
        if entries.len() >= limit {
            debug!(
                %worker_id,
                ?priority,
                active = entries.len(),
                "admission denied: pool full"
            );
            return false;
        }

        entries.insert(
            worker_id.clone(),
            Entry {
                worker: worker.clone(),
                handle: None,
            },
        );

        let pool = Arc::clone(self);
        let id = worker_id.clone();
        let handle = tokio::spawn(async move {
            let run = tokio::spawn({
                let worker = worker.clone();
                async move { worker.run().await }
            });
            if let Err(e) = run.await {
                warn!(worker_id = %id, "worker task failed: {e}");
            }
            pool.finish(&id);
        });
        if let Some(entry) = entries.get_mut(&worker_id) {
            entry.handle = Some(handle);
        }
        debug!(%worker_id, "worker admitted");
        true
    }

    fn finish(&self, worker_id: &str) {
        if self.entries.lock().unwrap().remove(worker_id).is_some() {
            debug!(worker_id, "worker finished");
        }
    }

    /// Stop and forget every worker matching `filter`.
    ///
    /// Matching entries leave the registry before this returns, each
    /// worker is cancelled, and its task is awaited (aborted after a
    /// grace period), so the caller may assume no matching worker is
    /// still running. Must not be called from inside a supervised
    /// worker's own run loop.
    pub async fn remove(&self, filter: &WorkerFilter) {
        let drained: Vec<Entry> = {
            let mut entries = self.entries.lock().unwrap();
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, e)| filter.matches(e.worker.as_ref()))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id))
                .collect()
        };

        for entry in &drained {
            entry.worker.cancel();
        }
        for entry in drained {
            if let Some(mut handle) = entry.handle {
                if tokio::time::timeout(STOP_GRACE, &mut handle).await.is_err() {
                    warn!(
                        worker_id = %entry.worker.worker_id(),
                        "worker ignored cancellation, aborting its task"
                    );
                    handle.abort();
                }
            }
        }
    }

    /// Snapshot of the matching workers. Never exposes the live
    /// registry; the returned list is detached from later changes.
    pub fn snapshot(&self, filter: &WorkerFilter, connected_only: bool) -> Vec<Arc<dyn Worker>> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| filter.matches(e.worker.as_ref()))
            .filter(|e| !connected_only || e.worker.is_connected())
            .map(|e| e.worker.clone())
            .collect()
    }

    /// Number of currently supervised workers.
    pub fn active(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Stop everything. Used at node shutdown.
    pub async fn shutdown(&self) {
        self.remove(&WorkerFilter::all()).await;
    }
}
