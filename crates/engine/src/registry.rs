use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use common::{MonitorKey, MonitorSpec};

use crate::worker::{StreamWorker, WorkerContext, WorkerHandle, WorkerState};

/// The authoritative mapping from monitored stream to running worker.
///
/// Only the registry starts and stops workers. Every read and write of the
/// mapping happens under one lock, so concurrent commands can never produce
/// two workers for the same key or lose an update.
pub struct MonitorRegistry {
    ctx: WorkerContext,
    workers: Mutex<HashMap<MonitorKey, WorkerHandle>>,
}

impl MonitorRegistry {
    pub fn new(ctx: WorkerContext) -> Self {
        Self {
            ctx,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Launch a worker for `spec` unless one already runs for its key.
    /// Returns `true` if a worker was started.
    pub async fn start(&self, spec: MonitorSpec) -> bool {
        let mut workers = self.workers.lock().await;
        if workers.contains_key(&spec.key) {
            debug!(symbol = %spec.key.symbol, granularity = spec.key.granularity, "Worker already running");
            return false;
        }

        let key = spec.key.clone();
        let handle = StreamWorker::spawn(spec, self.ctx.clone());
        info!(
            symbol = %key.symbol,
            granularity = key.granularity,
            worker = %handle.id(),
            "Monitor started"
        );
        workers.insert(key, handle);
        true
    }

    /// Remove the worker for `key` and signal it to stop. Returns the
    /// removed handle so callers may `join` it; the stop itself completes
    /// in the background.
    pub async fn stop(&self, key: &MonitorKey) -> Option<WorkerHandle> {
        let handle = self.workers.lock().await.remove(key)?;
        handle.stop();
        info!(symbol = %key.symbol, granularity = key.granularity, worker = %handle.id(), "Monitor stopped");
        Some(handle)
    }

    /// Stop every worker. Used on shutdown.
    pub async fn stop_all(&self) -> Vec<WorkerHandle> {
        let mut workers = self.workers.lock().await;
        let handles: Vec<WorkerHandle> = workers.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.stop();
        }
        info!(count = handles.len(), "All monitors stopped");
        handles
    }

    /// Snapshot of active keys, sorted by symbol then granularity.
    pub async fn list(&self) -> Vec<MonitorKey> {
        let mut keys: Vec<MonitorKey> = self.workers.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Snapshot of active keys with each worker's current state.
    pub async fn states(&self) -> Vec<(MonitorKey, WorkerState)> {
        let mut states: Vec<(MonitorKey, WorkerState)> = self
            .workers
            .lock()
            .await
            .iter()
            .map(|(k, h)| (k.clone(), h.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    pub async fn worker_id(&self, key: &MonitorKey) -> Option<Uuid> {
        self.workers.lock().await.get(key).map(WorkerHandle::id)
    }

    pub async fn contains(&self, key: &MonitorKey) -> bool {
        self.workers.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
