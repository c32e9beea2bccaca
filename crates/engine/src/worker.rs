use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{CrossEvent, MonitorSpec};
use strategy::CrossoverDetector;

use crate::feed::{FeedConnector, FeedMessage, FeedSession};

/// Lifecycle of a stream worker.
///
/// `Connecting -> Streaming -> Disconnected -> Connecting -> ...`, ending in
/// `Stopped` once a stop has been requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Connecting,
    Streaming,
    Disconnected,
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Connecting => write!(f, "connecting"),
            WorkerState::Streaming => write!(f, "streaming"),
            WorkerState::Disconnected => write!(f, "disconnected"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Everything a worker needs besides its spec. Shared by all workers.
#[derive(Clone)]
pub struct WorkerContext {
    pub connector: Arc<dyn FeedConnector>,
    /// Detected crossovers go here; the event dispatcher drains it.
    pub event_tx: mpsc::Sender<CrossEvent>,
    /// Fixed wait between a disconnect and the next connect attempt.
    pub backoff: Duration,
}

/// Owning handle to a running worker, held by the registry.
///
/// Dropping the handle also stops the worker.
pub struct WorkerHandle {
    id: Uuid,
    spec: MonitorSpec,
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<WorkerState>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn spec(&self) -> &MonitorSpec {
        &self.spec
    }

    pub fn state(&self) -> WorkerState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state_rx.clone()
    }

    /// Request a stop. Idempotent and callable from any task; the worker
    /// observes it at its next suspension point.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker task to exit.
    pub async fn join(self) {
        let WorkerHandle { stop_tx, task, .. } = self;
        if let Err(e) = task.await {
            warn!(error = %e, "Worker task ended abnormally");
        }
        drop(stop_tx);
    }
}

/// One feed connection for one (symbol, granularity), feeding the crossover
/// detector and reconnecting after a fixed backoff until stopped.
pub struct StreamWorker {
    id: Uuid,
    spec: MonitorSpec,
    detector: CrossoverDetector,
    ctx: WorkerContext,
    /// Latest close window. Rebuilt from scratch on every session.
    closes: Vec<f64>,
    state_tx: watch::Sender<WorkerState>,
    stop_rx: watch::Receiver<bool>,
}

impl StreamWorker {
    /// Spawn a worker for `spec` on the current runtime.
    pub fn spawn(spec: MonitorSpec, ctx: WorkerContext) -> WorkerHandle {
        let id = Uuid::new_v4();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(WorkerState::Connecting);

        let worker = StreamWorker {
            id,
            detector: CrossoverDetector::new(spec.fast_ma, spec.slow_ma),
            spec: spec.clone(),
            ctx,
            closes: Vec::new(),
            state_tx,
            stop_rx,
        };
        let task = tokio::spawn(worker.run());

        WorkerHandle {
            id,
            spec,
            stop_tx,
            state_rx,
            task,
        }
    }

    async fn run(mut self) {
        let key = self.spec.key.clone();
        info!(symbol = %key.symbol, granularity = key.granularity, worker = %self.id, "Stream worker started");

        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            self.set_state(WorkerState::Connecting);
            let connected = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop_rx) => break,
                res = self.ctx.connector.connect(&self.spec.key) => res,
            };

            match connected {
                Ok(mut session) => {
                    info!(symbol = %key.symbol, granularity = key.granularity, "Feed connected");
                    self.set_state(WorkerState::Streaming);
                    self.closes.clear();

                    let stopped = self.stream(session.as_mut()).await;
                    session.close().await;
                    if stopped {
                        break;
                    }
                }
                Err(e) => {
                    warn!(symbol = %key.symbol, granularity = key.granularity, error = %e, "Feed connect failed");
                }
            }

            self.set_state(WorkerState::Disconnected);
            debug!(symbol = %key.symbol, granularity = key.granularity, backoff = ?self.ctx.backoff, "Reconnecting after backoff");
            tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop_rx) => break,
                _ = tokio::time::sleep(self.ctx.backoff) => {}
            }
        }

        self.set_state(WorkerState::Stopped);
        info!(symbol = %key.symbol, granularity = key.granularity, worker = %self.id, "Stream worker stopped");
    }

    /// Consume one session until it ends. Returns `true` if a stop was requested.
    async fn stream(&mut self, session: &mut dyn FeedSession) -> bool {
        loop {
            let next = tokio::select! {
                biased;
                _ = stop_requested(&mut self.stop_rx) => return true,
                next = session.next_message() => next,
            };

            match next {
                None => {
                    info!(symbol = %self.spec.key.symbol, granularity = self.spec.key.granularity, "Feed session closed");
                    return false;
                }
                Some(Err(e)) => {
                    warn!(symbol = %self.spec.key.symbol, granularity = self.spec.key.granularity, error = %e, "Feed session error");
                    return false;
                }
                Some(Ok(FeedMessage::Candles(closes))) => self.on_candles(closes),
                Some(Ok(FeedMessage::Rejected(reason))) => {
                    warn!(symbol = %self.spec.key.symbol, granularity = self.spec.key.granularity, %reason, "Feed rejected subscription");
                    return false;
                }
                Some(Ok(FeedMessage::Ignored)) => {}
                Some(Ok(FeedMessage::Unparseable(reason))) => {
                    warn!(symbol = %self.spec.key.symbol, granularity = self.spec.key.granularity, %reason, "Dropped malformed feed message");
                }
            }
        }
    }

    /// Replace the close window with the feed's latest snapshot and evaluate it.
    fn on_candles(&mut self, mut closes: Vec<f64>) {
        let keep = self.spec.fast_ma.max(self.spec.slow_ma).saturating_add(2);
        if closes.len() > keep {
            closes.drain(..closes.len() - keep);
        }
        self.closes = closes;

        if let Some(direction) = self.detector.compute(&self.closes).direction() {
            let event = CrossEvent {
                key: self.spec.key.clone(),
                direction,
            };
            info!(symbol = %event.key.symbol, granularity = event.key.granularity, %direction, "Crossover detected");
            if let Err(e) = self.ctx.event_tx.try_send(event) {
                warn!(error = %e, "Crossover event dropped");
            }
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state_tx.send_replace(state);
    }
}

/// Resolves once a stop is requested or the handle is gone.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}
