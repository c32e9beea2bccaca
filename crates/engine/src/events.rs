use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use common::{CrossEvent, Notifier, Result};

/// Append-only, human-readable event log: one `TIMESTAMP - MESSAGE` line per event.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn append(&self, message: &str) -> Result<()> {
        let line = format!("{} - {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Receives crossover events from all workers and delivers them to the
/// operator and the event log.
///
/// Delivery failures are logged and never stop the loop.
pub struct EventDispatcher {
    event_rx: mpsc::Receiver<CrossEvent>,
    notifier: Arc<dyn Notifier>,
    log: EventLog,
}

impl EventDispatcher {
    pub fn new(
        event_rx: mpsc::Receiver<CrossEvent>,
        notifier: Arc<dyn Notifier>,
        log: EventLog,
    ) -> Self {
        Self {
            event_rx,
            notifier,
            log,
        }
    }

    /// Run the dispatch loop. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!("EventDispatcher running");
        while let Some(event) = self.event_rx.recv().await {
            let message = event.message();

            if let Err(e) = self.notifier.notify(&message).await {
                warn!(error = %e, %message, "Failed to deliver crossover notification");
            }
            if let Err(e) = self.log.append(&message).await {
                warn!(error = %e, %message, "Failed to append to event log");
            }
        }
        warn!("EventDispatcher: event channel closed");
    }
}
