use async_trait::async_trait;

use crate::Result;

/// Outbound text channel to the operator.
///
/// Delivery is best effort: callers log a failed `notify` and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<()>;
}

/// Notifier used when no bot token is configured. Messages only reach the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        tracing::info!(message = %text, "Notification (no transport configured)");
        Ok(())
    }
}
