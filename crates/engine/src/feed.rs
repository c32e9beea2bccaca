use async_trait::async_trait;
use serde_json::Value;

use common::{MonitorKey, Result};

/// Opens market-data sessions for one monitored stream.
///
/// `DerivFeed` implements this over WebSocket; tests script it.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Connect and send the subscription request for `key`.
    async fn connect(&self, key: &MonitorKey) -> Result<Box<dyn FeedSession>>;
}

/// One live subscription. Owned exclusively by its stream worker.
#[async_trait]
pub trait FeedSession: Send {
    /// Wait for the next inbound message. `None` means the feed closed the session.
    async fn next_message(&mut self) -> Option<Result<FeedMessage>>;

    /// Close the session. Errors are swallowed: the session is discarded either way.
    async fn close(&mut self);
}

/// Classified inbound feed message.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// Closing prices of the latest candle window, most recent last.
    Candles(Vec<f64>),
    /// The feed refused the subscription or reported an error.
    Rejected(String),
    /// Well-formed message that carries no candle batch.
    Ignored,
    /// Could not be read; dropped by the worker.
    Unparseable(String),
}

/// Classify one text frame from the feed.
pub fn classify(text: &str) -> FeedMessage {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return FeedMessage::Unparseable(e.to_string()),
    };

    if let Some(err) = value.get("error") {
        let reason = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified feed error");
        return FeedMessage::Rejected(reason.to_string());
    }

    match value.get("candles") {
        Some(Value::Array(candles)) if candles.is_empty() => FeedMessage::Ignored,
        Some(Value::Array(candles)) => {
            match candles.iter().map(close_of).collect::<Option<Vec<f64>>>() {
                Some(closes) => FeedMessage::Candles(closes),
                None => FeedMessage::Unparseable("candle without a numeric close".to_string()),
            }
        }
        Some(_) => FeedMessage::Unparseable("`candles` is not an array".to_string()),
        None => FeedMessage::Ignored,
    }
}

fn close_of(candle: &Value) -> Option<f64> {
    match candle.get("close")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
