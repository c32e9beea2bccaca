use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use common::{Error, MonitorKey, Result};

use crate::feed::{classify, FeedConnector, FeedMessage, FeedSession};

/// Deriv candle subscription over WebSocket.
///
/// Each `connect` opens a fresh socket and subscribes to one symbol at one
/// granularity. The feed then pushes candle windows on that socket until it
/// is closed from either side.
pub struct DerivFeed {
    url: String,
}

impl DerivFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl FeedConnector for DerivFeed {
    async fn connect(&self, key: &MonitorKey) -> Result<Box<dyn FeedSession>> {
        let url = Url::parse(&self.url).map_err(|e| Error::WebSocket(e.to_string()))?;

        let (mut ws, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        let request = subscription_request(key);
        debug!(symbol = %key.symbol, granularity = key.granularity, "Sending candle subscription");
        ws.send(Message::Text(request.to_string()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;

        Ok(Box::new(DerivSession { ws }))
    }
}

struct DerivSession {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedSession for DerivSession {
    async fn next_message(&mut self) -> Option<Result<FeedMessage>> {
        loop {
            let msg = match self.ws.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(Error::WebSocket(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(classify(&text))),
                Message::Close(frame) => {
                    debug!(?frame, "Feed sent close frame");
                    return None;
                }
                // Pings are answered by tungstenite on the next read
                _ => continue,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}

fn subscription_request(key: &MonitorKey) -> Value {
    json!({
        "candles": key.symbol,
        "subscribe": 1,
        "style": "candles",
        "granularity": key.granularity,
    })
}
