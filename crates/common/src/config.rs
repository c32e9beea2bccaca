use std::time::Duration;

/// Process settings loaded from environment variables at startup.
///
/// Every variable is optional. The monitored set itself lives in the JSON
/// document at `monitor_config_path`, not here.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path of the persisted monitored-set document.
    pub monitor_config_path: String,
    /// Append-only human-readable event log.
    pub event_log_path: String,

    // Market data feed
    pub feed_url: String,
    pub reconnect_backoff: Duration,

    // Keep-alive HTTP server
    pub http_port: u16,

    // Telegram overrides for the values stored in the document
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl Settings {
    pub const DEFAULT_FEED_URL: &'static str = "wss://ws.deriv.com/websockets/v3";
    pub const DEFAULT_BACKOFF_SECS: u64 = 5;

    /// Load settings from the environment. Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        Settings {
            monitor_config_path: optional_env("MONITOR_CONFIG_PATH")
                .unwrap_or_else(|| "config.json".to_string()),
            event_log_path: optional_env("EVENT_LOG_PATH")
                .unwrap_or_else(|| "events.log".to_string()),
            feed_url: optional_env("FEED_URL")
                .unwrap_or_else(|| Self::DEFAULT_FEED_URL.to_string()),
            reconnect_backoff: Duration::from_secs(
                optional_env("RECONNECT_BACKOFF_SECS")
                    .and_then(|v| v.parse().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(Self::DEFAULT_BACKOFF_SECS),
            ),
            http_port: optional_env("HTTP_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            telegram_token: optional_env("TELEGRAM_TOKEN"),
            telegram_chat_id: optional_env("TELEGRAM_CHAT_ID"),
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
