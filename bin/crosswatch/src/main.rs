use std::sync::Arc;

use teloxide::Bot;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{ChatRef, ConfigStore, CrossEvent, JsonFileStore, LogNotifier, Notifier, Settings};
use engine::{
    CommandProcessor, DerivFeed, EventDispatcher, EventLog, MonitorRegistry, WorkerContext,
};
use telegram_ctrl::{start_bot, BotDeps, TelegramNotifier};

#[tokio::main]
async fn main() {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let settings = Settings::from_env();
    let store = Arc::new(JsonFileStore::new(&settings.monitor_config_path));
    let document = store.load_or_default();
    info!(
        path = %settings.monitor_config_path,
        symbols = document.symbols.len(),
        "Crosswatch starting"
    );

    let bot_token = settings
        .telegram_token
        .clone()
        .unwrap_or_else(|| document.bot_token.clone());
    let chat = settings
        .telegram_chat_id
        .clone()
        .map(ChatRef::Text)
        .unwrap_or_else(|| document.chat_id.clone());

    // ── Monitor registry ──────────────────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel::<CrossEvent>(256);
    let registry = Arc::new(MonitorRegistry::new(WorkerContext {
        connector: Arc::new(DerivFeed::new(&settings.feed_url)),
        event_tx,
        backoff: settings.reconnect_backoff,
    }));

    // ── Command processor ─────────────────────────────────────────────────────
    let processor = Arc::new(
        CommandProcessor::new(document, store, registry.clone()).with_authorized_chat(chat.clone()),
    );

    // ── Telegram ──────────────────────────────────────────────────────────────
    let bot = if bot_token.trim().is_empty() {
        warn!("No Telegram bot token configured. Commands disabled, alerts go to the log only.");
        None
    } else {
        Some(Bot::new(bot_token))
    };

    let notifier: Arc<dyn Notifier> = match (&bot, chat.as_i64()) {
        (Some(bot), Some(chat_id)) => Arc::new(TelegramNotifier::new(bot.clone(), chat_id)),
        (Some(_), None) => {
            warn!(chat = %chat, "Telegram chat_id is not numeric. Alerts go to the log only.");
            Arc::new(LogNotifier)
        }
        (None, _) => Arc::new(LogNotifier),
    };

    // ── Spawn all tasks ───────────────────────────────────────────────────────
    let dispatcher =
        EventDispatcher::new(event_rx, notifier, EventLog::new(&settings.event_log_path));
    tokio::spawn(dispatcher.run());

    processor.start_all().await;

    if let Some(bot) = bot {
        tokio::spawn(start_bot(
            bot,
            BotDeps {
                processor: processor.clone(),
            },
        ));
    }

    let api_state = api::AppState {
        processor,
        registry: registry.clone(),
    };
    tokio::spawn(api::serve(api_state, settings.http_port));

    // Keep main alive
    info!("All subsystems started. Waiting for shutdown signal.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }

    info!("Shutdown signal received. Stopping monitors.");
    let handles = registry.stop_all().await;
    let drained = tokio::time::timeout(settings.reconnect_backoff, async {
        for handle in handles {
            handle.join().await;
        }
    })
    .await;
    if drained.is_err() {
        warn!("Some workers did not stop in time");
    }
    info!("Exiting.");
}
