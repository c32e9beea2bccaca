use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use common::{
    ChatRef, ConfigStore, Error, MonitorDocument, MonitorKey, MonitorSpec, SymbolConfig,
    TimeframeConfig,
};

use crate::registry::MonitorRegistry;

const AVAILABLE_COMMANDS: &str =
    "Unknown command. Available:\n/addsymbol\n/remsymbol\n/listsymbols\n/status";

/// Largest accepted moving-average window, in candles.
pub const MAX_MA_PERIOD: usize = 5000;

/// Operator commands accepted by the command processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorCommand {
    AddSymbol {
        symbol: String,
        fast_ma: usize,
        slow_ma: usize,
        granularity: u64,
    },
    RemoveSymbol {
        symbol: String,
        granularity: u64,
    },
    ListSymbols,
    Status,
    Unknown(String),
}

/// Rejected command input. The display text is the reply sent back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: /addsymbol SYMBOL FAST_MA SLOW_MA GRANULARITY_SECONDS")]
    AddUsage,
    #[error("MA periods and granularity must be positive integers.")]
    AddNotPositive,
    #[error("MA periods must not exceed {} candles.", MAX_MA_PERIOD)]
    PeriodTooLarge,
    #[error("Usage: /remsymbol SYMBOL GRANULARITY_SECONDS")]
    RemoveUsage,
    #[error("Granularity must be a positive integer number of seconds.")]
    RemoveNotPositive,
}

impl MonitorCommand {
    /// Parse one message. `Ok(None)` for text that is not a command.
    ///
    /// The command word is case-insensitive and may carry a `@botname`
    /// suffix. Symbols are upper-cased.
    pub fn parse(text: &str) -> Result<Option<Self>, CommandError> {
        let text = text.trim();
        if !text.starts_with('/') {
            return Ok(None);
        }

        let parts: Vec<&str> = text.split_whitespace().collect();
        let name = parts[0]
            .split('@')
            .next()
            .unwrap_or_default()
            .to_lowercase();

        let command = match name.as_str() {
            "/addsymbol" => {
                if parts.len() != 5 {
                    return Err(CommandError::AddUsage);
                }
                let (fast_ma, slow_ma, granularity) = match (
                    positive(parts[2]),
                    positive(parts[3]),
                    positive(parts[4]),
                ) {
                    (Some(f), Some(s), Some(g)) => (f, s, g),
                    _ => return Err(CommandError::AddNotPositive),
                };
                MonitorCommand::AddSymbol {
                    symbol: parts[1].to_uppercase(),
                    fast_ma: period(fast_ma)?,
                    slow_ma: period(slow_ma)?,
                    granularity,
                }
            }
            "/remsymbol" => {
                if parts.len() != 3 {
                    return Err(CommandError::RemoveUsage);
                }
                let granularity = positive(parts[2]).ok_or(CommandError::RemoveNotPositive)?;
                MonitorCommand::RemoveSymbol {
                    symbol: parts[1].to_uppercase(),
                    granularity,
                }
            }
            "/listsymbols" => MonitorCommand::ListSymbols,
            "/status" => MonitorCommand::Status,
            _ => MonitorCommand::Unknown(name),
        };
        Ok(Some(command))
    }
}

fn positive(s: &str) -> Option<u64> {
    s.parse::<u64>().ok().filter(|v| *v > 0)
}

fn period(value: u64) -> Result<usize, CommandError> {
    usize::try_from(value)
        .ok()
        .filter(|p| *p <= MAX_MA_PERIOD)
        .ok_or(CommandError::PeriodTooLarge)
}

/// Applies operator commands to the monitored set.
///
/// Owns the in-memory document after startup. Each mutation is computed on a
/// copy, persisted, and only then committed and applied to the registry, so
/// a failed save leaves both untouched.
pub struct CommandProcessor {
    authorized_chat: ChatRef,
    document: Mutex<MonitorDocument>,
    store: Arc<dyn ConfigStore>,
    registry: Arc<MonitorRegistry>,
}

impl CommandProcessor {
    pub fn new(
        document: MonitorDocument,
        store: Arc<dyn ConfigStore>,
        registry: Arc<MonitorRegistry>,
    ) -> Self {
        Self {
            authorized_chat: document.chat_id.clone(),
            document: Mutex::new(document),
            store,
            registry,
        }
    }

    /// Accept commands from `chat` instead of the document's `chat_id`.
    pub fn with_authorized_chat(mut self, chat: ChatRef) -> Self {
        self.authorized_chat = chat;
        self
    }

    pub fn is_authorized(&self, source: &str) -> bool {
        self.authorized_chat.matches(source)
    }

    /// Start a worker for every configured spec. Returns how many started.
    pub async fn start_all(&self) -> usize {
        let specs = self.document.lock().await.specs();
        let mut started = 0;
        for spec in specs {
            if self.registry.start(spec).await {
                started += 1;
            }
        }
        info!(count = started, "Configured monitors started");
        started
    }

    /// Handle one inbound message from `source`.
    ///
    /// Returns the reply, or `None` when nothing should be sent back: the
    /// source is not authorized or the text is not a command.
    pub async fn handle(&self, source: &str, text: &str) -> Option<String> {
        if !self.is_authorized(source) {
            warn!(source, "Ignoring command from unauthorized chat");
            return None;
        }

        match MonitorCommand::parse(text) {
            Ok(Some(command)) => Some(self.execute(command).await),
            Ok(None) => None,
            Err(e) => Some(e.to_string()),
        }
    }

    pub async fn execute(&self, command: MonitorCommand) -> String {
        match command {
            MonitorCommand::AddSymbol {
                symbol,
                fast_ma,
                slow_ma,
                granularity,
            } => self.add_symbol(symbol, fast_ma, slow_ma, granularity).await,
            MonitorCommand::RemoveSymbol {
                symbol,
                granularity,
            } => self.remove_symbol(symbol, granularity).await,
            MonitorCommand::ListSymbols => self.list_symbols().await,
            MonitorCommand::Status => self.status().await,
            MonitorCommand::Unknown(name) => {
                info!(command = %name, "Unknown command");
                AVAILABLE_COMMANDS.to_string()
            }
        }
    }

    async fn add_symbol(
        &self,
        symbol: String,
        fast_ma: usize,
        slow_ma: usize,
        granularity: u64,
    ) -> String {
        let mut doc = self.document.lock().await;
        if doc
            .symbol(&symbol)
            .and_then(|s| s.timeframe(granularity))
            .is_some()
        {
            return format!("{symbol} already has timeframe {granularity}s");
        }

        let timeframe = TimeframeConfig::new(fast_ma, slow_ma, granularity);
        let mut updated = doc.clone();
        match updated.symbol_mut(&symbol) {
            Some(sym) => sym.timeframes.push(timeframe),
            None => {
                let mut sym = SymbolConfig::new(symbol.clone());
                sym.timeframes.push(timeframe);
                updated.symbols.push(sym);
            }
        }

        *doc = match self.persist(updated).await {
            Ok(saved) => saved,
            Err(e) => {
                error!(error = %e, "Failed to save monitor config");
                return format!("Failed to save configuration: {e}");
            }
        };

        self.registry
            .start(MonitorSpec::new(symbol.clone(), fast_ma, slow_ma, granularity))
            .await;
        format!("Added {symbol} {granularity}s with fast MA={fast_ma} slow MA={slow_ma}")
    }

    async fn remove_symbol(&self, symbol: String, granularity: u64) -> String {
        let mut doc = self.document.lock().await;
        let Some(sym) = doc.symbol(&symbol) else {
            return format!("No symbol {symbol} found.");
        };
        if sym.timeframe(granularity).is_none() {
            return format!("No timeframe {granularity}s found for {symbol}");
        }

        let mut updated = doc.clone();
        if let Some(sym) = updated.symbol_mut(&symbol) {
            sym.timeframes.retain(|tf| tf.granularity != granularity);
        }
        // A symbol without timeframes is dropped entirely
        updated.symbols.retain(|s| s.name != symbol || !s.timeframes.is_empty());

        *doc = match self.persist(updated).await {
            Ok(saved) => saved,
            Err(e) => {
                error!(error = %e, "Failed to save monitor config");
                return format!("Failed to save configuration: {e}");
            }
        };

        self.registry
            .stop(&MonitorKey::new(symbol.clone(), granularity))
            .await;
        format!("Removed {symbol} {granularity}s monitor.")
    }

    /// Save `doc` on the blocking pool and hand it back once it is on disk.
    async fn persist(&self, doc: MonitorDocument) -> common::Result<MonitorDocument> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save(&doc).map(|()| doc))
            .await
            .map_err(|e| Error::Other(format!("config save task failed: {e}")))?
    }

    async fn list_symbols(&self) -> String {
        let doc = self.document.lock().await;
        if doc.symbols.is_empty() {
            return "No symbols are being monitored.".to_string();
        }

        let lines: Vec<String> = doc
            .symbols
            .iter()
            .map(|sym| {
                let tfs: Vec<String> = sym
                    .timeframes
                    .iter()
                    .map(|tf| {
                        format!(
                            "{}m (fast={} slow={})",
                            tf.granularity / 60,
                            tf.fast_ma,
                            tf.slow_ma
                        )
                    })
                    .collect();
                format!("{}: {}", sym.name, tfs.join(", "))
            })
            .collect();
        format!("Currently monitored symbols:\n{}", lines.join("\n"))
    }

    async fn status(&self) -> String {
        let active = self.registry.list().await;
        if active.is_empty() {
            return "No active monitors.".to_string();
        }
        let lines: Vec<String> = active.iter().map(MonitorKey::to_string).collect();
        format!("Active monitors:\n{}", lines.join("\n"))
    }

    /// Every configured spec, in document order.
    pub async fn configured(&self) -> Vec<MonitorSpec> {
        self.document.lock().await.specs()
    }

    /// Snapshot of the in-memory document.
    pub async fn document(&self) -> MonitorDocument {
        self.document.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::sync::mpsc;

    use common::Result;

    use crate::testing::ScriptedFeed;
    use crate::worker::WorkerContext;

    const CHAT: &str = "4242";

    #[derive(Default)]
    struct MemoryStore {
        saved: std::sync::Mutex<Vec<MonitorDocument>>,
        fail: AtomicBool,
    }

    impl MemoryStore {
        fn saves(&self) -> usize {
            self.saved.lock().unwrap().len()
        }

        fn last(&self) -> Option<MonitorDocument> {
            self.saved.lock().unwrap().last().cloned()
        }
    }

    impl ConfigStore for MemoryStore {
        fn load(&self) -> Result<MonitorDocument> {
            self.last().ok_or_else(|| Error::Config("nothing saved".into()))
        }

        fn save(&self, doc: &MonitorDocument) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            self.saved.lock().unwrap().push(doc.clone());
            Ok(())
        }
    }

    fn make_processor(
        doc: MonitorDocument,
    ) -> (CommandProcessor, Arc<MemoryStore>, Arc<MonitorRegistry>) {
        let (event_tx, _event_rx) = mpsc::channel(16);
        let registry = Arc::new(MonitorRegistry::new(WorkerContext {
            connector: ScriptedFeed::idle(),
            event_tx,
            backoff: Duration::from_secs(5),
        }));
        let store = Arc::new(MemoryStore::default());
        let processor = CommandProcessor::new(doc, store.clone(), registry.clone());
        (processor, store, registry)
    }

    fn authorized_doc() -> MonitorDocument {
        MonitorDocument {
            chat_id: ChatRef::Text(CHAT.into()),
            ..Default::default()
        }
    }

    #[test]
    fn parse_commands() {
        assert_eq!(
            MonitorCommand::parse("/addsymbol eurusd 5 20 60"),
            Ok(Some(MonitorCommand::AddSymbol {
                symbol: "EURUSD".into(),
                fast_ma: 5,
                slow_ma: 20,
                granularity: 60,
            }))
        );
        assert_eq!(
            MonitorCommand::parse("/RemSymbol@crossbot r_100 300"),
            Ok(Some(MonitorCommand::RemoveSymbol {
                symbol: "R_100".into(),
                granularity: 300,
            }))
        );
        assert_eq!(
            MonitorCommand::parse("/status@crossbot"),
            Ok(Some(MonitorCommand::Status))
        );
        assert_eq!(MonitorCommand::parse("hello"), Ok(None));
        assert_eq!(
            MonitorCommand::parse("/start"),
            Ok(Some(MonitorCommand::Unknown("/start".into())))
        );
    }

    #[test]
    fn parse_rejects_bad_arity_and_values() {
        let cases = [
            ("/addsymbol EURUSD 5 20", CommandError::AddUsage),
            ("/addsymbol EURUSD five 20 60", CommandError::AddNotPositive),
            ("/addsymbol EURUSD 5 20 -60", CommandError::AddNotPositive),
            ("/addsymbol EURUSD 0 20 60", CommandError::AddNotPositive),
            ("/addsymbol EURUSD 5 5001 60", CommandError::PeriodTooLarge),
            ("/remsymbol EURUSD", CommandError::RemoveUsage),
            ("/remsymbol EURUSD 1m", CommandError::RemoveNotPositive),
        ];
        for (text, expected) in cases {
            assert_eq!(MonitorCommand::parse(text), Err(expected), "{text}");
        }
        assert!(matches!(
            MonitorCommand::parse("/addsymbol EURUSD 5 5000 60"),
            Ok(Some(MonitorCommand::AddSymbol { slow_ma: 5000, .. }))
        ));
    }

    #[tokio::test]
    async fn oversized_window_is_rejected_without_mutation() {
        let (processor, store, registry) = make_processor(authorized_doc());

        let reply = processor
            .handle(CHAT, "/addsymbol EURUSD 5 18446744073709551615 60")
            .await;
        assert_eq!(reply.as_deref(), Some("MA periods must not exceed 5000 candles."));
        assert_eq!(store.saves(), 0);
        assert!(registry.is_empty().await);
        assert!(processor.document().await.symbols.is_empty());
    }

    #[tokio::test]
    async fn add_persists_and_starts_worker() {
        let (processor, store, registry) = make_processor(authorized_doc());

        let reply = processor.handle(CHAT, "/addsymbol EURUSD 5 20 60").await;
        assert_eq!(reply.as_deref(), Some("Added EURUSD 60s with fast MA=5 slow MA=20"));

        let saved = store.last().unwrap();
        assert_eq!(saved.symbols.len(), 1);
        assert_eq!(saved.symbols[0].timeframes[0].granularity, 60);
        assert!(registry.contains(&MonitorKey::new("EURUSD", 60)).await);
    }

    #[tokio::test]
    async fn duplicate_add_is_rejected_without_second_worker() {
        let (processor, store, registry) = make_processor(authorized_doc());
        processor.handle(CHAT, "/addsymbol EURUSD 5 20 60").await;
        let key = MonitorKey::new("EURUSD", 60);
        let first = registry.worker_id(&key).await;

        let reply = processor.handle(CHAT, "/addsymbol EURUSD 5 20 60").await;
        assert_eq!(reply.as_deref(), Some("EURUSD already has timeframe 60s"));
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.worker_id(&key).await, first);
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test]
    async fn second_timeframe_joins_existing_symbol() {
        let (processor, store, registry) = make_processor(authorized_doc());
        processor.handle(CHAT, "/addsymbol EURUSD 5 20 60").await;
        processor.handle(CHAT, "/addsymbol eurusd 9 21 300").await;

        let saved = store.last().unwrap();
        assert_eq!(saved.symbols.len(), 1);
        assert_eq!(saved.symbols[0].timeframes.len(), 2);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn removing_last_timeframe_removes_symbol() {
        let (processor, store, registry) = make_processor(authorized_doc());
        processor.handle(CHAT, "/addsymbol EURUSD 5 20 60").await;

        let reply = processor.handle(CHAT, "/remsymbol EURUSD 60").await;
        assert_eq!(reply.as_deref(), Some("Removed EURUSD 60s monitor."));
        assert!(store.last().unwrap().symbols.is_empty());
        assert!(processor.document().await.symbol("EURUSD").is_none());
        assert!(!registry.contains(&MonitorKey::new("EURUSD", 60)).await);
    }

    #[tokio::test]
    async fn removing_one_of_two_timeframes_keeps_symbol() {
        let (processor, store, registry) = make_processor(authorized_doc());
        processor.handle(CHAT, "/addsymbol EURUSD 5 20 60").await;
        processor.handle(CHAT, "/addsymbol EURUSD 5 20 300").await;

        processor.handle(CHAT, "/remsymbol EURUSD 60").await;
        let saved = store.last().unwrap();
        assert_eq!(saved.symbols[0].timeframes.len(), 1);
        assert_eq!(saved.symbols[0].timeframes[0].granularity, 300);
        assert_eq!(registry.list().await, vec![MonitorKey::new("EURUSD", 300)]);
    }

    #[tokio::test]
    async fn remove_missing_entries_reports_not_found() {
        let (processor, store, _registry) = make_processor(authorized_doc());
        assert_eq!(
            processor.handle(CHAT, "/remsymbol EURUSD 60").await.as_deref(),
            Some("No symbol EURUSD found.")
        );

        processor.handle(CHAT, "/addsymbol EURUSD 5 20 60").await;
        assert_eq!(
            processor.handle(CHAT, "/remsymbol EURUSD 300").await.as_deref(),
            Some("No timeframe 300s found for EURUSD")
        );
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test]
    async fn unauthorized_source_is_ignored() {
        let (processor, store, registry) = make_processor(authorized_doc());

        assert_eq!(processor.handle("999", "/addsymbol EURUSD 5 20 60").await, None);
        assert_eq!(processor.handle("", "/status").await, None);
        assert_eq!(store.saves(), 0);
        assert!(registry.is_empty().await);
        assert!(processor.document().await.symbols.is_empty());
    }

    #[tokio::test]
    async fn authorized_chat_can_be_overridden() {
        let (processor, _store, _registry) = make_processor(authorized_doc());
        let processor = processor.with_authorized_chat(ChatRef::Id(7));
        assert!(processor.is_authorized("7"));
        assert!(!processor.is_authorized(CHAT));
    }

    #[tokio::test]
    async fn validation_failure_replies_usage_without_mutation() {
        let (processor, store, registry) = make_processor(authorized_doc());

        let reply = processor.handle(CHAT, "/addsymbol EURUSD 5").await;
        assert_eq!(
            reply.as_deref(),
            Some("Usage: /addsymbol SYMBOL FAST_MA SLOW_MA GRANULARITY_SECONDS")
        );
        let reply = processor.handle(CHAT, "/addsymbol EURUSD a b c").await;
        assert_eq!(
            reply.as_deref(),
            Some("MA periods and granularity must be positive integers.")
        );
        assert_eq!(store.saves(), 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn failed_save_leaves_state_untouched() {
        let (processor, store, registry) = make_processor(authorized_doc());
        store.fail.store(true, Ordering::SeqCst);

        let reply = processor.handle(CHAT, "/addsymbol EURUSD 5 20 60").await.unwrap();
        assert!(reply.starts_with("Failed to save configuration"), "{reply}");
        assert!(processor.document().await.symbols.is_empty());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn list_and_status_replies() {
        let (processor, _store, registry) = make_processor(authorized_doc());
        assert_eq!(
            processor.handle(CHAT, "/listsymbols").await.as_deref(),
            Some("No symbols are being monitored.")
        );
        assert_eq!(
            processor.handle(CHAT, "/status").await.as_deref(),
            Some("No active monitors.")
        );

        processor.handle(CHAT, "/addsymbol EURUSD 5 20 60").await;
        processor.handle(CHAT, "/addsymbol EURUSD 9 21 300").await;
        processor.handle(CHAT, "/addsymbol R_100 3 8 900").await;

        assert_eq!(
            processor.handle(CHAT, "/listsymbols").await.as_deref(),
            Some(
                "Currently monitored symbols:\n\
                 EURUSD: 1m (fast=5 slow=20), 5m (fast=9 slow=21)\n\
                 R_100: 15m (fast=3 slow=8)"
            )
        );
        assert_eq!(
            processor.handle(CHAT, "/status").await.as_deref(),
            Some("Active monitors:\nEURUSD 1m\nEURUSD 5m\nR_100 15m")
        );

        registry.stop(&MonitorKey::new("R_100", 900)).await;
        assert_eq!(
            processor.handle(CHAT, "/status").await.as_deref(),
            Some("Active monitors:\nEURUSD 1m\nEURUSD 5m")
        );
    }

    #[tokio::test]
    async fn unknown_command_lists_available() {
        let (processor, _store, _registry) = make_processor(authorized_doc());
        assert_eq!(
            processor.handle(CHAT, "/help").await.as_deref(),
            Some("Unknown command. Available:\n/addsymbol\n/remsymbol\n/listsymbols\n/status")
        );
        assert_eq!(processor.handle(CHAT, "just chatting").await, None);
    }

    #[tokio::test]
    async fn start_all_replays_document() {
        let mut doc = authorized_doc();
        doc.symbols.push(SymbolConfig::with_timeframes(
            "EURUSD",
            vec![
                TimeframeConfig::new(5, 20, 60),
                TimeframeConfig::new(9, 21, 300),
            ],
        ));
        doc.symbols.push(SymbolConfig::with_timeframes(
            "R_100",
            vec![TimeframeConfig::new(3, 8, 900)],
        ));
        let (processor, store, registry) = make_processor(doc);

        assert_eq!(processor.start_all().await, 3);
        assert_eq!(processor.start_all().await, 0);
        assert_eq!(registry.len().await, 3);
        assert_eq!(processor.configured().await.len(), 3);
        assert_eq!(store.saves(), 0);
    }
}
