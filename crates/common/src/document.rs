use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{MonitorSpec, Result, SymbolConfig};

/// Chat identifier as stored in the document.
///
/// Telegram chat ids are integers but hand-edited documents often quote them.
/// Both forms are accepted and written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatRef {
    Id(i64),
    Text(String),
}

impl Default for ChatRef {
    fn default() -> Self {
        ChatRef::Text(String::new())
    }
}

impl ChatRef {
    /// True when `source` names this chat.
    pub fn matches(&self, source: &str) -> bool {
        !source.is_empty() && self.to_string() == source.trim()
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ChatRef::Id(id) => Some(*id),
            ChatRef::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for ChatRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatRef::Id(id) => write!(f, "{id}"),
            ChatRef::Text(s) => write!(f, "{}", s.trim()),
        }
    }
}

/// The persisted monitored-set document.
///
/// Example `config.json`:
/// ```json
/// {
///   "bot_token": "123:abc",
///   "chat_id": "42",
///   "symbols": [
///     { "name": "EURUSD", "timeframes": [ { "fast_ma": 5, "slow_ma": 20, "granularity": 60 } ] }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorDocument {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: ChatRef,
    #[serde(default)]
    pub symbols: Vec<SymbolConfig>,
    /// Fields this program does not know about, kept for lossless saves.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MonitorDocument {
    pub fn symbol(&self, name: &str) -> Option<&SymbolConfig> {
        self.symbols.iter().find(|s| s.name == name)
    }

    pub fn symbol_mut(&mut self, name: &str) -> Option<&mut SymbolConfig> {
        self.symbols.iter_mut().find(|s| s.name == name)
    }

    /// Every configured spec, in document order.
    pub fn specs(&self) -> Vec<MonitorSpec> {
        self.symbols.iter().flat_map(|s| s.specs()).collect()
    }
}

/// Load/save seam for the monitored-set document.
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<MonitorDocument>;
    fn save(&self, doc: &MonitorDocument) -> Result<()>;

    /// Load the document, falling back to an empty default when it is
    /// missing or corrupt.
    fn load_or_default(&self) -> MonitorDocument {
        self.load().unwrap_or_else(|e| {
            warn!(error = %e, "Monitor config unreadable, starting with an empty configuration");
            MonitorDocument::default()
        })
    }
}

/// JSON file store, pretty-printed with two-space indentation.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ConfigStore for JsonFileStore {
    fn load(&self) -> Result<MonitorDocument> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes a sibling temp file and renames it over the document, so a
    /// crash mid-save leaves the previous version intact.
    fn save(&self, doc: &MonitorDocument) -> Result<()> {
        let content = serde_json::to_string_pretty(doc)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
