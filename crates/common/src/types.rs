use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifies one monitored stream: a symbol at one candle granularity.
///
/// Ordering is by symbol, then granularity, which is the order used for
/// status and listing replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorKey {
    pub symbol: String,
    /// Candle interval in seconds.
    pub granularity: u64,
}

impl MonitorKey {
    pub fn new(symbol: impl Into<String>, granularity: u64) -> Self {
        Self {
            symbol: symbol.into(),
            granularity,
        }
    }

    /// Timeframe in whole minutes, as shown to the operator.
    pub fn minutes(&self) -> u64 {
        self.granularity / 60
    }
}

impl std::fmt::Display for MonitorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}m", self.symbol, self.minutes())
    }
}

/// A monitored stream plus its moving-average windows.
///
/// `fast_ma < slow_ma` is not required; inverted windows simply produce
/// mirrored signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSpec {
    pub key: MonitorKey,
    pub fast_ma: usize,
    pub slow_ma: usize,
}

impl MonitorSpec {
    pub fn new(
        symbol: impl Into<String>,
        fast_ma: usize,
        slow_ma: usize,
        granularity: u64,
    ) -> Self {
        Self {
            key: MonitorKey::new(symbol, granularity),
            fast_ma,
            slow_ma,
        }
    }
}

/// One persisted timeframe entry of a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeConfig {
    pub fast_ma: usize,
    pub slow_ma: usize,
    pub granularity: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TimeframeConfig {
    pub fn new(fast_ma: usize, slow_ma: usize, granularity: u64) -> Self {
        Self {
            fast_ma,
            slow_ma,
            granularity,
            extra: Map::new(),
        }
    }
}

/// Persisted unit: a symbol and its timeframes. Granularities are unique
/// within one symbol.
///
/// Unknown fields are kept in `extra`. An entry loaded without a
/// `timeframes` key is saved without one as long as it stays empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SymbolRecord", into = "SymbolRecord")]
pub struct SymbolConfig {
    pub name: String,
    pub timeframes: Vec<TimeframeConfig>,
    pub extra: Map<String, Value>,
    timeframes_key: bool,
}

/// Wire shape of `SymbolConfig`.
#[derive(Serialize, Deserialize)]
struct SymbolRecord {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeframes: Option<Vec<TimeframeConfig>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<SymbolRecord> for SymbolConfig {
    fn from(record: SymbolRecord) -> Self {
        Self {
            name: record.name,
            timeframes_key: record.timeframes.is_some(),
            timeframes: record.timeframes.unwrap_or_default(),
            extra: record.extra,
        }
    }
}

impl From<SymbolConfig> for SymbolRecord {
    fn from(sym: SymbolConfig) -> Self {
        let timeframes =
            (sym.timeframes_key || !sym.timeframes.is_empty()).then_some(sym.timeframes);
        Self {
            name: sym.name,
            timeframes,
            extra: sym.extra,
        }
    }
}

impl SymbolConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_timeframes(name, Vec::new())
    }

    pub fn with_timeframes(name: impl Into<String>, timeframes: Vec<TimeframeConfig>) -> Self {
        Self {
            name: name.into(),
            timeframes,
            extra: Map::new(),
            timeframes_key: true,
        }
    }

    pub fn timeframe(&self, granularity: u64) -> Option<&TimeframeConfig> {
        self.timeframes.iter().find(|tf| tf.granularity == granularity)
    }

    /// Expand into one `MonitorSpec` per timeframe.
    pub fn specs(&self) -> impl Iterator<Item = MonitorSpec> + '_ {
        self.timeframes
            .iter()
            .map(|tf| MonitorSpec::new(self.name.clone(), tf.fast_ma, tf.slow_ma, tf.granularity))
    }
}

/// Output of the crossover detector for one evaluation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossSignal {
    NoSignal,
    BullishCross,
    BearishCross,
}

impl CrossSignal {
    pub fn direction(self) -> Option<CrossDirection> {
        match self {
            CrossSignal::NoSignal => None,
            CrossSignal::BullishCross => Some(CrossDirection::Bullish),
            CrossSignal::BearishCross => Some(CrossDirection::Bearish),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    Bullish,
    Bearish,
}

impl std::fmt::Display for CrossDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrossDirection::Bullish => write!(f, "Bullish"),
            CrossDirection::Bearish => write!(f, "Bearish"),
        }
    }
}

/// A detected crossover, emitted by a stream worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossEvent {
    pub key: MonitorKey,
    pub direction: CrossDirection,
}

impl CrossEvent {
    /// Operator-facing text, e.g. `[EURUSD 1m] Bullish MA crossover!`.
    pub fn message(&self) -> String {
        format!(
            "[{} {}m] {} MA crossover!",
            self.key.symbol,
            self.key.minutes(),
            self.direction
        )
    }
}
