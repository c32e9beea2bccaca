pub mod config;
pub mod document;
pub mod error;
pub mod notify;
pub mod types;

pub use config::Settings;
pub use document::{ChatRef, ConfigStore, JsonFileStore, MonitorDocument};
pub use error::{Error, Result};
pub use notify::{LogNotifier, Notifier};
pub use types::*;
