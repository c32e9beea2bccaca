pub mod commands;
pub mod deriv;
pub mod events;
pub mod feed;
pub mod registry;
pub mod worker;

#[cfg(test)]
mod testing;

pub use commands::{CommandError, CommandProcessor, MonitorCommand};
pub use deriv::DerivFeed;
pub use events::{EventDispatcher, EventLog};
pub use feed::{FeedConnector, FeedMessage, FeedSession};
pub use registry::MonitorRegistry;
pub use worker::{StreamWorker, WorkerContext, WorkerHandle, WorkerState};
