mod health;
mod summary;

pub use health::health_router;
pub use summary::summary_router;
