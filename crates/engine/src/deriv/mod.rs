pub mod stream;

pub use stream::DerivFeed;
