pub mod crossover;

pub use crossover::{detect, sma, CrossoverDetector};
