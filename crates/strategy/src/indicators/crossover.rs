use common::CrossSignal;

/// Simple moving-average crossover detector.
///
/// Compares the fast and slow SMA at the latest close and at the close
/// before it. A cross requires a strict ordering on both sides: tangent
/// averages at either point produce `NoSignal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossoverDetector {
    pub fast: usize,
    pub slow: usize,
}

impl CrossoverDetector {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self { fast, slow }
    }

    /// Minimum number of closes before a signal can be produced.
    pub fn min_history(&self) -> usize {
        self.slow.saturating_add(2)
    }

    /// Evaluate a close series (oldest first).
    pub fn compute(&self, closes: &[f64]) -> CrossSignal {
        detect(closes, self.fast, self.slow)
    }
}

/// Evaluate `closes` (oldest first) for a fast/slow SMA crossover on the
/// latest sample.
///
/// Returns `NoSignal` when fewer than `slow + 2` closes are available or
/// when either window is zero. A window longer than the available history
/// averages whatever history there is.
pub fn detect(closes: &[f64], fast: usize, slow: usize) -> CrossSignal {
    if fast == 0 || slow == 0 || closes.len() < slow.saturating_add(2) {
        return CrossSignal::NoSignal;
    }

    let prev = &closes[..closes.len() - 1];

    let fast_now = sma(closes, fast);
    let slow_now = sma(closes, slow);
    let fast_prev = sma(prev, fast);
    let slow_prev = sma(prev, slow);

    if fast_prev < slow_prev && fast_now > slow_now {
        CrossSignal::BullishCross
    } else if fast_prev > slow_prev && fast_now < slow_now {
        CrossSignal::BearishCross
    } else {
        CrossSignal::NoSignal
    }
}

/// Arithmetic mean of the last `period` values in `data`.
pub fn sma(data: &[f64], period: usize) -> f64 {
    let window = &data[data.len().saturating_sub(period)..];
    if window.is_empty() {
        return 0.0;
    }
    window.iter().sum::<f64>() / window.len() as f64
}
