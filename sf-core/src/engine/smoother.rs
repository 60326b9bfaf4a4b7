//! Rolling mean over the last few temperature samples

use std::collections::VecDeque;

use crate::constants::temperature::SMOOTHING_WINDOW;
use crate::engine::round2;

/// Fixed-size ring of temperature samples.
///
/// The window is warm-started: the first sample fills every slot so the
/// mean is never biased toward zero while the window fills up.
#[derive(Debug, Clone)]
pub struct TemperatureSmoother {
    window: VecDeque<f64>,
    capacity: usize,
}

impl TemperatureSmoother {
    /// Create an empty smoother with the default window of five samples
    pub fn new() -> Self {
        Self::with_capacity(SMOOTHING_WINDOW)
    }

    /// Create an empty smoother with a custom window size (at least 1)
    fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Create a smoother whose window is pre-filled with `initial`
    pub fn warm(initial: f64) -> Self {
        let mut smoother = Self::new();
        smoother.fill(initial);
        smoother
    }

    fn fill(&mut self, sample: f64) {
        self.window.clear();
        self.window.extend(std::iter::repeat(sample).take(self.capacity));
    }

    /// Insert a sample, dropping the oldest, and return the rounded mean
    pub fn push(&mut self, sample: f64) -> f64 {
        if self.window.is_empty() {
            self.fill(sample);
        } else {
            self.window.pop_front();
            self.window.push_back(sample);
        }
        self.mean()
    }

    /// Mean of the window rounded to two decimals, or `None` before the first sample
    pub fn current(&self) -> Option<f64> {
        if self.window.is_empty() {
            None
        } else {
            Some(self.mean())
        }
    }

    fn mean(&self) -> f64 {
        let sum: f64 = self.window.iter().sum();
        round2(sum / self.window.len() as f64)
    }

    /// Samples currently held, oldest first
    pub fn samples(&self) -> impl Iterator<Item = &f64> {
        self.window.iter()
    }
}

impl Default for TemperatureSmoother {
    fn default() -> Self {
        Self::new()
    }
}
