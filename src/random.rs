//! Sources of randomness for allocation draws.
use std::cell::Cell;

use rand::{thread_rng, Rng};

pub trait RandomSource {
    /// Uniform fraction in `[0, 1)`. Implementations may return exactly `1.0`; allocation handles
    /// it by selecting the last variation.
    fn next_fraction(&self) -> f64;
}

/// The default source, backed by the thread-local generator.
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_fraction(&self) -> f64 {
        thread_rng().gen::<f64>()
    }
}

/// Replays a fixed sequence of fractions, repeating the last one once exhausted.
pub struct FixedRandom {
    values: Vec<f64>,
    draws: Cell<usize>,
}

impl FixedRandom {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self {
            values: values.into(),
            draws: Cell::new(0),
        }
    }

    /// Number of fractions handed out so far.
    pub fn draws(&self) -> usize {
        self.draws.get()
    }
}

impl RandomSource for FixedRandom {
    fn next_fraction(&self) -> f64 {
        let draws = self.draws.get();
        self.draws.set(draws + 1);
        self.values
            .get(draws)
            .or_else(|| self.values.last())
            .copied()
            .unwrap_or(0.0)
    }
}

impl<T: Fn() -> f64> RandomSource for T {
    fn next_fraction(&self) -> f64 {
        self()
    }
}
