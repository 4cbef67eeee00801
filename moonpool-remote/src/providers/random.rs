//! Random number provider, used for backoff jitter.

use rand::prelude::*;
use std::cell::RefCell;

/// Provider trait for random number generation.
///
/// Tests plug in a fixed source to make retry delays predictable.
pub trait RandomProvider: Clone {
    /// Generate a random f64 between 0.0 and 1.0.
    fn random_ratio(&self) -> f64;
}

/// Production random provider using the thread-local RNG.
#[derive(Clone, Debug, Default)]
pub struct TokioRandomProvider;

impl TokioRandomProvider {
    /// Create a new production random provider.
    pub fn new() -> Self {
        Self
    }
}

thread_local! {
    static RNG: RefCell<rand::rngs::ThreadRng> = RefCell::new(rand::rng());
}

impl RandomProvider for TokioRandomProvider {
    fn random_ratio(&self) -> f64 {
        RNG.with(|rng| rng.borrow_mut().random())
    }
}
