//! Root-level sampling gate.

use std::cell::RefCell;

use rand::{rngs, Rng, SeedableRng};
use tracing::warn;

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_entropy());
}

/// Decides once per root trace whether the trace is recorded.
///
/// The decision is a single coin flip against the configured rate; children
/// never re-sample and instead inherit the root decision through their
/// [`TraceContext`].
///
/// [`TraceContext`]: crate::TraceContext
#[derive(Clone, Debug)]
pub struct Sampler {
    rate: f64,
}

impl Sampler {
    /// Sampler drawing against `rate`. Rates outside `[0, 1]` are clamped.
    pub fn new(rate: f64) -> Self {
        let clamped = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        if clamped != rate {
            warn!(rate, "sampling rate outside [0.0, 1.0], clamped");
        }
        Sampler { rate: clamped }
    }

    /// Sampler that records every trace.
    pub fn always_on() -> Self {
        Sampler { rate: 1.0 }
    }

    /// Sampler that records no traces.
    pub fn always_off() -> Self {
        Sampler { rate: 0.0 }
    }

    /// The configured sampling rate.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Draw the per-root decision.
    pub fn should_sample(&self) -> bool {
        if self.rate >= 1.0 {
            return true;
        }
        if self.rate <= 0.0 {
            return false;
        }
        CURRENT_RNG.with(|rng| rng.borrow_mut().gen::<f64>()) <= self.rate
    }
}
