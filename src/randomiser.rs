//! Randomised assignment of clients to a variant.
use std::sync::{Mutex, PoisonError};

use rand::{rngs::StdRng, thread_rng, Rng, SeedableRng};

use crate::{AssignmentWindow, CookieTime, Variant};

/// Source of uniformly distributed integers in `0..100`.
///
/// Implementations must be callable from many requests at once.
pub trait RandomSource {
    /// Draw one value in `0..100`.
    fn percentile(&self) -> u8;
}

/// The default source. Every thread draws from its own generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandomSource;

impl RandomSource for ThreadRandomSource {
    fn percentile(&self) -> u8 {
        thread_rng().gen_range(0..100)
    }
}

/// A reproducible source: one seeded generator shared behind a lock.
#[derive(Debug)]
pub struct SeededRandomSource(Mutex<StdRng>);

impl SeededRandomSource {
    #[allow(missing_docs)]
    pub fn new(seed: u64) -> Self {
        SeededRandomSource(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl RandomSource for SeededRandomSource {
    fn percentile(&self) -> u8 {
        // A panic while holding the lock cannot leave the generator in a broken state.
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..100)
    }
}

impl<F: Fn() -> u8> RandomSource for F {
    fn percentile(&self) -> u8 {
        self()
    }
}

/// Produces a fresh assignment window for a client that has none.
pub trait Randomiser {
    /// Window for a client assigned at `now`.
    fn assign(&self, now: CookieTime) -> AssignmentWindow;
}

impl<F: Fn(CookieTime) -> AssignmentWindow> Randomiser for F {
    fn assign(&self, now: CookieTime) -> AssignmentWindow {
        self(now)
    }
}

/// Sends roughly `percentage`% of fresh assignments to the new variant.
///
/// The winner's window ends a day after `now`; the loser's ends at `now` and so is already
/// expired.
#[derive(Debug, Clone)]
pub struct PercentageRandomiser<S = ThreadRandomSource> {
    percentage: u8,
    source: S,
}

impl PercentageRandomiser {
    /// Randomiser over [`ThreadRandomSource`]. `percentage` is capped at 100.
    pub fn new(percentage: u8) -> Self {
        PercentageRandomiser::with_source(percentage, ThreadRandomSource)
    }
}

impl<S: RandomSource> PercentageRandomiser<S> {
    /// Randomiser drawing from `source`. `percentage` is capped at 100.
    pub fn with_source(percentage: u8, source: S) -> Self {
        PercentageRandomiser {
            percentage: percentage.min(100),
            source,
        }
    }

    /// Share of fresh assignments that go to the new variant.
    pub fn percentage(&self) -> u8 {
        self.percentage
    }
}

impl<S: RandomSource> Randomiser for PercentageRandomiser<S> {
    fn assign(&self, now: CookieTime) -> AssignmentWindow {
        let variant = if self.source.percentile() < self.percentage {
            Variant::New
        } else {
            Variant::Old
        };
        AssignmentWindow::favouring(variant, now)
    }
}
