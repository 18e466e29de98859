//! Chaos monkey for store operations - random failures and delays.
//!
//! Rolls happen synchronously and the outcome is applied afterwards, so no
//! RNG is held across an await point.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// What to do to one store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChaosEvent {
    /// Fail the call as if the store were unreachable
    Fail,
    /// Hold the call before letting it through
    Delay(Duration),
    /// No chaos - pass through
    None,
}

/// Chaos monkey for injecting random store failures into tests.
///
/// # Example
///
/// ```
/// use rankd_test_support::chaos::{ChaosEvent, ChaosMonkey};
///
/// let monkey = ChaosMonkey::seeded(7).with_failure_probability(1.0);
/// assert_eq!(monkey.decide(), ChaosEvent::Fail);
/// ```
pub struct ChaosMonkey {
    failure_probability: f64,
    delay_probability: f64,
    delay_min_us: u64,
    delay_max_us: u64,
    rng: Mutex<StdRng>,
    events_triggered: AtomicUsize,
}

impl Default for ChaosMonkey {
    fn default() -> Self {
        Self::new()
    }
}

impl ChaosMonkey {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible sequence of rolls.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            failure_probability: 0.0,
            delay_probability: 0.0,
            delay_min_us: 100,
            delay_max_us: 10_000,
            rng: Mutex::new(rng),
            events_triggered: AtomicUsize::new(0),
        }
    }

    /// Create an aggressive chaos monkey for stress testing
    pub fn aggressive() -> Self {
        Self::new()
            .with_failure_probability(0.2)
            .with_delay_probability(0.1)
    }

    /// Create a mild chaos monkey for basic testing
    pub fn mild() -> Self {
        Self::new()
            .with_failure_probability(0.02)
            .with_delay_probability(0.01)
    }

    pub fn with_failure_probability(mut self, prob: f64) -> Self {
        self.failure_probability = prob.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay_probability(mut self, prob: f64) -> Self {
        self.delay_probability = prob.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay_range(mut self, min: Duration, max: Duration) -> Self {
        self.delay_min_us = min.as_micros() as u64;
        self.delay_max_us = (max.as_micros() as u64).max(self.delay_min_us);
        self
    }

    /// Decide what chaos event to apply (if any)
    pub fn decide(&self) -> ChaosEvent {
        let mut rng = self.rng.lock();
        let roll = rng.gen::<f64>();
        let mut threshold = self.failure_probability;

        if roll < threshold {
            self.events_triggered.fetch_add(1, Ordering::Relaxed);
            return ChaosEvent::Fail;
        }

        threshold += self.delay_probability;
        if roll < threshold {
            self.events_triggered.fetch_add(1, Ordering::Relaxed);
            let us = rng.gen_range(self.delay_min_us..=self.delay_max_us);
            return ChaosEvent::Delay(Duration::from_micros(us));
        }

        ChaosEvent::None
    }

    /// Get number of chaos events triggered
    pub fn events_triggered(&self) -> usize {
        self.events_triggered.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_chaos() {
        let monkey = ChaosMonkey::new();
        for _ in 0..1000 {
            assert_eq!(monkey.decide(), ChaosEvent::None);
        }
        assert_eq!(monkey.events_triggered(), 0);
    }

    #[test]
    fn test_always_fail() {
        let monkey = ChaosMonkey::new().with_failure_probability(1.0);
        for _ in 0..10 {
            assert_eq!(monkey.decide(), ChaosEvent::Fail);
        }
        assert_eq!(monkey.events_triggered(), 10);
    }

    #[test]
    fn test_delay_within_range() {
        let monkey = ChaosMonkey::new()
            .with_delay_probability(1.0)
            .with_delay_range(Duration::from_millis(1), Duration::from_millis(2));
        for _ in 0..100 {
            match monkey.decide() {
                ChaosEvent::Delay(d) => {
                    assert!(d >= Duration::from_millis(1) && d <= Duration::from_millis(2))
                }
                other => panic!("expected delay, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let a = ChaosMonkey::seeded(42).with_failure_probability(0.5);
        let b = ChaosMonkey::seeded(42).with_failure_probability(0.5);
        let rolls_a: Vec<_> = (0..50).map(|_| a.decide()).collect();
        let rolls_b: Vec<_> = (0..50).map(|_| b.decide()).collect();
        assert_eq!(rolls_a, rolls_b);
    }
}
