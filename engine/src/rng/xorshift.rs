//! xorshift64* random number generator
//!
//! Small, fast and fully deterministic: the same seed always yields the
//! same sequence, on every platform. Random service times and
//! inter-arrival times draw from independent streams whose seeds are
//! derived from the run's master seed, so adding a random provider to a
//! model never shifts the samples of the providers built before it.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use flow_simulator_core_rs::RngManager;
///
/// let mut a = RngManager::new(12345);
/// let mut b = RngManager::new(12345);
/// assert_eq!(a.next(), b.next());
///
/// let u = a.next_f64();
/// assert!((0.0..1.0).contains(&u));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a generator; a zero seed is replaced by 1
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Next raw 64-bit value
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform value in `[0.0, 1.0)` with 53 bits of precision
    pub fn next_f64(&mut self) -> f64 {
        (self.next() >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Seed for an independent child stream
    ///
    /// The drawn value is passed through a splitmix64 finaliser so that
    /// consecutive child seeds are not correlated with the parent's own
    /// output sequence.
    pub fn derive_seed(&mut self) -> u64 {
        let mut z = self.next().wrapping_add(0x9E3779B97F4A7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Current internal state
    pub fn get_state(&self) -> u64 {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_seed_converted_to_nonzero() {
        let rng = RngManager::new(0);
        assert_ne!(rng.get_state(), 0, "Zero seed should be converted to 1");
    }

    #[test]
    fn test_next_f64_in_range() {
        let mut rng = RngManager::new(12345);
        for _ in 0..1000 {
            let val = rng.next_f64();
            assert!((0.0..1.0).contains(&val), "next_f64() produced {}", val);
        }
    }

    #[test]
    fn test_derived_streams_differ() {
        let mut master = RngManager::new(42);
        let a = master.derive_seed();
        let b = master.derive_seed();
        assert_ne!(a, b);

        let mut again = RngManager::new(42);
        assert_eq!(again.derive_seed(), a);
    }
}
