//! Time management for the simulation
//!
//! The simulation clock advances in discrete integer ticks. A fixed
//! tick length (ticks per second) converts between model seconds and
//! ticks; it is chosen once when the simulation is built and never
//! changes during a run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point on the virtual clock, in ticks since the start of the run.
///
/// # Example
/// ```
/// use flow_simulator_core_rs::SimTime;
///
/// let t = SimTime::new(10);
/// assert_eq!(t.ticks(), 10);
/// assert_eq!(t.plus(5), Some(SimTime::new(15)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SimTime(u64);

impl SimTime {
    /// Start of the run
    pub const ZERO: SimTime = SimTime(0);

    /// Create a time from a raw tick count
    #[inline]
    pub fn new(ticks: u64) -> Self {
        SimTime(ticks)
    }

    /// Raw tick count
    #[inline]
    pub fn ticks(self) -> u64 {
        self.0
    }

    /// The time `delay` ticks after `self`, or `None` on overflow
    #[inline]
    pub fn plus(self, delay: u64) -> Option<SimTime> {
        self.0.checked_add(delay).map(SimTime)
    }

    /// Ticks elapsed since `earlier`, or `None` if `earlier` is later than `self`
    #[inline]
    pub fn since(self, earlier: SimTime) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}", self.0)
    }
}

/// Conversion between model seconds and clock ticks
///
/// # Example
/// ```
/// use flow_simulator_core_rs::TimeBase;
///
/// let base = TimeBase::new(1000.0); // millisecond ticks
/// assert_eq!(base.seconds_to_ticks(1.5), Some(1500));
/// assert_eq!(base.ticks_to_seconds(250), 0.25);
/// assert_eq!(base.seconds_to_ticks(-1.0), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
    /// Number of ticks in one simulated second
    ticks_per_second: f64,
}

impl TimeBase {
    /// Default resolution: one microsecond per tick
    pub const DEFAULT_TICKS_PER_SECOND: f64 = 1_000_000.0;

    /// Create a time base
    ///
    /// # Panics
    /// Panics if `ticks_per_second` is not a positive finite number.
    /// Configuration paths validate this first and report
    /// `SimError::InvalidConfig` instead.
    pub fn new(ticks_per_second: f64) -> Self {
        assert!(
            ticks_per_second.is_finite() && ticks_per_second > 0.0,
            "ticks_per_second must be positive"
        );
        Self { ticks_per_second }
    }

    /// Ticks in one simulated second
    pub fn ticks_per_second(&self) -> f64 {
        self.ticks_per_second
    }

    /// Convert a duration in seconds to the nearest whole number of ticks.
    ///
    /// Returns `None` for negative, NaN or unrepresentable durations.
    pub fn seconds_to_ticks(&self, secs: f64) -> Option<u64> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        let ticks = (secs * self.ticks_per_second).round();
        if ticks >= u64::MAX as f64 {
            return None;
        }
        Some(ticks as u64)
    }

    /// Convert a tick count to seconds
    pub fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        ticks as f64 / self.ticks_per_second
    }

    /// Convert a point on the clock to seconds since the start of the run
    pub fn time_to_seconds(&self, time: SimTime) -> f64 {
        self.ticks_to_seconds(time.ticks())
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TICKS_PER_SECOND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "ticks_per_second must be positive")]
    fn test_zero_ticks_per_second_panics() {
        TimeBase::new(0.0);
    }

    #[test]
    fn test_rounds_to_nearest_tick() {
        let base = TimeBase::new(10.0);
        assert_eq!(base.seconds_to_ticks(0.04), Some(0));
        assert_eq!(base.seconds_to_ticks(0.05), Some(1));
        assert_eq!(base.seconds_to_ticks(0.26), Some(3));
    }

    #[test]
    fn test_rejects_nan_and_overflow() {
        let base = TimeBase::default();
        assert_eq!(base.seconds_to_ticks(f64::NAN), None);
        assert_eq!(base.seconds_to_ticks(f64::INFINITY), None);
        assert_eq!(base.seconds_to_ticks(1e300), None);
    }

    #[test]
    fn test_since() {
        assert_eq!(SimTime::new(30).since(SimTime::new(10)), Some(20));
        assert_eq!(SimTime::new(10).since(SimTime::new(30)), None);
    }
}
