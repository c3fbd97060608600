//! Time-weighted statistics
//!
//! Tracks a piecewise-constant quantity (queue length, units in use) and
//! its time integral so that averages are weighted by how long each
//! value was held, not by how often it changed.

use crate::core::time::SimTime;
use serde::Serialize;

/// Running time-weighted statistic of an integer quantity
///
/// # Example
/// ```
/// use flow_simulator_core_rs::models::TimeWeightedStat;
/// use flow_simulator_core_rs::SimTime;
///
/// let mut stat = TimeWeightedStat::new(SimTime::ZERO);
/// stat.record(SimTime::new(10), 2); // 0 for 10 ticks
/// stat.record(SimTime::new(20), 0); // 2 for 10 ticks
/// assert_eq!(stat.average(SimTime::new(20)), 1.0);
/// assert_eq!(stat.max(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeWeightedStat {
    start: SimTime,
    last_time: SimTime,
    value: u64,
    /// Integral of the value over ticks since `start`
    area: f64,
    min: u64,
    max: u64,
}

impl TimeWeightedStat {
    /// Start tracking at `now` with value 0
    pub fn new(now: SimTime) -> Self {
        Self {
            start: now,
            last_time: now,
            value: 0,
            area: 0.0,
            min: 0,
            max: 0,
        }
    }

    /// Record that the quantity changed to `value` at `now`
    pub fn record(&mut self, now: SimTime, value: u64) {
        let held = now.since(self.last_time).unwrap_or(0);
        self.area += self.value as f64 * held as f64;
        self.last_time = now;
        self.value = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Current value
    pub fn current(&self) -> u64 {
        self.value
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Time-weighted average up to `now`
    ///
    /// Returns the current value when no time has elapsed.
    pub fn average(&self, now: SimTime) -> f64 {
        let span = now.since(self.start).unwrap_or(0);
        if span == 0 {
            return self.value as f64;
        }
        let held = now.since(self.last_time).unwrap_or(0);
        (self.area + self.value as f64 * held as f64) / span as f64
    }

    /// Restart accumulation at `now`, keeping the current value
    pub fn reset(&mut self, now: SimTime) {
        self.start = now;
        self.last_time = now;
        self.area = 0.0;
        self.min = self.value;
        self.max = self.value;
    }
}
