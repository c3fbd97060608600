//! Counting resources
//!
//! A [`Resource`] is an integer-unit semaphore. Callers check
//! [`available_units`](Resource::available_units) before seizing; under
//! the single-threaded event loop nothing can run between the check and
//! the seize. Seizing more than is available, or releasing more than is
//! in use, is an error and never clamps.
//!
//! # Invariant
//!
//! `0 <= in_use <= capacity` after every operation.

use crate::core::time::SimTime;
use crate::events::EventHandle;
use crate::models::stats::TimeWeightedStat;
use crate::models::ComponentId;
use thiserror::Error;

/// Errors from seize/release
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("cannot seize {requested} units, only {available} available")]
    InsufficientUnits { requested: u32, available: u32 },

    #[error("cannot release {requested} units, only {in_use} in use")]
    OverRelease { requested: u32, in_use: u32 },
}

/// A named pool of identical units
///
/// # Example
/// ```
/// use flow_simulator_core_rs::models::Resource;
/// use flow_simulator_core_rs::SimTime;
///
/// let mut crane = Resource::new("Crane", 2);
/// crane.seize(2, SimTime::ZERO).unwrap();
/// assert_eq!(crane.available_units(), 0);
/// assert!(crane.release(3, SimTime::new(1)).is_err());
/// crane.release(1, SimTime::new(1)).unwrap();
/// assert_eq!(crane.available_units(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Resource {
    name: String,
    capacity: u32,
    in_use: u32,
    /// Seize components waiting on this resource, in declaration order
    pub(crate) users: Vec<ComponentId>,
    /// Pending de-duplicated "units released" notification
    pub(crate) notify: Option<EventHandle>,
    stats: TimeWeightedStat,
    units_seized: u64,
    units_released: u64,
}

impl Resource {
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            in_use: 0,
            users: Vec::new(),
            notify: None,
            stats: TimeWeightedStat::new(SimTime::ZERO),
            units_seized: 0,
            units_released: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn units_in_use(&self) -> u32 {
        self.in_use
    }

    /// Units that can be seized right now. O(1).
    pub fn available_units(&self) -> u32 {
        self.capacity - self.in_use
    }

    pub fn users(&self) -> &[ComponentId] {
        &self.users
    }

    pub(crate) fn register_user(&mut self, user: ComponentId) {
        if !self.users.contains(&user) {
            self.users.push(user);
        }
    }

    /// Take `n` units
    pub fn seize(&mut self, n: u32, now: SimTime) -> Result<(), ResourceError> {
        let available = self.available_units();
        if n > available {
            return Err(ResourceError::InsufficientUnits {
                requested: n,
                available,
            });
        }
        self.in_use += n;
        self.units_seized += n as u64;
        self.stats.record(now, self.in_use as u64);
        Ok(())
    }

    /// Return `n` units
    pub fn release(&mut self, n: u32, now: SimTime) -> Result<(), ResourceError> {
        if n > self.in_use {
            return Err(ResourceError::OverRelease {
                requested: n,
                in_use: self.in_use,
            });
        }
        self.in_use -= n;
        self.units_released += n as u64;
        self.stats.record(now, self.in_use as u64);
        Ok(())
    }

    pub fn units_seized(&self) -> u64 {
        self.units_seized
    }

    pub fn units_released(&self) -> u64 {
        self.units_released
    }

    /// Time-weighted average of units in use up to `now`
    pub fn average_in_use(&self, now: SimTime) -> f64 {
        self.stats.average(now)
    }

    pub fn max_in_use(&self) -> u64 {
        self.stats.max()
    }

    /// Reset counters and utilisation statistics; seized units are kept
    pub fn clear_statistics(&mut self, now: SimTime) {
        self.units_seized = 0;
        self.units_released = 0;
        self.stats.reset(now);
    }
}
