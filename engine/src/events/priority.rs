//! Priority bands for events that share a tick
//!
//! Every subsystem schedules through one of these bands; no other
//! numeric priorities exist. Lower values fire first within a tick.
//!
//! | Band          | Value | Used by                                        |
//! |---------------|-------|------------------------------------------------|
//! | `Normal`      | 1     | arrivals, timed process wake-ups, user actions |
//! | `Notify`      | 2     | queue / resource "contents changed" batches    |
//! | `Conditional` | 3     | resumption of `WaitUntil` processes            |
//! | `ServiceStep` | 4     | LinkedService step completions                 |
//! | `Renege`      | 5     | renege checks (FIFO within the band)           |
//!
//! `Notify` sits after `Normal` so that every arrival in a tick settles
//! before consumers re-evaluate once. Renege checks run last so that a
//! service completing in the same tick claims its item first.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordering band of a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Normal = 1,
    Notify = 2,
    Conditional = 3,
    ServiceStep = 4,
    Renege = 5,
}

impl Priority {
    /// Numeric value of the band
    pub fn value(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_order_matches_values() {
        let bands = [
            Priority::Normal,
            Priority::Notify,
            Priority::Conditional,
            Priority::ServiceStep,
            Priority::Renege,
        ];
        for pair in bands.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].value() < pair[1].value());
        }
    }
}
