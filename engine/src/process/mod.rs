//! Cooperative processes
//!
//! A process is a piece of domain logic that runs on the simulation's
//! single thread and gives control back only at explicit suspension
//! points. Instead of a native coroutine, a suspended process is plain
//! data: the [`Process`] value itself holds whatever locals it needs,
//! and each call to [`Process::resume`] runs it up to its next
//! suspension point, returned as a [`Step`].
//!
//! # Suspension points
//!
//! - [`Step::WaitTicks`] / [`Step::WaitSeconds`]: resume after a delay
//!   (normal priority band)
//! - [`Step::WaitUntil`]: the condition is evaluated immediately; if it
//!   already holds the process continues without suspending. Otherwise it
//!   is re-evaluated after every contents-changed notification and on
//!   [`Simulation::trigger_conditions`], and the process is resumed in
//!   the conditional band once it holds. The condition is checked again
//!   when that resume fires; if other logic made it false in between,
//!   the process goes back to waiting. Conditions must be free of side
//!   effects since they may be evaluated any number of times.
//! - [`Step::Done`]: the process ends and is dropped.
//!
//! # Example
//! ```
//! use flow_simulator_core_rs::orchestrator::{SimConfig, Simulation};
//! use flow_simulator_core_rs::process::{Process, Step};
//! use flow_simulator_core_rs::SimResult;
//!
//! struct Ticker {
//!     remaining: u32,
//! }
//!
//! impl Process for Ticker {
//!     fn resume(&mut self, _sim: &mut Simulation) -> SimResult<Step> {
//!         if self.remaining == 0 {
//!             return Ok(Step::Done);
//!         }
//!         self.remaining -= 1;
//!         Ok(Step::WaitTicks(10))
//!     }
//! }
//!
//! let mut sim = Simulation::new(SimConfig::default()).unwrap();
//! sim.start().unwrap();
//! sim.start_process("ticker", Box::new(Ticker { remaining: 3 })).unwrap();
//! sim.run().unwrap();
//! assert_eq!(sim.now().ticks(), 30);
//! ```
//!
//! [`Simulation::trigger_conditions`]: crate::orchestrator::Simulation::trigger_conditions

pub mod scheduler;

pub use scheduler::{ProcessScheduler, ProcessState};

use crate::core::error::SimResult;
use crate::orchestrator::Simulation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wake condition of a suspended process
pub type Condition = Box<dyn Fn(&Simulation) -> bool>;

/// Where a process suspended
pub enum Step {
    /// Resume after this many ticks
    WaitTicks(u64),
    /// Resume after this many seconds (rounded to the nearest tick)
    WaitSeconds(f64),
    /// Resume once the condition holds
    WaitUntil(Condition),
    /// Finished
    Done,
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::WaitTicks(n) => write!(f, "WaitTicks({})", n),
            Step::WaitSeconds(s) => write!(f, "WaitSeconds({})", s),
            Step::WaitUntil(_) => write!(f, "WaitUntil(..)"),
            Step::Done => write!(f, "Done"),
        }
    }
}

/// Resumable simulation logic
pub trait Process {
    /// Run until the next suspension point
    fn resume(&mut self, sim: &mut Simulation) -> SimResult<Step>;
}

impl<F> Process for F
where
    F: FnMut(&mut Simulation) -> SimResult<Step>,
{
    fn resume(&mut self, sim: &mut Simulation) -> SimResult<Step> {
        self(sim)
    }
}

/// Identifier of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(pub(crate) usize);

impl ProcessId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process#{}", self.0)
    }
}
