//! Process bookkeeping
//!
//! The scheduler tracks, for every process, where it is suspended and
//! which event (if any) will wake it. It does not run anything itself:
//! the simulation pops `Resume` events and hands the process body back
//! and forth through [`begin`](ProcessScheduler::begin) and the
//! `suspend_*` methods.
//!
//! A process body is taken out of its slot while it runs, so a running
//! process can freely call back into the simulation (including starting
//! or killing other processes).

use crate::events::EventHandle;
use crate::orchestrator::Simulation;
use crate::process::{Condition, Process, ProcessId};
use serde::Serialize;

/// Externally visible state of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessState {
    /// A resume event is pending
    Scheduled,
    /// Suspended on a wake condition
    WaitingOnCondition,
    /// Currently executing
    Running,
    /// Returned `Step::Done` or failed
    Finished,
    /// Killed before it finished
    Killed,
}

enum Wait {
    /// Resume event pending; a woken `WaitUntil` keeps its condition so
    /// it can be checked again when the event fires
    Event(EventHandle, Option<Condition>),
    Condition(Condition),
    Running,
    Finished,
    Killed,
}

struct Slot {
    name: String,
    body: Option<Box<dyn Process>>,
    wait: Wait,
}

/// Registry of processes and their wake-ups
#[derive(Default)]
pub struct ProcessScheduler {
    slots: Vec<Slot>,
    /// Condition waiters in suspension order
    waiting: Vec<ProcessId>,
}

impl ProcessScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new process; it counts as running until its first
    /// resume event is attached with [`suspend_on_event`](Self::suspend_on_event)
    pub(crate) fn spawn(&mut self, name: impl Into<String>, body: Box<dyn Process>) -> ProcessId {
        let id = ProcessId(self.slots.len());
        self.slots.push(Slot {
            name: name.into(),
            body: Some(body),
            wait: Wait::Running,
        });
        id
    }

    pub fn name(&self, id: ProcessId) -> Option<&str> {
        self.slots.get(id.0).map(|s| s.name.as_str())
    }

    pub fn state(&self, id: ProcessId) -> Option<ProcessState> {
        self.slots.get(id.0).map(|s| match s.wait {
            Wait::Event(..) => ProcessState::Scheduled,
            Wait::Condition(_) => ProcessState::WaitingOnCondition,
            Wait::Running => ProcessState::Running,
            Wait::Finished => ProcessState::Finished,
            Wait::Killed => ProcessState::Killed,
        })
    }

    /// Number of processes ever started
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of processes that have not finished or been killed
    pub fn live(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !matches!(s.wait, Wait::Finished | Wait::Killed))
            .count()
    }

    /// Take the body of a process whose resume event fired, with the
    /// condition it was woken on, if any
    ///
    /// Returns `None` for killed or finished processes.
    pub(crate) fn begin(&mut self, id: ProcessId) -> Option<(Box<dyn Process>, Option<Condition>)> {
        let slot = self.slots.get_mut(id.0)?;
        match std::mem::replace(&mut slot.wait, Wait::Running) {
            Wait::Event(_, condition) => slot.body.take().map(|body| (body, condition)),
            other => {
                slot.wait = other;
                None
            }
        }
    }

    /// Attach the pending resume event of a process
    pub(crate) fn suspend_on_event(&mut self, id: ProcessId, body: Option<Box<dyn Process>>, handle: EventHandle) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            if body.is_some() {
                slot.body = body;
            }
            slot.wait = Wait::Event(handle, None);
        }
        self.waiting.retain(|w| *w != id);
    }

    /// Move a condition waiter to a pending resume event, keeping its
    /// condition for the re-check at resume time
    pub(crate) fn wake(&mut self, id: ProcessId, handle: EventHandle) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.wait = match std::mem::replace(&mut slot.wait, Wait::Running) {
                Wait::Condition(condition) => Wait::Event(handle, Some(condition)),
                other => other,
            };
        }
        self.waiting.retain(|w| *w != id);
    }

    /// Park a process on a wake condition
    pub(crate) fn suspend_on_condition(&mut self, id: ProcessId, body: Box<dyn Process>, condition: Condition) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.body = Some(body);
            slot.wait = Wait::Condition(condition);
            self.waiting.push(id);
        }
    }

    /// Mark a process finished and drop its body
    pub(crate) fn finish(&mut self, id: ProcessId) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.body = None;
            slot.wait = Wait::Finished;
        }
    }

    /// Kill a suspended process
    ///
    /// Returns `(killed, pending event to cancel)`. Killing a running,
    /// finished or already killed process is a no-op.
    pub(crate) fn kill(&mut self, id: ProcessId) -> (bool, Option<EventHandle>) {
        let Some(slot) = self.slots.get_mut(id.0) else {
            return (false, None);
        };
        let handle = match slot.wait {
            Wait::Event(h, _) => Some(h),
            Wait::Condition(_) => None,
            Wait::Running | Wait::Finished | Wait::Killed => return (false, None),
        };
        slot.wait = Wait::Killed;
        slot.body = None;
        self.waiting.retain(|w| *w != id);
        (true, handle)
    }

    /// True if any process is parked on a condition
    pub fn has_waiters(&self) -> bool {
        !self.waiting.is_empty()
    }

    /// Condition waiters whose condition now holds, in suspension order
    pub(crate) fn ready(&self, sim: &Simulation) -> Vec<ProcessId> {
        self.waiting
            .iter()
            .copied()
            .filter(|id| match self.slots.get(id.0).map(|s| &s.wait) {
                Some(Wait::Condition(cond)) => cond(sim),
                _ => false,
            })
            .collect()
    }
}
