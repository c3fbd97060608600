//! Scheduled actions
//!
//! Every pending event carries one [`Action`]. Actions name their
//! targets by index into the simulation's tables, never by reference, so
//! the event queue owns nothing but plain data.

use crate::models::{ComponentId, ItemId, QueueId, ResourceId};
use crate::process::ProcessId;
use serde::Serialize;
use std::fmt;

/// What to do when an event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    /// Let every user of a queue re-evaluate after its contents changed
    NotifyQueueUsers(QueueId),
    /// Let every seizer of a resource re-evaluate after units were released
    NotifyResourceUsers(ResourceId),
    /// Re-check the wake conditions of suspended processes
    EvaluateConditions,
    /// Renege check for an item waiting in a queue
    Renege { queue: QueueId, item: ItemId },
    /// A service component's step completed
    EndStep(ComponentId),
    /// A service component should re-check whether it can start
    Restart(ComponentId),
    /// A generator's next arrival is due
    Generate(ComponentId),
    /// Resume a suspended process
    Resume(ProcessId),
}

impl Action {
    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Action::NotifyQueueUsers(_) => "notify_queue_users",
            Action::NotifyResourceUsers(_) => "notify_resource_users",
            Action::EvaluateConditions => "evaluate_conditions",
            Action::Renege { .. } => "renege",
            Action::EndStep(_) => "end_step",
            Action::Restart(_) => "restart",
            Action::Generate(_) => "generate",
            Action::Resume(_) => "resume",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::NotifyQueueUsers(q) => write!(f, "{}({})", self.label(), q),
            Action::NotifyResourceUsers(r) => write!(f, "{}({})", self.label(), r),
            Action::EvaluateConditions => write!(f, "{}", self.label()),
            Action::Renege { queue, item } => write!(f, "{}({}, {})", self.label(), queue, item),
            Action::EndStep(c) | Action::Restart(c) | Action::Generate(c) => {
                write!(f, "{}({})", self.label(), c)
            }
            Action::Resume(p) => write!(f, "{}({})", self.label(), p),
        }
    }
}
