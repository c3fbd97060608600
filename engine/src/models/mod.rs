//! Domain models for the process-flow kernel
//!
//! - [`ordered_set`]: the priority/sequence ordered multi-set with match
//!   partitions shared by queues and entity containers
//! - [`queue`]: waiting lines with renege timers and statistics
//! - [`resource`]: counting semaphores with a seizer registry
//! - [`item`]: the simulated work items and their containers
//! - [`event`]: the replayable domain event log

pub mod event;
pub mod item;
pub mod ordered_set;
pub mod queue;
pub mod resource;
pub mod stats;

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-exports
pub use event::{Event, EventLog};
pub use item::{EntStorage, Item, ItemRegistry};
pub use ordered_set::{Entry, EntryKey, OrderedMultiSet, SetError};
pub use queue::{select_match_value, sufficient_entities, Queue, RenegeConfig};
pub use resource::{Resource, ResourceError};
pub use stats::TimeWeightedStat;

/// Identifier of a simulated item (entity flowing through the model)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(u64);

impl ItemId {
    pub fn new(raw: u64) -> Self {
        ItemId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Index of a queue owned by the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueId(pub(crate) usize);

/// Index of a resource owned by the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub(crate) usize);

/// Index of a process-flow component owned by the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub(crate) usize);

macro_rules! index_id {
    ($($ty:ident => $prefix:literal),* $(,)?) => {
        $(
            impl $ty {
                /// Position in the owning simulation's table
                pub fn index(self) -> usize {
                    self.0
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!($prefix, "#{}"), self.0)
                }
            }
        )*
    };
}

index_id!(QueueId => "queue", ResourceId => "resource", ComponentId => "component");

/// Where a component sends the items it has finished with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    Queue(QueueId),
    Component(ComponentId),
}
