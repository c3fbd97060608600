//! Event logging for simulation replay and auditing.
//!
//! This module defines the Event enum which captures every state change
//! of the process-flow layer. Events enable:
//! - Deterministic replay checks (two runs of the same model produce the
//!   same log, and therefore the same digest)
//! - Debugging (what happened to an item, and when)
//! - Analysis (throughput, waiting, utilisation)
//!
//! # Event Types
//!
//! - **Lifecycle**: item created / destroyed
//! - **Queue**: add, remove, renege
//! - **Resource**: seize, release
//! - **Service**: state-machine transitions
//! - **Container**: item packed into / unpacked from a container
//!
//! # Example
//!
//! ```rust
//! use flow_simulator_core_rs::models::{Event, EventLog, ItemId};
//!
//! let mut log = EventLog::new();
//! log.log(Event::QueueAdd {
//!     tick: 10,
//!     queue: "Queue1".to_string(),
//!     item: ItemId::new(1),
//!     priority: 0,
//!     match_value: None,
//! });
//!
//! assert_eq!(log.events()[0].tick(), 10);
//! assert_eq!(log.digest().unwrap().len(), 64);
//! ```

use crate::core::error::{SimError, SimResult};
use crate::models::ItemId;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Simulation event capturing a state change.
///
/// All events include a tick number for temporal ordering.
/// Events are logged in the order they occur within a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// New item entered the model
    ItemCreated {
        tick: u64,
        item: ItemId,
        name: String,
        created_by: String,
    },

    /// Item left the model
    ItemDestroyed { tick: u64, item: ItemId },

    /// Item started waiting in a queue
    QueueAdd {
        tick: u64,
        queue: String,
        item: ItemId,
        priority: i32,
        match_value: Option<String>,
    },

    /// Item was taken out of a queue
    QueueRemove {
        tick: u64,
        queue: String,
        item: ItemId,
    },

    /// Item gave up waiting
    Renege {
        tick: u64,
        queue: String,
        item: ItemId,
    },

    /// Units of a resource were seized
    Seize {
        tick: u64,
        resource: String,
        units: u32,
        in_use: u32,
    },

    /// Units of a resource were returned
    Release {
        tick: u64,
        resource: String,
        units: u32,
        in_use: u32,
    },

    /// A service component changed state
    ServiceTransition {
        tick: u64,
        component: String,
        from: String,
        to: String,
    },

    /// Item was inserted into a container
    Packed {
        tick: u64,
        container: ItemId,
        item: ItemId,
    },

    /// Item was taken out of a container
    Unpacked {
        tick: u64,
        container: ItemId,
        item: ItemId,
    },
}

impl Event {
    /// Get the tick number when this event occurred
    pub fn tick(&self) -> u64 {
        match self {
            Event::ItemCreated { tick, .. } => *tick,
            Event::ItemDestroyed { tick, .. } => *tick,
            Event::QueueAdd { tick, .. } => *tick,
            Event::QueueRemove { tick, .. } => *tick,
            Event::Renege { tick, .. } => *tick,
            Event::Seize { tick, .. } => *tick,
            Event::Release { tick, .. } => *tick,
            Event::ServiceTransition { tick, .. } => *tick,
            Event::Packed { tick, .. } => *tick,
            Event::Unpacked { tick, .. } => *tick,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::ItemCreated { .. } => "ItemCreated",
            Event::ItemDestroyed { .. } => "ItemDestroyed",
            Event::QueueAdd { .. } => "QueueAdd",
            Event::QueueRemove { .. } => "QueueRemove",
            Event::Renege { .. } => "Renege",
            Event::Seize { .. } => "Seize",
            Event::Release { .. } => "Release",
            Event::ServiceTransition { .. } => "ServiceTransition",
            Event::Packed { .. } => "Packed",
            Event::Unpacked { .. } => "Unpacked",
        }
    }

    /// Item the event concerns, if any
    pub fn item(&self) -> Option<ItemId> {
        match self {
            Event::ItemCreated { item, .. }
            | Event::ItemDestroyed { item, .. }
            | Event::QueueAdd { item, .. }
            | Event::QueueRemove { item, .. }
            | Event::Renege { item, .. }
            | Event::Packed { item, .. }
            | Event::Unpacked { item, .. } => Some(*item),
            _ => None,
        }
    }

    /// Queue, resource or component the event concerns, if any
    pub fn owner(&self) -> Option<&str> {
        match self {
            Event::ItemCreated { created_by, .. } => Some(created_by),
            Event::QueueAdd { queue, .. }
            | Event::QueueRemove { queue, .. }
            | Event::Renege { queue, .. } => Some(queue),
            Event::Seize { resource, .. } | Event::Release { resource, .. } => Some(resource),
            Event::ServiceTransition { component, .. } => Some(component),
            _ => None,
        }
    }
}

/// Event log for storing and querying simulation events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get all events
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Get events for a specific tick
    pub fn events_at_tick(&self, tick: u64) -> Vec<&Event> {
        self.events.iter().filter(|e| e.tick() == tick).collect()
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events for a specific item
    pub fn events_for_item(&self, item: ItemId) -> Vec<&Event> {
        self.events.iter().filter(|e| e.item() == Some(item)).collect()
    }

    /// Get events for a named queue, resource or component
    pub fn events_for_owner(&self, name: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.owner() == Some(name))
            .collect()
    }

    /// SHA-256 hex digest of the log's canonical JSON form
    ///
    /// Field order is fixed by the `Event` definition, so equal logs
    /// always hash equal.
    pub fn digest(&self) -> SimResult<String> {
        let json = serde_json::to_string(&self.events)
            .map_err(|e| SimError::Serialization(format!("Event log serialization failed: {}", e)))?;

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        let result = hasher.finalize();

        Ok(format!("{:x}", result))
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(tick: u64, item: u64) -> Event {
        Event::QueueAdd {
            tick,
            queue: "Q".to_string(),
            item: ItemId::new(item),
            priority: 0,
            match_value: Some("A".to_string()),
        }
    }

    #[test]
    fn test_event_type_and_owner() {
        let event = Event::Seize {
            tick: 3,
            resource: "Crane".to_string(),
            units: 2,
            in_use: 2,
        };
        assert_eq!(event.event_type(), "Seize");
        assert_eq!(event.owner(), Some("Crane"));
        assert_eq!(event.item(), None);
    }

    #[test]
    fn test_filters() {
        let mut log = EventLog::new();
        log.log(add(1, 1));
        log.log(add(1, 2));
        log.log(Event::ItemDestroyed {
            tick: 2,
            item: ItemId::new(1),
        });

        assert_eq!(log.events_at_tick(1).len(), 2);
        assert_eq!(log.events_of_type("ItemDestroyed").len(), 1);
        assert_eq!(log.events_for_item(ItemId::new(1)).len(), 2);
        assert_eq!(log.events_for_owner("Q").len(), 2);
    }

    #[test]
    fn test_digest_is_content_sensitive() {
        let mut a = EventLog::new();
        let mut b = EventLog::new();
        a.log(add(1, 1));
        b.log(add(1, 1));
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());

        b.log(add(2, 2));
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }
}
