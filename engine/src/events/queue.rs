//! Pending-event set and virtual clock
//!
//! Events are kept in a `BTreeMap` keyed by [`EventKey`], so the next
//! event, insertion and cancellation are all O(log n). The key is unique
//! because every insertion draws a fresh sequence number from a
//! monotonic counter; that counter, not container iteration order, is
//! what makes same-tick ordering reproducible.
//!
//! # Same-tick ordering
//!
//! Events due at the same tick fire in priority-band order. Within a
//! band a FIFO event takes sequence `+n` and a LIFO event `-n`, so FIFO
//! events fire in scheduling order after any LIFO events, and LIFO
//! events fire newest first.

use crate::core::error::{SimError, SimResult};
use crate::core::time::SimTime;
use crate::events::priority::Priority;
use serde::Serialize;
use std::collections::BTreeMap;

/// Total order of pending events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventKey {
    /// Tick at which the event fires
    pub tick: SimTime,
    /// Band within the tick
    pub priority: Priority,
    /// Signed insertion sequence (`+n` FIFO, `-n` LIFO)
    pub seq: i64,
}

/// Cancellation token for one scheduled event
///
/// A handle is a weak reference: it never keeps the event alive and
/// becomes inert once the event fires or is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    key: EventKey,
}

impl EventHandle {
    /// Tick at which the referenced event is (or was) due
    pub fn due(&self) -> SimTime {
        self.key.tick
    }

    /// Key of the referenced event
    pub fn key(&self) -> EventKey {
        self.key
    }
}

/// Min-ordered set of pending events plus the current time
///
/// Generic over the action payload so the ordering rules can be used
/// (and tested) independently of the simulation's action type.
///
/// # Example
/// ```
/// use flow_simulator_core_rs::events::{EventQueue, Priority};
/// use flow_simulator_core_rs::SimTime;
///
/// let mut queue: EventQueue<&str> = EventQueue::new();
/// queue.schedule_ticks(5, Priority::Normal, true, "late").unwrap();
/// let early = queue.schedule_ticks(2, Priority::Normal, true, "early").unwrap();
/// let cancelled = queue.schedule_ticks(1, Priority::Normal, true, "never").unwrap();
/// assert!(queue.cancel(cancelled));
///
/// let (key, action) = queue.pop().unwrap();
/// assert_eq!(action, "early");
/// assert_eq!(key.tick, SimTime::new(2));
/// assert_eq!(queue.now(), SimTime::new(2));
/// assert!(!queue.is_scheduled(&early));
/// ```
#[derive(Debug, Clone)]
pub struct EventQueue<A> {
    pending: BTreeMap<EventKey, A>,
    now: SimTime,
    next_seq: i64,
    fired: u64,
}

impl<A> EventQueue<A> {
    /// Create an empty queue at time zero
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            now: SimTime::ZERO,
            next_seq: 0,
            fired: 0,
        }
    }

    /// Current virtual time
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Schedule `action` at absolute time `at`
    ///
    /// Fails with `NonCausal` if `at` is earlier than the current time.
    pub fn schedule_at(
        &mut self,
        at: SimTime,
        priority: Priority,
        fifo: bool,
        action: A,
    ) -> SimResult<EventHandle> {
        if at < self.now {
            return Err(SimError::NonCausal {
                requested: at,
                current: self.now,
            });
        }
        self.next_seq += 1;
        let seq = if fifo { self.next_seq } else { -self.next_seq };
        let key = EventKey {
            tick: at,
            priority,
            seq,
        };
        self.pending.insert(key, action);
        Ok(EventHandle { key })
    }

    /// Schedule `action` `delay` ticks after the current time
    ///
    /// Fails with `NegativeDelay` if `delay < 0`.
    pub fn schedule_ticks(
        &mut self,
        delay: i64,
        priority: Priority,
        fifo: bool,
        action: A,
    ) -> SimResult<EventHandle> {
        if delay < 0 {
            return Err(SimError::NegativeDelay(delay));
        }
        let at = self
            .now
            .plus(delay as u64)
            .ok_or(SimError::InvalidDuration(delay as f64))?;
        self.schedule_at(at, priority, fifo, action)
    }

    /// Cancel the event behind `handle`
    ///
    /// Returns `true` if a pending event was removed, `false` if it had
    /// already fired or been cancelled.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.pending.remove(&handle.key).is_some()
    }

    /// True while the event behind `handle` is still pending
    pub fn is_scheduled(&self, handle: &EventHandle) -> bool {
        self.pending.contains_key(&handle.key)
    }

    /// Action of a pending event
    pub fn get(&self, handle: &EventHandle) -> Option<&A> {
        self.pending.get(&handle.key)
    }

    /// Due time of the next event without removing it
    pub fn peek_time(&self) -> Option<SimTime> {
        self.pending.keys().next().map(|k| k.tick)
    }

    /// Remove the next event and advance the clock to its due tick
    pub fn pop(&mut self) -> Option<(EventKey, A)> {
        let (key, action) = self.pending.pop_first()?;
        debug_assert!(key.tick >= self.now, "virtual time went backward");
        self.now = key.tick;
        self.fired += 1;
        Some((key, action))
    }

    /// Move the clock forward to `t` without firing anything
    ///
    /// Fails with `NonCausal` if `t` is in the past. Events due before
    /// `t` must have been popped first.
    pub fn advance_to(&mut self, t: SimTime) -> SimResult<()> {
        if t < self.now {
            return Err(SimError::NonCausal {
                requested: t,
                current: self.now,
            });
        }
        debug_assert!(self.peek_time().map_or(true, |next| next >= t), "skipped a pending event");
        self.now = t;
        Ok(())
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of events popped so far
    pub fn events_fired(&self) -> u64 {
        self.fired
    }

    /// Iterate pending events in firing order
    pub fn iter(&self) -> impl Iterator<Item = (&EventKey, &A)> {
        self.pending.iter()
    }
}

impl<A> Default for EventQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut EventQueue<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        while let Some((_, a)) = queue.pop() {
            out.push(a);
        }
        out
    }

    #[test]
    fn test_fifo_same_tick_keeps_insertion_order() {
        let mut q = EventQueue::new();
        for i in 0..5 {
            q.schedule_ticks(3, Priority::Normal, true, i).unwrap();
        }
        assert_eq!(drain(&mut q), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_lifo_same_tick_runs_newest_first() {
        let mut q = EventQueue::new();
        for i in 0..3 {
            q.schedule_ticks(0, Priority::Notify, false, i).unwrap();
        }
        assert_eq!(drain(&mut q), vec![2, 1, 0]);
    }

    #[test]
    fn test_priority_band_beats_insertion_order() {
        let mut q = EventQueue::new();
        q.schedule_ticks(1, Priority::Renege, true, 5).unwrap();
        q.schedule_ticks(1, Priority::Notify, true, 2).unwrap();
        q.schedule_ticks(1, Priority::Normal, true, 1).unwrap();
        assert_eq!(drain(&mut q), vec![1, 2, 5]);
    }

    #[test]
    fn test_negative_delay_rejected() {
        let mut q: EventQueue<u32> = EventQueue::new();
        assert_eq!(
            q.schedule_ticks(-1, Priority::Normal, true, 0),
            Err(SimError::NegativeDelay(-1))
        );
        assert!(q.is_empty());
    }

    #[test]
    fn test_schedule_in_past_rejected() {
        let mut q = EventQueue::new();
        q.schedule_ticks(10, Priority::Normal, true, 0u32).unwrap();
        q.pop();
        let err = q.schedule_at(SimTime::new(3), Priority::Normal, true, 1).unwrap_err();
        assert!(matches!(err, SimError::NonCausal { .. }));
    }

    #[test]
    fn test_cancel_is_at_most_once() {
        let mut q = EventQueue::new();
        let h = q.schedule_ticks(4, Priority::Normal, true, 9u32).unwrap();
        assert!(q.is_scheduled(&h));
        assert!(q.cancel(h));
        assert!(!q.cancel(h));
        assert!(q.pop().is_none());
        assert_eq!(q.now(), SimTime::ZERO);
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut q = EventQueue::new();
        let h = q.schedule_ticks(0, Priority::Normal, true, 1u32).unwrap();
        let other = q.schedule_ticks(2, Priority::Normal, true, 2u32).unwrap();
        assert_eq!(q.pop().map(|(_, a)| a), Some(1));
        assert!(!q.cancel(h));
        assert!(q.is_scheduled(&other));
        assert_eq!(q.events_fired(), 1);
    }
}
