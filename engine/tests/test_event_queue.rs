//! Tests for the pending-event set
//!
//! Covers same-tick ordering, cancellation and clock monotonicity.

use flow_simulator_core_rs::events::{EventQueue, Priority};
use flow_simulator_core_rs::{SimError, SimTime};
use proptest::prelude::*;

fn drain(queue: &mut EventQueue<u32>) -> Vec<u32> {
    let mut fired = Vec::new();
    while let Some((_, action)) = queue.pop() {
        fired.push(action);
    }
    fired
}

#[test]
fn test_fifo_events_fire_in_scheduling_order() {
    let mut queue = EventQueue::new();
    for i in 0..5 {
        queue.schedule_ticks(3, Priority::Normal, true, i).unwrap();
    }
    assert_eq!(drain(&mut queue), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_lifo_events_fire_newest_first() {
    let mut queue = EventQueue::new();
    for i in 0..4 {
        queue.schedule_ticks(0, Priority::Notify, false, i).unwrap();
    }
    assert_eq!(drain(&mut queue), vec![3, 2, 1, 0]);
}

#[test]
fn test_lifo_precedes_fifo_within_band() {
    let mut queue = EventQueue::new();
    queue.schedule_ticks(1, Priority::Normal, true, 1).unwrap();
    queue.schedule_ticks(1, Priority::Normal, false, 2).unwrap();
    queue.schedule_ticks(1, Priority::Normal, true, 3).unwrap();
    assert_eq!(drain(&mut queue), vec![2, 1, 3]);
}

#[test]
fn test_priority_band_dominates_sequence() {
    let mut queue = EventQueue::new();
    queue.schedule_ticks(2, Priority::Renege, true, 5).unwrap();
    queue.schedule_ticks(2, Priority::ServiceStep, true, 4).unwrap();
    queue.schedule_ticks(2, Priority::Conditional, true, 3).unwrap();
    queue.schedule_ticks(2, Priority::Notify, true, 2).unwrap();
    queue.schedule_ticks(2, Priority::Normal, true, 1).unwrap();
    assert_eq!(drain(&mut queue), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_earlier_tick_always_first() {
    let mut queue = EventQueue::new();
    queue.schedule_ticks(10, Priority::Normal, true, 10).unwrap();
    queue.schedule_ticks(9, Priority::Renege, true, 9).unwrap();
    assert_eq!(drain(&mut queue), vec![9, 10]);
    assert_eq!(queue.now(), SimTime::new(10));
}

#[test]
fn test_cancelled_event_never_fires() {
    let mut queue = EventQueue::new();
    let keep = queue.schedule_ticks(1, Priority::Normal, true, 1).unwrap();
    let drop = queue.schedule_ticks(1, Priority::Normal, true, 2).unwrap();

    assert!(queue.cancel(drop));
    assert!(!queue.is_scheduled(&drop));
    assert!(queue.is_scheduled(&keep));
    assert_eq!(drain(&mut queue), vec![1]);
}

#[test]
fn test_cancel_after_fire_is_noop() {
    let mut queue = EventQueue::new();
    let handle = queue.schedule_ticks(1, Priority::Normal, true, 1).unwrap();
    queue.pop().unwrap();

    assert!(!queue.is_scheduled(&handle));
    assert!(!queue.cancel(handle));
    assert!(!queue.cancel(handle));
    assert_eq!(queue.events_fired(), 1);
}

#[test]
fn test_handle_reports_due_time() {
    let mut queue = EventQueue::new();
    queue.schedule_ticks(4, Priority::Normal, true, 0).unwrap();
    queue.pop().unwrap();
    let handle = queue.schedule_ticks(6, Priority::Normal, true, 1).unwrap();
    assert_eq!(handle.due(), SimTime::new(10));
    assert_eq!(queue.get(&handle), Some(&1));
}

#[test]
fn test_negative_delay_rejected() {
    let mut queue: EventQueue<u32> = EventQueue::new();
    let err = queue.schedule_ticks(-1, Priority::Normal, true, 0).unwrap_err();
    assert_eq!(err, SimError::NegativeDelay(-1));
    assert!(queue.is_empty());
}

#[test]
fn test_schedule_in_past_rejected() {
    let mut queue = EventQueue::new();
    queue.schedule_ticks(5, Priority::Normal, true, 0).unwrap();
    queue.pop().unwrap();

    let err = queue.schedule_at(SimTime::new(4), Priority::Normal, true, 1).unwrap_err();
    assert!(matches!(err, SimError::NonCausal { .. }));
}

#[test]
fn test_advance_to_moves_clock_without_firing() {
    let mut queue = EventQueue::new();
    queue.schedule_ticks(20, Priority::Normal, true, 0).unwrap();
    queue.advance_to(SimTime::new(15)).unwrap();

    assert_eq!(queue.now(), SimTime::new(15));
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.events_fired(), 0);
    assert!(queue.advance_to(SimTime::new(3)).is_err());
}

proptest! {
    /// Popped keys are non-decreasing whatever the scheduling order
    #[test]
    fn prop_pop_order_is_monotonic(
        events in prop::collection::vec((0i64..50, 0usize..5, any::<bool>()), 1..100),
        cancel_mask in prop::collection::vec(any::<bool>(), 100),
    ) {
        let bands = [
            Priority::Normal,
            Priority::Notify,
            Priority::Conditional,
            Priority::ServiceStep,
            Priority::Renege,
        ];
        let mut queue = EventQueue::new();
        let mut handles = Vec::new();
        for (i, (delay, band, fifo)) in events.iter().enumerate() {
            handles.push(queue.schedule_ticks(*delay, bands[*band], *fifo, i).unwrap());
        }

        let mut expected = events.len();
        for (handle, cancel) in handles.iter().zip(cancel_mask.iter()) {
            if *cancel && queue.cancel(*handle) {
                expected -= 1;
            }
        }

        let mut last = None;
        let mut fired = 0;
        while let Some((key, _)) = queue.pop() {
            if let Some(prev) = last {
                prop_assert!(prev < key);
            }
            prop_assert_eq!(queue.now(), key.tick);
            last = Some(key);
            fired += 1;
        }
        prop_assert_eq!(fired, expected);
    }
}
