//! Property tests for the ordered multi-set
//!
//! Random insert/remove/pop sequences must keep the index, the match
//! partitions and the max-partition cache consistent with the entries.

use flow_simulator_core_rs::{ItemId, OrderedMultiSet, SetError, SimTime};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Insert { priority: i32, matched: Option<u8> },
    Remove(usize),
    PopFirst,
    PopForMatch(u8),
    QueryMax,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0i32..4, prop::option::of(0u8..4))
            .prop_map(|(priority, matched)| Op::Insert { priority, matched }),
        2 => (0usize..64).prop_map(Op::Remove),
        1 => Just(Op::PopFirst),
        1 => (0u8..4).prop_map(Op::PopForMatch),
        1 => Just(Op::QueryMax),
    ]
}

fn label(m: u8) -> String {
    format!("M{}", m)
}

/// Size of each match partition, recomputed from the entries
fn partition_sizes(set: &OrderedMultiSet) -> BTreeMap<String, usize> {
    let mut sizes = BTreeMap::new();
    for entry in set.iter() {
        if let Some(m) = &entry.match_value {
            *sizes.entry(m.clone()).or_insert(0) += 1;
        }
    }
    sizes
}

proptest! {
    #[test]
    fn prop_partitions_stay_consistent(
        ops in prop::collection::vec(op_strategy(), 1..200),
        fifo in any::<bool>(),
    ) {
        let mut set = OrderedMultiSet::new();
        let mut next_id = 0u64;

        for op in ops {
            match op {
                Op::Insert { priority, matched } => {
                    next_id += 1;
                    set.insert(ItemId::new(next_id), priority, matched.map(label), fifo, SimTime::ZERO)
                        .unwrap();
                }
                Op::Remove(n) => {
                    let items = set.items();
                    if !items.is_empty() {
                        let item = items[n % items.len()];
                        prop_assert_eq!(set.remove(item).unwrap().item, item);
                        prop_assert!(!set.contains(item));
                    }
                }
                Op::PopFirst => {
                    let expected = set.first().map(|e| e.item);
                    match set.pop_first() {
                        Ok(entry) => prop_assert_eq!(Some(entry.item), expected),
                        Err(e) => prop_assert_eq!(e, SetError::Empty),
                    }
                }
                Op::PopForMatch(m) => {
                    let value = label(m);
                    let expected = set.first_for_match(Some(&value)).map(|e| e.item);
                    if !set.is_empty() {
                        let popped = set.pop_first_for_match(Some(&value)).unwrap();
                        prop_assert_eq!(popped.map(|e| e.item), expected);
                    }
                }
                Op::QueryMax => {
                    let sizes = partition_sizes(&set);
                    let largest = sizes.values().copied().max().unwrap_or(0);
                    prop_assert_eq!(set.max_partition_size(), largest);
                    match set.max_partition_value() {
                        Some(m) => prop_assert_eq!(sizes.get(&m).copied(), Some(largest)),
                        None => prop_assert_eq!(largest, 0),
                    }
                }
            }

            prop_assert!(set.check_invariants().is_ok());
            let sizes = partition_sizes(&set);
            let partitioned: usize = sizes.values().sum();
            prop_assert_eq!(partitioned + set.unmatched_count(), set.len());
            prop_assert_eq!(set.distinct_match_count(), sizes.len());
        }
    }

    #[test]
    fn prop_iteration_respects_key_order(
        priorities in prop::collection::vec(0i32..5, 1..60),
        fifo in any::<bool>(),
    ) {
        let mut set = OrderedMultiSet::new();
        for (n, p) in priorities.iter().enumerate() {
            set.insert(ItemId::new(n as u64), *p, None, fifo, SimTime::ZERO).unwrap();
        }

        let entries: Vec<_> = set.iter().collect();
        for pair in entries.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            prop_assert!(a.priority() <= b.priority());
            if a.priority() == b.priority() {
                // Equal priority: arrival order for FIFO, reverse for LIFO
                if fifo {
                    prop_assert!(a.item < b.item);
                } else {
                    prop_assert!(a.item > b.item);
                }
            }
        }
    }
}

#[test]
fn test_match_none_counts_everything() {
    let mut set = OrderedMultiSet::new();
    set.insert(ItemId::new(1), 0, Some("A".to_string()), true, SimTime::ZERO).unwrap();
    set.insert(ItemId::new(2), 0, None, true, SimTime::ZERO).unwrap();

    assert_eq!(set.match_count(None), 2);
    assert_eq!(set.match_count(Some("A")), 1);
    assert_eq!(set.match_count(Some("Z")), 0);
    assert_eq!(
        set.pop_first_for_match(None).unwrap().map(|e| e.item),
        Some(ItemId::new(1))
    );
}

#[test]
fn test_remove_unknown_item() {
    let mut set = OrderedMultiSet::new();
    let err = set.remove(ItemId::new(42)).unwrap_err();
    assert_eq!(err, SetError::ItemNotFound(ItemId::new(42)));
}

#[test]
fn test_time_added_is_recorded() {
    let mut set = OrderedMultiSet::new();
    set.insert(ItemId::new(1), 0, None, true, SimTime::new(17)).unwrap();
    assert_eq!(set.get(ItemId::new(1)).map(|e| e.time_added), Some(SimTime::new(17)));
}
