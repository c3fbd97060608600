//! Ordered multi-set with match-value partitions
//!
//! Shared core of [`Queue`](crate::models::Queue) and entity-container
//! storage. Entries are totally ordered by `(priority, seq)`:
//!
//! - lower priority value first
//! - then ascending signed sequence, where FIFO entries take `+n` and
//!   LIFO entries `-n` from a per-set counter, so later LIFO arrivals
//!   sort ahead of earlier ones
//!
//! # Indexes
//!
//! ```text
//! entries:    BTreeMap<EntryKey, Entry>           all entries, in order
//! index:      ItemId -> EntryKey                  uniqueness + O(1) lookup
//! partitions: match value -> BTreeSet<EntryKey>   per-match order
//! ```
//!
//! Partitions hold keys only, never copies of the entries. For every
//! match value `m` present, `partitions[m]` is exactly the set of keys
//! whose entry has match `m`; empty partitions are removed.
//!
//! # Largest partition cache
//!
//! `(match value, count)` of the largest partition is cached. Adding to
//! the cached partition increments the count; adding to another
//! partition replaces the cache if it becomes strictly larger; removing
//! from the cached partition invalidates it. An invalid cache is rebuilt
//! by one scan over the k distinct match values on the next query.
//!
//! Partition maps use a fixed-key hasher so that iteration order is a
//! deterministic function of the insertion history.

use crate::core::time::SimTime;
use crate::events::EventHandle;
use crate::models::ItemId;
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::BuildHasherDefault;
use thiserror::Error;

type DetHashMap<K, V> = HashMap<K, V, BuildHasherDefault<DefaultHasher>>;

/// Errors raised by the ordered multi-set
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SetError {
    #[error("{0} is already present")]
    DuplicateItem(ItemId),

    #[error("{0} is not present")]
    ItemNotFound(ItemId),

    #[error("cannot remove an item from an empty collection")]
    Empty,

    #[error("priority must be non-negative, got {0}")]
    NegativePriority(i32),

    #[error("match partition out of sync for value {0:?}")]
    PartitionMismatch(String),
}

/// Sort key of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryKey {
    /// Lower value = served earlier
    pub priority: i32,
    /// Signed arrival sequence (`+n` FIFO, `-n` LIFO)
    pub seq: i64,
}

/// One item held by the set
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub item: ItemId,
    pub key: EntryKey,
    pub match_value: Option<String>,
    pub time_added: SimTime,
    /// Pending renege check, if the owning queue reneges
    pub renege: Option<EventHandle>,
}

impl Entry {
    pub fn priority(&self) -> i32 {
        self.key.priority
    }
}

/// Priority/sequence ordered multi-set with match partitions
#[derive(Debug, Clone, Default)]
pub struct OrderedMultiSet {
    entries: BTreeMap<EntryKey, Entry>,
    index: DetHashMap<ItemId, EntryKey>,
    partitions: DetHashMap<String, BTreeSet<EntryKey>>,
    max_cache: RefCell<Option<(String, usize)>>,
    next_seq: i64,
}

impl OrderedMultiSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item`
    ///
    /// Fails if the item is already present or the priority is negative.
    /// O(log n).
    pub fn insert(
        &mut self,
        item: ItemId,
        priority: i32,
        match_value: Option<String>,
        fifo: bool,
        now: SimTime,
    ) -> Result<EntryKey, SetError> {
        if self.index.contains_key(&item) {
            return Err(SetError::DuplicateItem(item));
        }
        if priority < 0 {
            return Err(SetError::NegativePriority(priority));
        }

        self.next_seq += 1;
        let seq = if fifo { self.next_seq } else { -self.next_seq };
        let key = EntryKey { priority, seq };

        if let Some(m) = &match_value {
            let partition = self.partitions.entry(m.clone()).or_default();
            partition.insert(key);
            let size = partition.len();

            let mut cache = self.max_cache.borrow_mut();
            if let Some((cached, count)) = cache.as_mut() {
                if cached == m {
                    *count += 1;
                } else if size > *count {
                    *cache = Some((m.clone(), size));
                }
            }
        }

        self.index.insert(item, key);
        self.entries.insert(
            key,
            Entry {
                item,
                key,
                match_value,
                time_added: now,
                renege: None,
            },
        );
        Ok(key)
    }

    /// Remove `item`, returning its entry. O(log n).
    pub fn remove(&mut self, item: ItemId) -> Result<Entry, SetError> {
        let key = *self.index.get(&item).ok_or(SetError::ItemNotFound(item))?;
        self.remove_key(key)
    }

    fn remove_key(&mut self, key: EntryKey) -> Result<Entry, SetError> {
        let entry = self.entries.remove(&key).ok_or(SetError::Empty)?;
        self.index.remove(&entry.item);

        if let Some(m) = &entry.match_value {
            let partition = self
                .partitions
                .get_mut(m)
                .ok_or_else(|| SetError::PartitionMismatch(m.clone()))?;
            if !partition.remove(&key) {
                return Err(SetError::PartitionMismatch(m.clone()));
            }
            if partition.is_empty() {
                self.partitions.remove(m);
            }

            let mut cache = self.max_cache.borrow_mut();
            if matches!(cache.as_ref(), Some((cached, _)) if cached == m) {
                *cache = None;
            }
        }
        Ok(entry)
    }

    /// Remove the first entry. Fails on an empty set.
    pub fn pop_first(&mut self) -> Result<Entry, SetError> {
        let key = *self.entries.keys().next().ok_or(SetError::Empty)?;
        self.remove_key(key)
    }

    /// Remove the first entry with match value `m`
    ///
    /// `None` means "any match value" and behaves like [`pop_first`].
    /// Returns `Ok(None)` when no entry carries `m`.
    ///
    /// [`pop_first`]: OrderedMultiSet::pop_first
    pub fn pop_first_for_match(&mut self, m: Option<&str>) -> Result<Option<Entry>, SetError> {
        let Some(m) = m else {
            return self.pop_first().map(Some);
        };
        let key = match self.partitions.get(m).and_then(|p| p.iter().next()) {
            Some(key) => *key,
            None => return Ok(None),
        };
        self.remove_key(key).map(Some)
    }

    /// First entry in order
    pub fn first(&self) -> Option<&Entry> {
        self.entries.values().next()
    }

    /// First entry with match value `m` (`None` = any)
    pub fn first_for_match(&self, m: Option<&str>) -> Option<&Entry> {
        match m {
            None => self.first(),
            Some(m) => {
                let key = self.partitions.get(m)?.iter().next()?;
                self.entries.get(key)
            }
        }
    }

    /// Entry of `item`
    pub fn get(&self, item: ItemId) -> Option<&Entry> {
        self.index.get(&item).and_then(|k| self.entries.get(k))
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.index.contains_key(&item)
    }

    /// Attach a renege handle to `item`'s entry
    pub fn set_renege(&mut self, item: ItemId, handle: EventHandle) -> Result<(), SetError> {
        let key = self.index.get(&item).ok_or(SetError::ItemNotFound(item))?;
        let entry = self.entries.get_mut(key).ok_or(SetError::ItemNotFound(item))?;
        entry.renege = Some(handle);
        Ok(())
    }

    /// 0-based position of `item` in order. O(n).
    pub fn position(&self, item: ItemId) -> Option<usize> {
        let key = self.index.get(&item)?;
        Some(self.entries.range(..key).count())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with match value `m`; `None` counts every entry
    pub fn match_count(&self, m: Option<&str>) -> usize {
        match m {
            None => self.entries.len(),
            Some(m) => self.partitions.get(m).map_or(0, BTreeSet::len),
        }
    }

    /// Number of entries without a match value
    pub fn unmatched_count(&self) -> usize {
        self.entries.len() - self.partitions.values().map(BTreeSet::len).sum::<usize>()
    }

    /// Number of distinct match values present
    pub fn distinct_match_count(&self) -> usize {
        self.partitions.len()
    }

    /// Distinct match values in the set's deterministic internal order
    pub fn match_values(&self) -> impl Iterator<Item = &str> {
        self.partitions.keys().map(String::as_str)
    }

    /// Distinct match values, sorted
    pub fn unique_match_values(&self) -> Vec<String> {
        let mut values: Vec<String> = self.partitions.keys().cloned().collect();
        values.sort();
        values
    }

    /// `(match value, count)` pairs, sorted by match value
    pub fn match_value_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = self
            .partitions
            .iter()
            .map(|(m, p)| (m.clone(), p.len()))
            .collect();
        counts.sort();
        counts
    }

    /// Match value of the largest partition, or `None` if no entry has a match value
    pub fn max_partition_value(&self) -> Option<String> {
        self.refresh_max();
        self.max_cache.borrow().as_ref().map(|(m, _)| m.clone())
    }

    /// Size of the largest partition (0 if no entry has a match value)
    pub fn max_partition_size(&self) -> usize {
        self.refresh_max();
        self.max_cache.borrow().as_ref().map_or(0, |(_, n)| *n)
    }

    fn refresh_max(&self) {
        if self.max_cache.borrow().is_some() {
            return;
        }
        let mut best: Option<(&String, usize)> = None;
        for (m, partition) in &self.partitions {
            let n = partition.len();
            best = match best {
                Some((bm, bn)) if bn > n || (bn == n && bm <= m) => Some((bm, bn)),
                _ => Some((m, n)),
            };
        }
        *self.max_cache.borrow_mut() = best.map(|(m, n)| (m.clone(), n));
    }

    /// Entries in order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Entries with match value `m`, in order
    pub fn iter_match<'a>(&'a self, m: &str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.partitions
            .get(m)
            .into_iter()
            .flat_map(|p| p.iter())
            .filter_map(|k| self.entries.get(k))
    }

    /// Items in order
    pub fn items(&self) -> Vec<ItemId> {
        self.entries.values().map(|e| e.item).collect()
    }

    /// Remove everything; the sequence counter keeps running
    pub fn clear(&mut self) -> Vec<Entry> {
        self.index.clear();
        self.partitions.clear();
        *self.max_cache.borrow_mut() = None;
        std::mem::take(&mut self.entries).into_values().collect()
    }

    /// Verify the index and partition invariants. O(n log n).
    pub fn check_invariants(&self) -> Result<(), SetError> {
        if self.index.len() != self.entries.len() {
            return Err(SetError::PartitionMismatch("<index>".to_string()));
        }
        for (key, entry) in &self.entries {
            if self.index.get(&entry.item) != Some(key) {
                return Err(SetError::ItemNotFound(entry.item));
            }
            if let Some(m) = &entry.match_value {
                let present = self.partitions.get(m).is_some_and(|p| p.contains(key));
                if !present {
                    return Err(SetError::PartitionMismatch(m.clone()));
                }
            }
        }
        for (m, partition) in &self.partitions {
            if partition.is_empty() {
                return Err(SetError::PartitionMismatch(m.clone()));
            }
            for key in partition {
                let matches = self
                    .entries
                    .get(key)
                    .is_some_and(|e| e.match_value.as_deref() == Some(m.as_str()));
                if !matches {
                    return Err(SetError::PartitionMismatch(m.clone()));
                }
            }
        }
        if let Some((m, n)) = self.max_cache.borrow().as_ref() {
            let actual_max = self.partitions.values().map(BTreeSet::len).max().unwrap_or(0);
            if self.match_count(Some(m)) != *n || *n != actual_max {
                return Err(SetError::PartitionMismatch(m.clone()));
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> ItemId {
        ItemId::new(n)
    }

    fn fill(set: &mut OrderedMultiSet, specs: &[(u64, i32, Option<&str>)], fifo: bool) {
        for (n, pri, m) in specs {
            set.insert(id(*n), *pri, m.map(str::to_string), fifo, SimTime::ZERO)
                .unwrap();
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut set = OrderedMultiSet::new();
        fill(&mut set, &[(1, 0, None), (2, 0, None), (3, 0, None)], true);
        assert_eq!(set.items(), vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn test_lifo_order() {
        let mut set = OrderedMultiSet::new();
        fill(&mut set, &[(1, 0, None), (2, 0, None), (3, 0, None)], false);
        assert_eq!(set.items(), vec![id(3), id(2), id(1)]);
    }

    #[test]
    fn test_priority_dominates_arrival() {
        let mut set = OrderedMultiSet::new();
        fill(&mut set, &[(1, 5, None), (2, 1, None), (3, 5, None), (4, 0, None)], true);
        assert_eq!(set.items(), vec![id(4), id(2), id(1), id(3)]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut set = OrderedMultiSet::new();
        fill(&mut set, &[(1, 0, Some("A"))], true);
        let err = set.insert(id(1), 0, None, true, SimTime::ZERO).unwrap_err();
        assert_eq!(err, SetError::DuplicateItem(id(1)));
        assert_eq!(set.len(), 1);
        set.check_invariants().unwrap();
    }

    #[test]
    fn test_negative_priority_rejected() {
        let mut set = OrderedMultiSet::new();
        let err = set.insert(id(1), -1, None, true, SimTime::ZERO).unwrap_err();
        assert_eq!(err, SetError::NegativePriority(-1));
        assert!(set.is_empty());
    }

    #[test]
    fn test_pop_first_on_empty_fails() {
        let mut set = OrderedMultiSet::new();
        assert_eq!(set.pop_first().unwrap_err(), SetError::Empty);
        assert_eq!(set.pop_first_for_match(None).unwrap_err(), SetError::Empty);
    }

    #[test]
    fn test_pop_first_for_absent_match_is_none() {
        let mut set = OrderedMultiSet::new();
        fill(&mut set, &[(1, 0, Some("A"))], true);
        assert_eq!(set.pop_first_for_match(Some("B")).unwrap(), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_match_partitions_follow_queue_order() {
        let mut set = OrderedMultiSet::new();
        fill(
            &mut set,
            &[(1, 3, Some("A")), (2, 1, Some("B")), (3, 1, Some("A")), (4, 2, None)],
            true,
        );
        assert_eq!(set.match_count(Some("A")), 2);
        assert_eq!(set.match_count(Some("B")), 1);
        assert_eq!(set.match_count(None), 4);
        assert_eq!(set.unmatched_count(), 1);
        assert_eq!(set.first_for_match(Some("A")).map(|e| e.item), Some(id(3)));

        let e = set.pop_first_for_match(Some("A")).unwrap().unwrap();
        assert_eq!(e.item, id(3));
        assert_eq!(set.first_for_match(Some("A")).map(|e| e.item), Some(id(1)));
        set.check_invariants().unwrap();
    }

    #[test]
    fn test_empty_partition_is_dropped() {
        let mut set = OrderedMultiSet::new();
        fill(&mut set, &[(1, 0, Some("A")), (2, 0, Some("B"))], true);
        set.remove(id(1)).unwrap();
        assert_eq!(set.distinct_match_count(), 1);
        assert_eq!(set.unique_match_values(), vec!["B".to_string()]);
    }

    #[test]
    fn test_max_partition_tracking() {
        let mut set = OrderedMultiSet::new();
        assert_eq!(set.max_partition_value(), None);
        assert_eq!(set.max_partition_size(), 0);

        fill(
            &mut set,
            &[(1, 0, Some("A")), (2, 0, Some("B")), (3, 0, Some("B")), (4, 0, Some("A")), (5, 0, Some("A"))],
            true,
        );
        assert_eq!(set.max_partition_value().as_deref(), Some("A"));
        assert_eq!(set.max_partition_size(), 3);

        // Removing from the largest partition invalidates the cache
        set.remove(id(1)).unwrap();
        set.remove(id(4)).unwrap();
        set.check_invariants().unwrap();
        assert_eq!(set.max_partition_size(), 2);

        // Tie between A and B resolves to the smaller value
        assert_eq!(set.max_partition_value().as_deref(), Some("A"));

        // Incremental growth of another partition takes over the cache
        fill(&mut set, &[(6, 0, Some("B"))], true);
        assert_eq!(set.max_partition_value().as_deref(), Some("B"));
        assert_eq!(set.max_partition_size(), 3);
        set.check_invariants().unwrap();
    }

    #[test]
    fn test_add_while_cache_invalid_does_not_hide_larger_partition() {
        let mut set = OrderedMultiSet::new();
        fill(
            &mut set,
            &[(1, 0, Some("A")), (2, 0, Some("A")), (3, 0, Some("A")), (4, 0, Some("B"))],
            true,
        );
        assert_eq!(set.max_partition_size(), 3);
        set.remove(id(1)).unwrap();
        fill(&mut set, &[(5, 0, Some("B"))], true);
        assert_eq!(set.max_partition_value().as_deref(), Some("A"));
        assert_eq!(set.max_partition_size(), 2);
        set.check_invariants().unwrap();
    }

    #[test]
    fn test_position() {
        let mut set = OrderedMultiSet::new();
        fill(&mut set, &[(1, 0, None), (2, 0, None), (3, 0, None)], true);
        assert_eq!(set.position(id(1)), Some(0));
        assert_eq!(set.position(id(3)), Some(2));
        assert_eq!(set.position(id(9)), None);
    }

    #[test]
    fn test_clear_returns_entries_in_order() {
        let mut set = OrderedMultiSet::new();
        fill(&mut set, &[(1, 1, Some("A")), (2, 0, None)], true);
        let cleared: Vec<ItemId> = set.clear().into_iter().map(|e| e.item).collect();
        assert_eq!(cleared, vec![id(2), id(1)]);
        assert!(set.is_empty());
        assert_eq!(set.distinct_match_count(), 0);
        set.check_invariants().unwrap();
    }
}
