//! Waiting lines
//!
//! A [`Queue`] owns an [`OrderedMultiSet`] of waiting items plus the
//! configuration that decides how arrivals are keyed (priority, match
//! value, FIFO/LIFO) and whether they renege. Scheduling side effects
//! (contents-changed notifications, renege timers) are driven by the
//! [`Simulation`](crate::orchestrator::Simulation), which owns every
//! queue; this type only keeps the data consistent.
//!
//! # Multi-queue helpers
//!
//! [`select_match_value`] and [`sufficient_entities`] answer the join
//! question asked by assembly-style components: "do these queues
//! together hold what I need?"

use crate::core::time::SimTime;
use crate::events::EventHandle;
use crate::models::ordered_set::{Entry, OrderedMultiSet, SetError};
use crate::models::stats::TimeWeightedStat;
use crate::models::{ComponentId, Destination, ItemId};
use crate::providers::{Sample, StringSample, Vec3};

/// Renege behaviour of a queue
pub struct RenegeConfig {
    /// Seconds after arrival at which the renege check fires
    pub time: Sample,
    /// Evaluated with the waiting item as current; non-zero means leave.
    /// `None` always reneges.
    pub condition: Option<Sample>,
    /// Where reneging items go
    pub destination: Destination,
}

/// A named waiting line
pub struct Queue {
    name: String,
    set: OrderedMultiSet,
    pub(crate) priority: Option<Sample>,
    pub(crate) match_provider: Option<StringSample>,
    fifo: bool,
    pub(crate) renege: Option<RenegeConfig>,
    /// Components re-evaluated when the contents change
    pub(crate) users: Vec<ComponentId>,
    /// Pending de-duplicated contents-changed notification
    pub(crate) notify: Option<EventHandle>,

    // Layout handed to the position observer
    position: Vec3,
    spacing: f64,
    max_per_line: usize,

    stats: TimeWeightedStat,
    number_added: u64,
    number_removed: u64,
    number_reneged: u64,
}

impl Queue {
    /// Create an empty FIFO queue with no priority, match or renege
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            set: OrderedMultiSet::new(),
            priority: None,
            match_provider: None,
            fifo: true,
            renege: None,
            users: Vec::new(),
            notify: None,
            position: Vec3::ZERO,
            spacing: 1.0,
            max_per_line: usize::MAX,
            stats: TimeWeightedStat::new(SimTime::ZERO),
            number_added: 0,
            number_removed: 0,
            number_reneged: 0,
        }
    }

    /// Serve newest arrivals first among equal priorities
    pub fn lifo(mut self) -> Self {
        self.fifo = false;
        self
    }

    /// Priority of each arrival, evaluated with the arrival as current
    pub fn with_priority(mut self, priority: Sample) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Match value of each arrival, evaluated with the arrival as current
    pub fn with_match(mut self, provider: StringSample) -> Self {
        self.match_provider = Some(provider);
        self
    }

    pub fn with_renege(mut self, renege: RenegeConfig) -> Self {
        self.renege = Some(renege);
        self
    }

    /// Lay items out from `position`, `spacing` apart, `max_per_line` per row
    pub fn with_layout(mut self, position: Vec3, spacing: f64, max_per_line: usize) -> Self {
        self.position = position;
        self.spacing = spacing;
        self.max_per_line = max_per_line.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_fifo(&self) -> bool {
        self.fifo
    }

    pub fn has_renege(&self) -> bool {
        self.renege.is_some()
    }

    pub fn users(&self) -> &[ComponentId] {
        &self.users
    }

    pub(crate) fn register_user(&mut self, user: ComponentId) {
        if !self.users.contains(&user) {
            self.users.push(user);
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    pub(crate) fn insert(
        &mut self,
        item: ItemId,
        priority: i32,
        match_value: Option<String>,
        fifo: bool,
        now: SimTime,
    ) -> Result<(), SetError> {
        self.set.insert(item, priority, match_value, fifo, now)?;
        self.number_added += 1;
        self.stats.record(now, self.set.len() as u64);
        Ok(())
    }

    pub(crate) fn remove(&mut self, item: ItemId, now: SimTime) -> Result<Entry, SetError> {
        let entry = self.set.remove(item)?;
        self.after_remove(now);
        Ok(entry)
    }

    pub(crate) fn pop_first(&mut self, now: SimTime) -> Result<Entry, SetError> {
        let entry = self.set.pop_first()?;
        self.after_remove(now);
        Ok(entry)
    }

    pub(crate) fn pop_first_for_match(
        &mut self,
        m: Option<&str>,
        now: SimTime,
    ) -> Result<Option<Entry>, SetError> {
        let entry = self.set.pop_first_for_match(m)?;
        if entry.is_some() {
            self.after_remove(now);
        }
        Ok(entry)
    }

    fn after_remove(&mut self, now: SimTime) {
        self.number_removed += 1;
        self.stats.record(now, self.set.len() as u64);
    }

    pub(crate) fn set_renege(&mut self, item: ItemId, handle: EventHandle) -> Result<(), SetError> {
        self.set.set_renege(item, handle)
    }

    pub(crate) fn count_renege(&mut self) {
        self.number_reneged += 1;
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.set.contains(item)
    }

    pub fn first(&self) -> Option<&Entry> {
        self.set.first()
    }

    pub fn first_for_match(&self, m: Option<&str>) -> Option<&Entry> {
        self.set.first_for_match(m)
    }

    pub fn entry(&self, item: ItemId) -> Option<&Entry> {
        self.set.get(item)
    }

    /// 0-based position of `item`
    pub fn position(&self, item: ItemId) -> Option<usize> {
        self.set.position(item)
    }

    /// Priority of the first item
    pub fn first_priority(&self) -> Option<i32> {
        self.first().map(Entry::priority)
    }

    /// Ticks the first item has been waiting
    pub fn queue_time_of_first(&self, now: SimTime) -> Option<u64> {
        self.first().and_then(|e| now.since(e.time_added))
    }

    /// Items with match `m`; `None` counts every item
    pub fn match_count(&self, m: Option<&str>) -> usize {
        self.set.match_count(m)
    }

    pub fn max_partition_value(&self) -> Option<String> {
        self.set.max_partition_value()
    }

    pub fn max_partition_size(&self) -> usize {
        self.set.max_partition_size()
    }

    /// Distinct match values in the deterministic internal order
    pub fn match_values(&self) -> impl Iterator<Item = &str> {
        self.set.match_values()
    }

    pub fn unique_match_values(&self) -> Vec<String> {
        self.set.unique_match_values()
    }

    pub fn match_value_counts(&self) -> Vec<(String, usize)> {
        self.set.match_value_counts()
    }

    /// Items in queue order
    pub fn items(&self) -> Vec<ItemId> {
        self.set.items()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.set.iter()
    }

    pub fn ordered_set(&self) -> &OrderedMultiSet {
        &self.set
    }

    /// Layout position of the item at `index`
    pub fn slot_position(&self, index: usize) -> Vec3 {
        let col = index % self.max_per_line;
        let row = index / self.max_per_line;
        Vec3::new(
            self.position.x - col as f64 * self.spacing,
            self.position.y - row as f64 * self.spacing,
            self.position.z,
        )
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn number_added(&self) -> u64 {
        self.number_added
    }

    pub fn number_removed(&self) -> u64 {
        self.number_removed
    }

    pub fn number_reneged(&self) -> u64 {
        self.number_reneged
    }

    /// Time-weighted average length up to `now`
    pub fn average_length(&self, now: SimTime) -> f64 {
        self.stats.average(now)
    }

    pub fn min_length(&self) -> u64 {
        self.stats.min()
    }

    pub fn max_length(&self) -> u64 {
        self.stats.max()
    }

    /// Reset counters and length statistics; contents are kept
    pub fn clear_statistics(&mut self, now: SimTime) {
        self.number_added = 0;
        self.number_removed = 0;
        self.number_reneged = 0;
        self.stats.reset(now);
    }
}

// ============================================================================
// Multi-queue joins
// ============================================================================

pub(crate) fn required_at(required: &[usize], i: usize) -> usize {
    match required.get(i) {
        Some(n) => *n,
        None => required.last().copied().unwrap_or(0),
    }
}

/// Pick a match value that every queue holds enough of
///
/// Queue `i` must hold at least `required[i]` items with the value; a
/// requirement list shorter than `queues` repeats its last entry. The
/// candidates are the match values of the queue with the fewest distinct
/// values (earliest such queue on ties), tried in that queue's internal
/// order. Returns `None` when no value satisfies every queue.
///
/// # Example
/// ```
/// use flow_simulator_core_rs::models::{select_match_value, Queue};
/// # use flow_simulator_core_rs::orchestrator::{SimConfig, Simulation};
/// # let mut sim = Simulation::new(SimConfig::default()).unwrap();
/// # let q1 = sim.add_queue(Queue::new("Q1"));
/// # let q2 = sim.add_queue(Queue::new("Q2"));
/// # for (q, m) in [(q1, "A"), (q1, "A"), (q1, "B"), (q2, "A")] {
/// #     let item = sim.create_item("part");
/// #     sim.queue_add_with(q, item, 0, Some(m.to_string())).unwrap();
/// # }
/// let queues = [sim.queue(q1).unwrap(), sim.queue(q2).unwrap()];
/// assert_eq!(select_match_value(&queues, &[1, 1]).as_deref(), Some("A"));
/// assert_eq!(select_match_value(&queues, &[3, 1]), None);
/// ```
pub fn select_match_value(queues: &[&Queue], required: &[usize]) -> Option<String> {
    // No partition anywhere is large enough
    if queues
        .iter()
        .enumerate()
        .any(|(i, q)| q.max_partition_size() < required_at(required, i))
    {
        return None;
    }

    let narrowest = queues
        .iter()
        .enumerate()
        .min_by_key(|(i, q)| (q.ordered_set().distinct_match_count(), *i))
        .map(|(_, q)| *q)?;

    narrowest
        .match_values()
        .find(|m| {
            queues
                .iter()
                .enumerate()
                .all(|(i, q)| q.match_count(Some(*m)) >= required_at(required, i))
        })
        .map(str::to_string)
}

/// True if every queue holds its required number of items with match `m`
/// (`None` = any match value)
pub fn sufficient_entities(queues: &[&Queue], required: &[usize], m: Option<&str>) -> bool {
    queues
        .iter()
        .enumerate()
        .all(|(i, q)| q.match_count(m) >= required_at(required, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(name: &str, matches: &[&str]) -> Queue {
        let mut q = Queue::new(name);
        for (i, m) in matches.iter().enumerate() {
            q.insert(ItemId::new(i as u64 + 1), 0, Some(m.to_string()), true, SimTime::ZERO)
                .unwrap();
        }
        q
    }

    #[test]
    fn test_select_match_value_join() {
        let q1 = filled("Q1", &["A", "A", "B"]);
        let q2 = filled("Q2", &["A"]);
        assert_eq!(select_match_value(&[&q1, &q2], &[1, 1]).as_deref(), Some("A"));
        assert_eq!(select_match_value(&[&q1, &q2], &[3, 1]), None);
    }

    #[test]
    fn test_select_match_value_rejects_short_partitions_early() {
        let q1 = filled("Q1", &["A", "B", "C"]);
        let q2 = filled("Q2", &["A", "A"]);
        assert_eq!(q1.max_partition_size(), 1);
        assert_eq!(select_match_value(&[&q1, &q2], &[2, 1]), None);
        assert_eq!(select_match_value(&[&q1, &q2], &[1, 2]).as_deref(), Some("A"));
    }

    #[test]
    fn test_required_list_is_clamped_to_last() {
        let q1 = filled("Q1", &["A", "A"]);
        let q2 = filled("Q2", &["A"]);
        // Q2 inherits the requirement of 2 and only holds one "A"
        assert_eq!(select_match_value(&[&q1, &q2], &[2]), None);
        assert!(sufficient_entities(&[&q1, &q2], &[1], None));
        assert!(!sufficient_entities(&[&q1, &q2], &[2], None));
    }

    #[test]
    fn test_select_match_value_with_no_values() {
        let q1 = Queue::new("Q1");
        assert_eq!(select_match_value(&[&q1], &[1]), None);
        assert_eq!(select_match_value(&[], &[1]), None);
    }

    #[test]
    fn test_statistics_and_clear() {
        let mut q = Queue::new("Q");
        q.insert(ItemId::new(1), 0, None, true, SimTime::ZERO).unwrap();
        q.insert(ItemId::new(2), 0, None, true, SimTime::new(10)).unwrap();
        q.pop_first(SimTime::new(20)).unwrap();

        assert_eq!(q.number_added(), 2);
        assert_eq!(q.number_removed(), 1);
        assert_eq!(q.max_length(), 2);
        // 1 for 10 ticks, 2 for 10 ticks, 1 for 10 ticks
        assert!((q.average_length(SimTime::new(30)) - 4.0 / 3.0).abs() < 1e-12);

        q.clear_statistics(SimTime::new(30));
        assert_eq!(q.number_added(), 0);
        assert_eq!(q.len(), 1);
        assert_eq!(q.max_length(), 1);
    }

    #[test]
    fn test_queue_time_of_first() {
        let mut q = Queue::new("Q");
        assert_eq!(q.queue_time_of_first(SimTime::new(5)), None);
        q.insert(ItemId::new(1), 2, None, true, SimTime::new(3)).unwrap();
        assert_eq!(q.queue_time_of_first(SimTime::new(5)), Some(2));
        assert_eq!(q.first_priority(), Some(2));
    }

    #[test]
    fn test_layout_wraps_rows() {
        let q = Queue::new("Q").with_layout(Vec3::new(10.0, 0.0, 0.0), 1.0, 2);
        assert_eq!(q.slot_position(0), Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(q.slot_position(1), Vec3::new(9.0, 0.0, 0.0));
        assert_eq!(q.slot_position(2), Vec3::new(10.0, -1.0, 0.0));
    }
}
