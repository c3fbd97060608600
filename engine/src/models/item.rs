//! Simulated items and entity containers
//!
//! An [`Item`] is a unit of work flowing through the model. Any item may
//! act as a container by carrying an [`EntStorage`]: the same ordered,
//! match-partitioned multi-set a queue uses, holding other items.

use crate::core::time::SimTime;
use crate::models::ordered_set::{OrderedMultiSet, SetError};
use crate::models::ItemId;
use std::collections::BTreeMap;

/// A simulated work item
#[derive(Debug, Clone)]
pub struct Item {
    id: ItemId,
    name: String,
    /// Last state assigned by a component, if any
    state: Option<String>,
    created_at: SimTime,
    storage: Option<EntStorage>,
    /// Container currently holding this item
    parent: Option<ItemId>,
}

impl Item {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn created_at(&self) -> SimTime {
        self.created_at
    }

    /// Contents if this item is a container
    pub fn storage(&self) -> Option<&EntStorage> {
        self.storage.as_ref()
    }

    pub fn storage_mut(&mut self) -> Option<&mut EntStorage> {
        self.storage.as_mut()
    }

    pub fn is_container(&self) -> bool {
        self.storage.is_some()
    }

    /// Container this item is packed in, if any
    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ItemId>) {
        self.parent = parent;
    }

    pub(crate) fn set_state(&mut self, state: Option<String>) {
        self.state = state;
    }

    pub(crate) fn make_container(&mut self, fifo: bool) {
        if self.storage.is_none() {
            self.storage = Some(EntStorage::new(fifo));
        }
    }
}

/// Contents of a container item
#[derive(Debug, Clone, Default)]
pub struct EntStorage {
    set: OrderedMultiSet,
    fifo: bool,
    number_added: u64,
    number_removed: u64,
}

impl EntStorage {
    pub fn new(fifo: bool) -> Self {
        Self {
            set: OrderedMultiSet::new(),
            fifo,
            number_added: 0,
            number_removed: 0,
        }
    }

    /// Insert `item` with the given priority and match value
    pub fn add(
        &mut self,
        item: ItemId,
        priority: i32,
        match_value: Option<String>,
        now: SimTime,
    ) -> Result<(), SetError> {
        self.set.insert(item, priority, match_value, self.fifo, now)?;
        self.number_added += 1;
        Ok(())
    }

    /// Remove the first item with match `m` (`None` = any item)
    ///
    /// Removing "any" from an empty container is an error; asking for an
    /// absent match value yields `Ok(None)`.
    pub fn remove(&mut self, m: Option<&str>) -> Result<Option<ItemId>, SetError> {
        let removed = self.set.pop_first_for_match(m)?.map(|e| e.item);
        if removed.is_some() {
            self.number_removed += 1;
        }
        Ok(removed)
    }

    /// Number of items with match `m` (`None` = all items)
    pub fn count(&self, m: Option<&str>) -> usize {
        self.set.match_count(m)
    }

    pub fn is_empty(&self, m: Option<&str>) -> bool {
        self.count(m) == 0
    }

    /// Contained items in order
    pub fn items(&self) -> Vec<ItemId> {
        self.set.items()
    }

    pub fn number_added(&self) -> u64 {
        self.number_added
    }

    pub fn number_removed(&self) -> u64 {
        self.number_removed
    }

    pub fn set(&self) -> &OrderedMultiSet {
        &self.set
    }

    pub(crate) fn drain(&mut self) -> Vec<ItemId> {
        self.set.clear().into_iter().map(|e| e.item).collect()
    }
}

/// Owner of every live item
#[derive(Debug, Clone, Default)]
pub struct ItemRegistry {
    items: BTreeMap<ItemId, Item>,
    next_id: u64,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new item and return its id
    pub fn create(&mut self, name: impl Into<String>, now: SimTime) -> ItemId {
        self.next_id += 1;
        let id = ItemId::new(self.next_id);
        self.items.insert(
            id,
            Item {
                id,
                name: name.into(),
                state: None,
                created_at: now,
                storage: None,
                parent: None,
            },
        );
        id
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.items.contains_key(&id)
    }

    pub(crate) fn remove(&mut self, id: ItemId) -> Option<Item> {
        self.items.remove(&id)
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of items ever created
    pub fn created(&self) -> u64 {
        self.next_id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }
}
