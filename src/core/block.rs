/// A named block of contiguous holding registers and the items registered on it
use std::time::Duration;

use super::{
    addressing::{Item, ItemReading, ItemTable},
    bus::ItemEvent,
    registers::{ChangeSet, Quality, RegisterStore},
};
use crate::error::{AddressError, RangeError};

/// Default wait for a reply before an exchange counts as failed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Where a block lives on the bus and how it is polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    pub slave_addr: u8,
    pub start_reg: u16,
    pub num_reg: u16,
    /// Poll period; `None` reads once at start.
    pub read_interval: Option<Duration>,
    pub timeout: Duration,
    /// Block to run after a successful exchange (read-modify-write chains).
    pub next_block: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Block {
    name: String,
    layout: BlockLayout,
    store: RegisterStore,
    items: ItemTable,
}

impl Block {
    pub fn new(name: impl Into<String>, layout: BlockLayout) -> Self {
        let store = RegisterStore::new(layout.num_reg);
        Self {
            name: name.into(),
            layout,
            store,
            items: ItemTable::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    pub fn store(&self) -> &RegisterStore {
        &self.store
    }

    pub fn items(&self) -> &ItemTable {
        &self.items
    }

    /// Register `name` resolved to `item`. The item must fall inside the block.
    pub fn register(&mut self, name: &str, item: Item) -> Result<(), RangeError> {
        if item.end() > self.store.len() as u32 {
            return Err(RangeError::OutOfBounds {
                start: item.word,
                count: item.width,
                size: self.store.len(),
            });
        }
        if !self.items.insert(name, item) {
            log::debug!("Item {name} is already registered on block {}", self.name);
        }
        Ok(())
    }

    /// Register `name`, growing the block when the item lies past its end.
    pub fn register_growing(&mut self, name: &str, item: Item) {
        let end = u16::try_from(item.end()).unwrap_or(u16::MAX);
        self.store.grow(end);
        self.layout.num_reg = self.store.len();
        self.items.insert(name, item);
    }

    pub fn item(&self, name: &str) -> Result<Item, AddressError> {
        self.items
            .get(name)
            .ok_or_else(|| AddressError::UnregisteredItem(name.to_string()))
    }

    pub fn read_item(&self, name: &str) -> Option<ItemReading> {
        self.items.get(name)?.read(&self.store)
    }

    /// Apply a poll outcome and report the items it moved.
    pub fn apply_update(&mut self, quality: Quality, values: Option<&[u16]>) -> Vec<ItemEvent> {
        let changes = self.store.apply_update(quality, values);
        self.notifications(&changes)
    }

    /// Write registers and report the items they moved.
    pub fn set_registers(
        &mut self,
        start: u16,
        values: &[u16],
    ) -> Result<Vec<ItemEvent>, RangeError> {
        let changes = self.store.set_registers(start, values)?;
        Ok(self.notifications(&changes))
    }

    /// One event per affected item, however many of its registers changed.
    pub fn notifications(&self, changes: &ChangeSet) -> Vec<ItemEvent> {
        if changes.is_empty() {
            return Vec::new();
        }
        self.items
            .affected(changes)
            .into_iter()
            .filter_map(|name| {
                let reading = self.items.get(name)?.read(&self.store)?;
                Some(ItemEvent::new(name, reading.value, reading.quality))
            })
            .collect()
    }
}
