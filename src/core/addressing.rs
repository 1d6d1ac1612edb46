/// Item names and the register views they resolve to
///
/// Names have the form `<block>@<indexer>`:
/// - `n:<word>` addresses a whole register, e.g. `PLC_4x@n:3`
/// - `n:<word>.<bit>` addresses one bit of it, e.g. `PLC_4x@n:3.1`
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use super::registers::{ChangeSet, Quality, RegisterStore};
use crate::error::AddressError;

static WORD_INDEXER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^n:(\d{1,3})$").unwrap());
static BIT_INDEXER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^n:(\d{1,3})\.(\d{1,2})$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemName<'a> {
    pub block: &'a str,
    pub indexer: &'a str,
}

/// Split an item name on its first '@'.
pub fn parse(name: &str) -> Result<ItemName<'_>, AddressError> {
    let (block, indexer) = name
        .split_once('@')
        .ok_or_else(|| AddressError::InvalidItemName(name.to_string()))?;
    if block.is_empty() || indexer.is_empty() {
        return Err(AddressError::InvalidItemName(name.to_string()));
    }
    Ok(ItemName { block, indexer })
}

/// Resolve an indexer into a view over a block's registers.
pub fn resolve(indexer: &str) -> Result<Item, AddressError> {
    let invalid = || AddressError::InvalidIndexer(indexer.to_string());

    if let Some(caps) = WORD_INDEXER.captures(indexer) {
        let word = caps[1].parse::<u16>().map_err(|_| invalid())?;
        return Ok(Item::word(word));
    }
    if let Some(caps) = BIT_INDEXER.captures(indexer) {
        let word = caps[1].parse::<u16>().map_err(|_| invalid())?;
        let bit = caps[2].parse::<u8>().map_err(|_| invalid())?;
        if bit > 15 {
            return Err(invalid());
        }
        return Ok(Item::bit(word, bit));
    }
    Err(invalid())
}

/// A word or single-bit view. Holds register indexes only, never the registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    pub word: u16,
    pub mask: u16,
    pub width: u16,
}

/// Current value of an item together with the quality of its registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ItemReading {
    pub value: u16,
    pub quality: Quality,
}

impl Item {
    pub fn word(word: u16) -> Self {
        Self {
            word,
            mask: 0xFFFF,
            width: 1,
        }
    }

    pub fn bit(word: u16, bit: u8) -> Self {
        Self {
            word,
            mask: 1 << bit,
            width: 1,
        }
    }

    pub fn is_bit(&self) -> bool {
        self.mask != 0xFFFF
    }

    /// One past the last register this item reads.
    pub fn end(&self) -> u32 {
        self.word as u32 + self.width as u32
    }

    pub fn covers(&self, index: u16) -> bool {
        index >= self.word && (index as u32) < self.end()
    }

    /// Whether a change of `mask` bits at register `index` can move this item's value.
    pub fn is_affected_by(&self, index: u16, mask: u16) -> bool {
        self.covers(index) && self.mask & mask != 0
    }

    pub fn read(&self, store: &RegisterStore) -> Option<ItemReading> {
        let reg = store.get(self.word)?;
        let value = if self.is_bit() {
            u16::from(reg.value & self.mask != 0)
        } else {
            reg.value
        };
        Some(ItemReading {
            value,
            quality: reg.quality,
        })
    }

    /// The register value after writing `value` through this item.
    pub fn merge(&self, current: u16, value: u16) -> u16 {
        if self.is_bit() {
            if value != 0 {
                current | self.mask
            } else {
                current & !self.mask
            }
        } else {
            value
        }
    }
}

/// Registered items of one block, kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct ItemTable {
    items: Vec<(String, Item)>,
    by_name: HashMap<String, usize>,
}

impl ItemTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item. Registering a name again keeps the first entry.
    pub fn insert(&mut self, name: &str, item: Item) -> bool {
        if self.by_name.contains_key(name) {
            return false;
        }
        self.by_name.insert(name.to_string(), self.items.len());
        self.items.push((name.to_string(), item));
        true
    }

    pub fn get(&self, name: &str) -> Option<Item> {
        self.by_name.get(name).map(|idx| self.items[*idx].1)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Item)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    /// Names of items whose value may have moved, each listed once.
    pub fn affected(&self, changes: &ChangeSet) -> Vec<&str> {
        self.items
            .iter()
            .filter(|(_, item)| {
                changes
                    .iter()
                    .any(|change| item.is_affected_by(change.index, change.mask))
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
