/// Register memory of one block, with per-register quality and change masks
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::RangeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Quality {
    Good,
    Bad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub value: u16,
    pub quality: Quality,
}

impl Default for Register {
    fn default() -> Self {
        Self {
            value: 0,
            quality: Quality::Bad,
        }
    }
}

/// One register whose value or quality changed, with the bits that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterChange {
    pub index: u16,
    pub mask: u16,
}

/// Changes produced by one mutation, in register order.
pub type ChangeSet = Vec<RegisterChange>;

#[derive(Debug, Clone, Default)]
pub struct RegisterStore {
    registers: Vec<Register>,
}

impl RegisterStore {
    /// `size` registers, all zero with BAD quality.
    pub fn new(size: u16) -> Self {
        Self {
            registers: vec![Register::default(); size as usize],
        }
    }

    pub fn len(&self) -> u16 {
        self.registers.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<Register> {
        self.registers.get(index as usize).copied()
    }

    /// Grow to hold at least `size` registers. New registers start zero and BAD.
    pub fn grow(&mut self, size: u16) {
        if self.registers.len() < size as usize {
            self.registers.resize(size as usize, Register::default());
        }
    }

    /// Values of `count` registers from `start`.
    pub fn read(&self, start: u16, count: u16) -> Result<Vec<u16>, RangeError> {
        self.check_range(start, count)?;
        let range = start as usize..start as usize + count as usize;
        Ok(self.registers[range].iter().map(|r| r.value).collect())
    }

    /// Apply the outcome of a poll.
    ///
    /// BAD quality or missing values mark a failed exchange: every register goes BAD and
    /// keeps its value, and registers that were GOOD are reported with a full mask. With
    /// values, a register coming from BAD reports a full mask even when the number did not
    /// move; a GOOD register reports `old ^ new`.
    pub fn apply_update(&mut self, quality: Quality, new_values: Option<&[u16]>) -> ChangeSet {
        let mut changes = ChangeSet::new();

        let values = match (quality, new_values) {
            (Quality::Good, Some(values)) => values,
            _ => {
                for (idx, reg) in self.registers.iter_mut().enumerate() {
                    if reg.quality == Quality::Good {
                        changes.push(RegisterChange {
                            index: idx as u16,
                            mask: 0xFFFF,
                        });
                    }
                    reg.quality = Quality::Bad;
                }
                return changes;
            }
        };

        if values.len() != self.registers.len() {
            log::warn!(
                "Poll returned {} values for {} registers, applying the overlap",
                values.len(),
                self.registers.len()
            );
        }

        for (idx, (reg, value)) in self.registers.iter_mut().zip(values).enumerate() {
            let mask = if reg.quality != Quality::Good {
                0xFFFF
            } else {
                reg.value ^ value
            };
            reg.value = *value;
            reg.quality = Quality::Good;
            if mask != 0 {
                changes.push(RegisterChange {
                    index: idx as u16,
                    mask,
                });
            }
        }
        changes
    }

    /// Write path used by the slave and by acknowledged master writes.
    ///
    /// Registers whose value and quality are unchanged are skipped. Nothing is written
    /// when the range does not fit.
    pub fn set_registers(&mut self, start: u16, values: &[u16]) -> Result<ChangeSet, RangeError> {
        let count = u16::try_from(values.len()).map_err(|_| RangeError::OutOfBounds {
            start,
            count: u16::MAX,
            size: self.len(),
        })?;
        self.check_range(start, count)?;

        let mut changes = ChangeSet::new();
        for (offset, value) in values.iter().enumerate() {
            let index = start as usize + offset;
            let reg = &mut self.registers[index];
            let mask = if reg.quality == Quality::Bad {
                0xFFFF
            } else {
                reg.value ^ value
            };
            if mask == 0 {
                continue;
            }
            reg.value = *value;
            reg.quality = Quality::Good;
            changes.push(RegisterChange {
                index: index as u16,
                mask,
            });
        }
        Ok(changes)
    }

    fn check_range(&self, start: u16, count: u16) -> Result<(), RangeError> {
        if start as usize + count as usize > self.registers.len() {
            return Err(RangeError::OutOfBounds {
                start,
                count,
                size: self.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_store_is_bad() {
        let store = RegisterStore::new(3);
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.get(2),
            Some(Register {
                value: 0,
                quality: Quality::Bad
            })
        );
        assert_eq!(store.get(3), None);
    }

    #[test]
    fn test_update_from_bad_flags_everything() {
        let mut store = RegisterStore::new(3);
        // values equal to the stale zeros still count as changed
        let changes = store.apply_update(Quality::Good, Some(&[0, 5, 0]));
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| c.mask == 0xFFFF));
        assert_eq!(store.get(1).unwrap().quality, Quality::Good);
    }

    #[test]
    fn test_update_from_good_flags_only_deltas() {
        let mut store = RegisterStore::new(3);
        store.apply_update(Quality::Good, Some(&[1, 2, 3]));

        let changes = store.apply_update(Quality::Good, Some(&[1, 0x0F02, 3]));
        assert_eq!(
            changes,
            vec![RegisterChange {
                index: 1,
                mask: 0x0F00
            }]
        );
        assert_eq!(store.get(1).unwrap().value, 0x0F02);
    }

    #[test]
    fn test_failed_poll_keeps_values() {
        let mut store = RegisterStore::new(2);
        store.apply_update(Quality::Good, Some(&[7, 8]));

        let changes = store.apply_update(Quality::Bad, None);
        assert_eq!(changes.len(), 2);
        assert_eq!(
            store.get(0),
            Some(Register {
                value: 7,
                quality: Quality::Bad
            })
        );

        // already bad, nothing new to report
        assert!(store.apply_update(Quality::Bad, None).is_empty());

        // recovery flags everything again
        let changes = store.apply_update(Quality::Good, Some(&[7, 8]));
        assert!(changes.iter().all(|c| c.mask == 0xFFFF));
    }

    #[test]
    fn test_set_registers_skips_unchanged() {
        let mut store = RegisterStore::new(4);
        let changes = store.set_registers(1, &[0, 0]).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(store.get(2).unwrap().quality, Quality::Good);
        assert_eq!(store.get(3).unwrap().quality, Quality::Bad);

        let changes = store.set_registers(1, &[0, 4]).unwrap();
        assert_eq!(changes, vec![RegisterChange { index: 2, mask: 4 }]);
    }

    #[test]
    fn test_set_registers_out_of_range() {
        let mut store = RegisterStore::new(4);
        assert_eq!(
            store.set_registers(3, &[1, 2]),
            Err(RangeError::OutOfBounds {
                start: 3,
                count: 2,
                size: 4
            })
        );
        assert_eq!(store.get(3).unwrap().quality, Quality::Bad);
    }

    #[test]
    fn test_read_and_grow() {
        let mut store = RegisterStore::new(2);
        assert!(store.read(1, 2).is_err());
        store.grow(5);
        store.set_registers(4, &[9]).unwrap();
        assert_eq!(store.read(2, 3).unwrap(), vec![0, 0, 9]);
        store.grow(1);
        assert_eq!(store.len(), 5);
    }
}
