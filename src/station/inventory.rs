//! Inventory bitmask
//!
//! One bit per time slot. A chain whose records each fall in a distinct
//! slot can report its length with a population count, without walking.

use serde::{Deserialize, Serialize};

/// Fixed-width bitmask over time slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    words: Vec<u64>,
    slots: u32,
}

impl Inventory {
    /// Create an empty inventory with `slots` bits
    pub fn new(slots: u32) -> Self {
        let words = (slots as usize + 63) / 64;
        Self {
            words: vec![0; words],
            slots,
        }
    }

    /// Number of slots
    pub fn slots(&self) -> u32 {
        self.slots
    }

    /// Set a slot. Returns false if it was already set or out of range.
    pub fn mark(&mut self, slot: u32) -> bool {
        if slot >= self.slots {
            return false;
        }
        let (word, bit) = (slot as usize / 64, slot % 64);
        let mask = 1u64 << bit;
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    pub fn is_marked(&self, slot: u32) -> bool {
        if slot >= self.slots {
            return false;
        }
        self.words[slot as usize / 64] & (1u64 << (slot % 64)) != 0
    }

    /// Population count
    pub fn count(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }
}
