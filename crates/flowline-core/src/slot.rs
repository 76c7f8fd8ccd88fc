//! Slot numbering for inventory entries.
//!
//! Every inventory owns a table of numbered slots, one per unit of limit.
//! An entry takes the lowest free slot when it arrives and releases it when
//! it leaves.

use serde::{Deserialize, Serialize};

/// Occupancy of the numbered slots of one inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTable {
    used: Vec<bool>,
}

impl SlotTable {
    pub fn with_capacity(slots: u32) -> Self {
        Self {
            used: vec![false; slots as usize],
        }
    }

    /// Number of slots in the table.
    pub fn capacity(&self) -> u32 {
        self.used.len() as u32
    }

    pub fn used_count(&self) -> u32 {
        self.used.iter().filter(|&&u| u).count() as u32
    }

    pub fn is_used(&self, slot: u32) -> bool {
        self.used.get(slot as usize).copied().unwrap_or(false)
    }

    /// Take the lowest-numbered free slot, or `None` when every slot is used.
    pub fn assign(&mut self) -> Option<u32> {
        let slot = self.used.iter().position(|&u| !u)?;
        self.used[slot] = true;
        Some(slot as u32)
    }

    /// Free a slot. Releasing an unknown or already free slot is a no-op.
    pub fn release(&mut self, slot: u32) {
        if let Some(u) = self.used.get_mut(slot as usize) {
            *u = false;
        }
    }

    /// Resize to `slots`, never dropping a slot that is still in use.
    pub fn resize(&mut self, slots: u32) {
        let highest_used = self.used.iter().rposition(|&u| u).map_or(0, |i| i + 1);
        self.used.resize((slots as usize).max(highest_used), false);
    }
}
