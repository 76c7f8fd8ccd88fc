//! Per-item inventories.
//!
//! Unlike a stack-based store, every unit of material is its own
//! [`InventoryEntry`] so that order ownership, arrival time and slot number
//! can be tracked per item.

use crate::fixed::Ticks;
use crate::id::{Holder, MaterialId, OrderId};
use crate::slot::SlotTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Where an entry is in its stay at a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Arrived and waiting: recipe input, or waiting to be held.
    Queued,
    /// Held by a non-recipe step's in-progress batch.
    Holding,
    /// Available for distribution downstream.
    Ready,
}

impl Stage {
    pub(crate) fn code(self) -> u8 {
        match self {
            Stage::Queued => 0,
            Stage::Holding => 1,
            Stage::Ready => 2,
        }
    }
}

/// One unit of material.
///
/// Material, creation tick and origin never change. Ownership tag, holder,
/// stage, timing and slot metadata do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub material: MaterialId,
    pub added_at: Ticks,
    pub holder: Holder,
    pub order: Option<OrderId>,
    pub stage: Stage,
    /// Tick the entry arrived at its current holder.
    pub arrived_tick: Ticks,
    /// Tick the entry last left a holder.
    pub left_tick: Option<Ticks>,
    pub slot: Option<u32>,
}

impl InventoryEntry {
    pub fn new(material: MaterialId, holder: Holder, tick: Ticks) -> Self {
        Self {
            material,
            added_at: tick,
            holder,
            order: None,
            stage: Stage::Queued,
            arrived_tick: tick,
            left_tick: None,
            slot: None,
        }
    }

    pub fn with_order(mut self, order: OrderId) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// True when the entry is tagged to one of `active` orders.
    pub fn is_for(&self, active: &BTreeSet<OrderId>) -> bool {
        self.order.is_some_and(|o| active.contains(&o))
    }
}

/// A bounded, slot-numbered collection of entries owned by one holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    limit: u32,
    entries: Vec<InventoryEntry>,
    pub(crate) slots: SlotTable,
}

impl Inventory {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            entries: Vec::new(),
            slots: SlotTable::with_capacity(limit),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn len(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remaining room under the limit.
    pub fn free(&self) -> u32 {
        self.limit.saturating_sub(self.len())
    }

    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    pub fn entries(&self) -> &[InventoryEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [InventoryEntry] {
        &mut self.entries
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    /// Add an entry under the limit.
    ///
    /// Returns the entry back when the inventory is full. `Ok(None)` means
    /// the entry was stored but no slot number was free.
    pub fn try_push(&mut self, mut entry: InventoryEntry) -> Result<Option<u32>, InventoryEntry> {
        if self.is_full() {
            return Err(entry);
        }
        let slot = self.slots.assign();
        entry.slot = slot;
        self.entries.push(entry);
        Ok(slot)
    }

    /// Remove the entries at `indices`, returned in ascending index order.
    pub fn remove_indices(&mut self, indices: &[usize]) -> Vec<InventoryEntry> {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut removed = Vec::with_capacity(sorted.len());
        for &i in sorted.iter().rev() {
            if i < self.entries.len() {
                let entry = self.entries.remove(i);
                removed.push(self.release(entry));
            }
        }
        removed.reverse();
        removed
    }

    /// Remove every entry matching `pred`, preserving their order.
    pub fn take_where(&mut self, mut pred: impl FnMut(&InventoryEntry) -> bool) -> Vec<InventoryEntry> {
        let indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| pred(e))
            .map(|(i, _)| i)
            .collect();
        self.remove_indices(&indices)
    }

    fn release(&mut self, mut entry: InventoryEntry) -> InventoryEntry {
        if let Some(slot) = entry.slot.take() {
            self.slots.release(slot);
        }
        entry
    }

    /// Change the limit. Entries beyond the new limit are evicted, newest
    /// first, and returned oldest first.
    pub fn set_limit(&mut self, limit: u32) -> Vec<InventoryEntry> {
        self.limit = limit;
        let mut evicted = Vec::new();
        while self.len() > limit {
            if let Some(entry) = self.entries.pop() {
                evicted.push(self.release(entry));
            }
        }
        evicted.reverse();
        self.slots.resize(limit);
        evicted
    }

    pub fn count(&self, material: MaterialId) -> u32 {
        self.entries.iter().filter(|e| e.material == material).count() as u32
    }

    pub fn count_where(&self, pred: impl Fn(&InventoryEntry) -> bool) -> u32 {
        self.entries.iter().filter(|e| pred(e)).count() as u32
    }

    /// Per-material counts of entries in `stage`.
    pub fn counts_in(&self, stage: Stage) -> BTreeMap<MaterialId, u32> {
        let mut counts = BTreeMap::new();
        for e in self.entries.iter().filter(|e| e.stage == stage) {
            *counts.entry(e.material).or_insert(0) += 1;
        }
        counts
    }

    /// Per-material counts of all entries.
    pub fn contents(&self) -> BTreeMap<MaterialId, u32> {
        let mut counts = BTreeMap::new();
        for e in &self.entries {
            *counts.entry(e.material).or_insert(0) += 1;
        }
        counts
    }

    /// Distinct orders owning at least one entry.
    pub fn orders(&self) -> BTreeSet<OrderId> {
        self.entries.iter().filter_map(|e| e.order).collect()
    }
}
