//! The mutable factory state carried by every frame.
//!
//! [`FactoryState`] bundles the graph with per-holder inventories and
//! runtime side-tables (`SecondaryMap`s keyed by the graph's arenas). A
//! frame owns a full clone of it, so toggles and parameter updates made at
//! one tick never leak into earlier frames.

use crate::fixed::Ticks;
use crate::graph::{FactoryGraph, GraphError};
use crate::id::*;
use crate::inventory::{Inventory, InventoryEntry, Stage};
use crate::production::Batch;
use crate::resource::Multipliers;
use crate::rng::SimRng;
use crate::sim::StateHash;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::collections::{BTreeSet, VecDeque};

/// Runtime data for one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRuntime {
    /// In-progress batch, if any.
    pub batch: Option<Batch>,
    /// Entries that could not be placed for lack of room. Retried first
    /// thing every tick, oldest first.
    pub overflow: VecDeque<InventoryEntry>,
    pub multipliers: Multipliers,
    /// Orders with material here, refreshed at the end of every tick.
    pub orders: BTreeSet<OrderId>,
}

/// Runtime data for one link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRuntime {
    pub overflow: VecDeque<InventoryEntry>,
    pub multipliers: Multipliers,
    pub orders: BTreeSet<OrderId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryState {
    pub(crate) graph: FactoryGraph,
    pub(crate) step_inventories: SecondaryMap<StepId, Inventory>,
    pub(crate) link_inventories: SecondaryMap<LinkId, Inventory>,
    pub(crate) step_runtime: SecondaryMap<StepId, StepRuntime>,
    pub(crate) link_runtime: SecondaryMap<LinkId, LinkRuntime>,
    pub(crate) sensor_counters: SecondaryMap<SensorId, u64>,
    pub(crate) rng: SimRng,
}

impl FactoryState {
    /// Create empty inventories and runtime tables for every step and link.
    pub fn new(graph: FactoryGraph) -> Self {
        let mut step_inventories = SecondaryMap::new();
        let mut step_runtime = SecondaryMap::new();
        for (id, step) in graph.steps() {
            step_inventories.insert(id, Inventory::new(step.params.limit));
            step_runtime.insert(id, StepRuntime::default());
        }
        let mut link_inventories = SecondaryMap::new();
        let mut link_runtime = SecondaryMap::new();
        for (id, link) in graph.links() {
            link_inventories.insert(id, Inventory::new(link.params.limit));
            link_runtime.insert(id, LinkRuntime::default());
        }
        let mut sensor_counters = SecondaryMap::new();
        for (id, _) in graph.sensors() {
            sensor_counters.insert(id, 0);
        }
        Self {
            graph,
            step_inventories,
            link_inventories,
            step_runtime,
            link_runtime,
            sensor_counters,
            rng: SimRng::default(),
        }
    }

    /// Place `count` units of `material` at a step as queued arrivals at
    /// tick 0. Returns how many fit under the limit.
    pub fn seed_step(
        &mut self,
        step: StepId,
        material: MaterialId,
        count: u32,
        order: Option<OrderId>,
    ) -> Result<u32, GraphError> {
        let inv = self
            .step_inventories
            .get_mut(step)
            .ok_or(GraphError::StepNotFound(step))?;
        Ok(seed(inv, Holder::Step(step), material, count, order, Stage::Queued))
    }

    /// Place `count` units of `material` in transit on a link.
    pub fn seed_link(
        &mut self,
        link: LinkId,
        material: MaterialId,
        count: u32,
        order: Option<OrderId>,
    ) -> Result<u32, GraphError> {
        let inv = self
            .link_inventories
            .get_mut(link)
            .ok_or(GraphError::LinkNotFound(link))?;
        Ok(seed(inv, Holder::Link(link), material, count, order, Stage::Ready))
    }

    // -- Accessors --

    pub fn graph(&self) -> &FactoryGraph {
        &self.graph
    }

    pub fn step_inventory(&self, step: StepId) -> Option<&Inventory> {
        self.step_inventories.get(step)
    }

    pub fn link_inventory(&self, link: LinkId) -> Option<&Inventory> {
        self.link_inventories.get(link)
    }

    pub fn inventory(&self, holder: Holder) -> Option<&Inventory> {
        match holder {
            Holder::Step(s) => self.step_inventory(s),
            Holder::Link(l) => self.link_inventory(l),
        }
    }

    pub fn step_runtime(&self, step: StepId) -> Option<&StepRuntime> {
        self.step_runtime.get(step)
    }

    pub fn link_runtime(&self, link: LinkId) -> Option<&LinkRuntime> {
        self.link_runtime.get(link)
    }

    /// Production counter of a sensor.
    pub fn sensor_count(&self, sensor: SensorId) -> u64 {
        self.sensor_counters.get(sensor).copied().unwrap_or(0)
    }

    pub fn rng(&self) -> &SimRng {
        &self.rng
    }

    /// Every entry held anywhere, including overflow queues.
    pub fn all_entries(&self) -> impl Iterator<Item = &InventoryEntry> {
        let steps = self
            .step_inventories
            .values()
            .flat_map(|inv| inv.entries().iter());
        let links = self
            .link_inventories
            .values()
            .flat_map(|inv| inv.entries().iter());
        let step_overflow = self.step_runtime.values().flat_map(|rt| rt.overflow.iter());
        let link_overflow = self.link_runtime.values().flat_map(|rt| rt.overflow.iter());
        steps.chain(links).chain(step_overflow).chain(link_overflow)
    }

    /// Total entries held anywhere.
    pub fn entry_count(&self) -> usize {
        self.all_entries().count()
    }

    // -- Hashing --

    pub(crate) fn hash_into(&self, h: &mut StateHash) {
        for (id, inv) in &self.step_inventories {
            hash_inventory(h, inv);
            if let Some(rt) = self.step_runtime.get(id) {
                h.write_u32(rt.overflow.len() as u32);
                h.write_opt_ticks(rt.batch.as_ref().map(|b| b.finish_tick));
            }
            if let Some(step) = self.graph.step(id) {
                h.write(&[step.active as u8]);
            }
        }
        for (id, inv) in &self.link_inventories {
            hash_inventory(h, inv);
            if let Some(rt) = self.link_runtime.get(id) {
                h.write_u32(rt.overflow.len() as u32);
            }
            if let Some(link) = self.graph.link(id) {
                h.write(&[link.active as u8]);
            }
        }
        for (_, count) in &self.sensor_counters {
            h.write_u64(*count);
        }
        h.write_u64(self.rng.state());
    }
}

fn seed(
    inv: &mut Inventory,
    holder: Holder,
    material: MaterialId,
    count: u32,
    order: Option<OrderId>,
    stage: Stage,
) -> u32 {
    let mut placed = 0;
    for _ in 0..count {
        let mut entry = InventoryEntry::new(material, holder, 0).with_stage(stage);
        entry.order = order;
        if inv.try_push(entry).is_err() {
            break;
        }
        placed += 1;
    }
    placed
}

fn hash_inventory(h: &mut StateHash, inv: &Inventory) {
    h.write_u32(inv.limit());
    h.write_u32(inv.len());
    for e in inv.entries() {
        h.write_u32(e.material.0);
        h.write_u32(e.order.map_or(u32::MAX, |o| o.0));
        h.write(&[e.stage.code()]);
        h.write_u64(e.arrived_tick);
        h.write_opt_ticks(e.left_tick);
    }
}

/// Tick `t` minus an earlier tick, saturating at 0.
pub(crate) fn elapsed(now: Ticks, since: Ticks) -> Ticks {
    now.saturating_sub(since)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{LinkParams, ProcessStep, Sensor, StepParams, TransportLink};

    fn state() -> (FactoryState, StepId, LinkId) {
        let mut g = FactoryGraph::new();
        let a = g.add_step(ProcessStep::new("A", StepParams::new(3))).unwrap();
        let b = g.add_step(ProcessStep::new("B", StepParams::new(3))).unwrap();
        let l = g.add_link(TransportLink::new("a->b", a, b, LinkParams::new(2))).unwrap();
        g.add_sensor(Sensor::new("gate", l)).unwrap();
        (FactoryState::new(g), a, l)
    }

    #[test]
    fn inventories_sized_from_params() {
        let (s, a, l) = state();
        assert_eq!(s.step_inventory(a).unwrap().limit(), 3);
        assert_eq!(s.link_inventory(l).unwrap().limit(), 2);
        assert_eq!(s.entry_count(), 0);
    }

    #[test]
    fn seeding_stops_at_limit() {
        let (mut s, a, l) = state();
        assert_eq!(s.seed_step(a, MaterialId(0), 5, Some(OrderId(1))), Ok(3));
        assert_eq!(s.seed_link(l, MaterialId(0), 1, None), Ok(1));
        let inv = s.step_inventory(a).unwrap();
        assert!(inv.entries().iter().all(|e| e.stage == Stage::Queued));
        assert_eq!(s.link_inventory(l).unwrap().entries()[0].stage, Stage::Ready);
        assert_eq!(s.entry_count(), 4);
    }

    #[test]
    fn hash_changes_with_contents() {
        let (mut s, a, _) = state();
        let mut before = StateHash::new();
        s.hash_into(&mut before);
        s.seed_step(a, MaterialId(0), 1, None).unwrap();
        let mut after = StateHash::new();
        s.hash_into(&mut after);
        assert_ne!(before.finish(), after.finish());
    }

    #[test]
    fn clone_is_independent() {
        let (mut s, a, _) = state();
        let snapshot = s.clone();
        s.seed_step(a, MaterialId(0), 1, None).unwrap();
        assert_eq!(snapshot.entry_count(), 0);
        assert_eq!(s.entry_count(), 1);
    }
}
