//! Read-only query API for inspecting frames.
//!
//! Snapshot types aggregate a frame's state into owned views for display
//! and export. KPI helpers average the duration samples recorded across the
//! timeline up to the current frame.

use crate::engine::Engine;
use crate::fixed::{Fixed64, Ticks};
use crate::id::*;
use crate::resource::Multipliers;
use crate::timeline::Frame;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Step snapshot
// ---------------------------------------------------------------------------

/// An aggregated, read-only view of one process step at one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSnapshot {
    pub id: StepId,
    pub name: String,
    pub active: bool,
    /// Per-material unit counts in the inventory.
    pub contents: BTreeMap<MaterialId, u32>,
    pub limit: u32,
    pub overflow: u32,
    /// Ticks left on the in-progress batch, if any.
    pub batch_remaining: Option<Ticks>,
    /// Progress as a 0..1 fraction. 0 when idle.
    pub progress: Fixed64,
    pub orders: BTreeSet<OrderId>,
    pub multipliers: Multipliers,
    pub input_links: Vec<LinkId>,
    pub output_links: Vec<LinkId>,
}

// ---------------------------------------------------------------------------
// Link snapshot
// ---------------------------------------------------------------------------

/// An aggregated, read-only view of one transport link at one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub id: LinkId,
    pub name: String,
    pub kind: String,
    pub from: StepId,
    pub to: StepId,
    pub active: bool,
    pub in_transit: u32,
    pub overflow: u32,
    /// How full the link is, as a 0..1 fraction.
    pub utilization: Fixed64,
    pub orders: BTreeSet<OrderId>,
}

impl Frame {
    pub fn step_snapshot(&self, id: StepId) -> Option<StepSnapshot> {
        let graph = self.state.graph();
        let step = graph.step(id)?;
        let inv = self.state.step_inventory(id)?;
        let rt = self.state.step_runtime(id)?;
        let (batch_remaining, progress) = match &rt.batch {
            Some(b) => {
                let total = b.finish_tick.saturating_sub(b.started_tick);
                let done = self.tick.saturating_sub(b.started_tick).min(total);
                let progress = if total == 0 {
                    Fixed64::ONE
                } else {
                    Fixed64::saturating_from_num(done) / Fixed64::saturating_from_num(total)
                };
                (Some(b.remaining(self.tick)), progress)
            }
            None => (None, Fixed64::ZERO),
        };
        Some(StepSnapshot {
            id,
            name: step.name.clone(),
            active: step.active,
            contents: inv.contents(),
            limit: inv.limit(),
            overflow: rt.overflow.len() as u32,
            batch_remaining,
            progress,
            orders: rt.orders.clone(),
            multipliers: rt.multipliers,
            input_links: graph.inputs(id).to_vec(),
            output_links: graph.outputs(id).to_vec(),
        })
    }

    pub fn link_snapshot(&self, id: LinkId) -> Option<LinkSnapshot> {
        let link = self.state.graph().link(id)?;
        let inv = self.state.link_inventory(id)?;
        let rt = self.state.link_runtime(id)?;
        let utilization = if inv.limit() == 0 {
            Fixed64::ZERO
        } else {
            Fixed64::from_num(inv.len()) / Fixed64::from_num(inv.limit())
        };
        Some(LinkSnapshot {
            id,
            name: link.name.clone(),
            kind: link.kind.clone(),
            from: link.from,
            to: link.to,
            active: link.active,
            in_transit: inv.len(),
            overflow: rt.overflow.len() as u32,
            utilization,
            orders: rt.orders.clone(),
        })
    }

    /// Units of `material` held anywhere in the factory, including overflow.
    pub fn material_total(&self, material: MaterialId) -> u32 {
        self.state
            .all_entries()
            .filter(|e| e.material == material)
            .count() as u32
    }
}

// ---------------------------------------------------------------------------
// KPIs
// ---------------------------------------------------------------------------

fn mean(samples: impl Iterator<Item = Ticks>) -> Option<Fixed64> {
    let (sum, count) = samples.fold((0u64, 0u64), |(s, c), v| (s.saturating_add(v), c + 1));
    if count == 0 {
        return None;
    }
    Some(Fixed64::saturating_from_num(sum) / Fixed64::saturating_from_num(count))
}

impl Engine {
    /// Mean step duration for steps named `step_name`, over the history up
    /// to the current frame.
    pub fn mean_step_duration(&self, step_name: &str) -> Option<Fixed64> {
        mean(
            self.timeline()
                .history()
                .iter()
                .filter_map(|f| f.step_durations.get(step_name))
                .flatten()
                .copied(),
        )
    }

    /// Mean transport duration for links of type `kind`, over the history up
    /// to the current frame.
    pub fn mean_transport_duration(&self, kind: &str) -> Option<Fixed64> {
        mean(
            self.timeline()
                .history()
                .iter()
                .filter_map(|f| f.transport_durations.get(kind))
                .flatten()
                .copied(),
        )
    }

    /// Production counter history of one sensor, one value per frame up to
    /// the current one.
    pub fn sensor_history(&self, sensor: SensorId) -> Vec<(Ticks, u64)> {
        self.timeline()
            .history()
            .iter()
            .map(|f| (f.tick, f.state.sensor_count(sensor)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_samples() {
        assert_eq!(mean([2u64, 4, 6].into_iter()), Some(Fixed64::from_num(4)));
        assert_eq!(mean(std::iter::empty()), None);
        assert_eq!(mean([1u64, 2].into_iter()), Some(Fixed64::from_num(1.5)));
    }
}
