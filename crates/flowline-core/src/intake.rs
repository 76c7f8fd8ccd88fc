//! Intake controller: moves items from links into their destination steps.
//!
//! For every active step, each active input link releases its eligible
//! items (active order, transport delay elapsed) oldest first, up to the
//! lower of the step's input speed and the link's output speed and the
//! step's free room. Recipe steps admit only what their recipe can still
//! use; an input that does not fit the current mix leaves the link anyway
//! and waits in the step's overflow, while material the recipe never uses
//! stays on the link. Links with a minimum batch hold items back until enough are
//! eligible, unless the upstream step has nothing more to send.

use crate::engine::{TickOutput, place};
use crate::fixed::Ticks;
use crate::id::*;
use crate::inventory::Stage;
use crate::registry::{Recipe, Registry};
use crate::sensor::{ScanDirection, SensorLogger};
use crate::state::{FactoryState, elapsed};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Whether a step whose inventory holds `len` entries, `queued` of them
/// waiting as recipe inputs, should take one more unit of `material`.
///
/// Without a recipe any room suffices. With a recipe the material must be
/// an input, and after taking it there must still be room for the rest of
/// one complete set of inputs.
pub fn admits(
    recipe: Option<&Recipe>,
    limit: u32,
    len: u32,
    queued: &BTreeMap<MaterialId, u32>,
    material: MaterialId,
) -> bool {
    if len >= limit {
        return false;
    }
    let Some(recipe) = recipe else {
        return true;
    };
    if recipe.requires(material) == 0 {
        return false;
    }
    let inputs: BTreeSet<MaterialId> = recipe.inputs.iter().map(|e| e.material).collect();
    let deficit: u64 = inputs
        .into_iter()
        .map(|m| {
            let have = queued.get(&m).copied().unwrap_or(0) + u32::from(m == material);
            recipe.requires(m).saturating_sub(have) as u64
        })
        .sum();
    len as u64 + 1 + deficit <= limit as u64
}

/// For each upstream step feeding a link: does it still hold, or is it
/// about to release, material for an active order?
fn upstream_pending(state: &FactoryState, active: &BTreeSet<OrderId>) -> BTreeMap<StepId, bool> {
    let mut pending_by_step = BTreeMap::new();
    for (_, link) in state.graph.links() {
        pending_by_step.entry(link.from).or_insert_with(|| {
            let in_inventory = state
                .step_inventories
                .get(link.from)
                .is_some_and(|inv| inv.entries().iter().any(|e| e.is_for(active)));
            let pending = state.step_runtime.get(link.from).is_some_and(|rt| {
                rt.overflow.iter().any(|e| e.is_for(active))
                    || rt
                        .batch
                        .as_ref()
                        .is_some_and(|b| b.orders().any(|o| active.contains(&o)))
            });
            in_inventory || pending
        });
    }
    pending_by_step
}

pub(crate) fn run(
    state: &mut FactoryState,
    registry: &Registry,
    active: &BTreeSet<OrderId>,
    tick: Ticks,
    out: &mut TickOutput,
) {
    let sources = upstream_pending(state, active);
    for id in state.graph.step_ids() {
        intake_step(state, registry, id, active, &sources, tick, out);
    }
}

fn intake_step(
    state: &mut FactoryState,
    registry: &Registry,
    id: StepId,
    active: &BTreeSet<OrderId>,
    sources: &BTreeMap<StepId, bool>,
    tick: Ticks,
    out: &mut TickOutput,
) {
    let FactoryState {
        graph,
        step_inventories,
        link_inventories,
        step_runtime,
        link_runtime,
        sensor_counters,
        ..
    } = state;
    let (Some(step), Some(inv), Some(rt)) = (
        graph.step(id),
        step_inventories.get_mut(id),
        step_runtime.get_mut(id),
    ) else {
        return;
    };
    if !step.active {
        return;
    }
    let recipe = step.recipe.and_then(|r| registry.recipe(r));
    let step_holder = Holder::Step(id);
    let step_sensors = graph.sensors_of(step_holder);

    for &link_id in graph.inputs(id) {
        let Some(link) = graph.link(link_id) else {
            continue;
        };
        let (Some(link_inv), Some(lrt)) = (link_inventories.get_mut(link_id), link_runtime.get(link_id)) else {
            continue;
        };
        if !link.active {
            continue;
        }

        let speed = rt
            .multipliers
            .step_speed(step.params.input_speed)
            .min(lrt.multipliers.link_speed(link.params.output_speed));

        let entries = link_inv.entries();
        let mut eligible: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| {
                e.is_for(active) && elapsed(tick, e.arrived_tick) >= link.params.transport_delay
            })
            .map(|(i, _)| i)
            .collect();
        eligible.sort_by_key(|&i| entries[i].arrived_tick);

        let min_quantity = link.params.min_quantity;
        let upstream_busy = sources.get(&link.from).copied().unwrap_or(false) || !lrt.overflow.is_empty();
        if min_quantity > 0 && (eligible.len() as u32) < min_quantity && upstream_busy {
            trace!(link = %link.name, eligible = eligible.len(), min_quantity, "waiting for batch");
            continue;
        }

        // Queued recipe inputs in overflow wait on admission, not on room.
        let reserved = rt
            .overflow
            .iter()
            .filter(|e| recipe.is_none() || e.stage != Stage::Queued)
            .count() as u32;
        let free = inv.free().saturating_sub(reserved);
        let quota = (speed.min(free) as usize).min(eligible.len());
        let mut queued = inv.counts_in(Stage::Queued);
        let mut len = inv.len() + reserved;
        let mut picks: Vec<(usize, bool)> = Vec::new();
        for &i in &eligible {
            if picks.len() >= quota {
                break;
            }
            let material = entries[i].material;
            if admits(recipe, inv.limit(), len, &queued, material) {
                picks.push((i, true));
                *queued.entry(material).or_insert(0) += 1;
                len += 1;
            } else if recipe.is_some_and(|r| r.requires(material) > 0) {
                picks.push((i, false));
            }
        }
        if picks.is_empty() {
            continue;
        }
        picks.sort_unstable_by_key(|&(i, _)| i);
        let indices: Vec<usize> = picks.iter().map(|&(i, _)| i).collect();

        let link_holder = Holder::Link(link_id);
        let link_sensors = graph.sensors_of(link_holder);
        let mut logger = SensorLogger {
            counters: &mut *sensor_counters,
            log: &mut out.sensor_log,
            tick,
        };
        let removed = link_inv.remove_indices(&indices);
        for (mut entry, (_, fits)) in removed.into_iter().zip(picks) {
            entry.left_tick = Some(tick);
            out.transport_durations
                .entry(link.kind.clone())
                .or_default()
                .push(elapsed(tick, entry.arrived_tick));
            logger.scan(link_sensors, link_holder, ScanDirection::Output, &entry);
            entry.holder = step_holder;
            entry.arrived_tick = tick;
            entry.stage = Stage::Queued;
            logger.scan(step_sensors, step_holder, ScanDirection::Input, &entry);
            if let Some(order) = entry.order {
                out.moved.insert(order);
            }
            if !fits {
                trace!(step = %step.name, material = entry.material.0, tick, "input deferred to overflow");
                rt.overflow.push_back(entry);
                continue;
            }
            trace!(step = %step.name, material = entry.material.0, tick, "item into step");
            place(inv, &mut rt.overflow, entry, tick, &mut out.events);
        }
    }
}
