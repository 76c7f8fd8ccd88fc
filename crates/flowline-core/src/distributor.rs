//! Flow distributor: moves ready items from steps onto their output links.
//!
//! Each active step offers its ready, active-order items (oldest arrival
//! first) to its active output links. Links take turns, one item per turn,
//! until every link has reached its capacity for the tick or no item it
//! accepts is left. A link's capacity is the lower of the step's output
//! speed and the link's input speed, both after resource multipliers.

use crate::engine::{TickOutput, place};
use crate::fixed::Ticks;
use crate::id::*;
use crate::inventory::{InventoryEntry, Stage};
use crate::sensor::{ScanDirection, SensorLogger};
use crate::state::FactoryState;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Round-robin assignment of `items` to destinations.
///
/// Each pass visits destinations in order and gives each open destination
/// the first unassigned item it `accepts`. A destination closes when it
/// reaches its capacity or finds nothing acceptable. Returns, per
/// destination, indices into `items` in assignment order.
pub fn round_robin<T>(
    items: &[T],
    capacities: &[u32],
    accepts: impl Fn(usize, &T) -> bool,
) -> Vec<Vec<usize>> {
    let mut assigned = vec![false; items.len()];
    let mut out: Vec<Vec<usize>> = vec![Vec::new(); capacities.len()];
    let mut open: Vec<bool> = capacities.iter().map(|&c| c > 0).collect();

    while open.iter().any(|&o| o) {
        for dest in 0..capacities.len() {
            if !open[dest] {
                continue;
            }
            let next = (0..items.len()).find(|&i| !assigned[i] && accepts(dest, &items[i]));
            match next {
                Some(i) => {
                    assigned[i] = true;
                    out[dest].push(i);
                    if out[dest].len() as u32 >= capacities[dest] {
                        open[dest] = false;
                    }
                }
                None => open[dest] = false,
            }
        }
    }
    out
}

pub(crate) fn run(state: &mut FactoryState, active: &BTreeSet<OrderId>, tick: Ticks, out: &mut TickOutput) {
    for id in state.graph.step_ids() {
        distribute_step(state, id, active, tick, out);
    }
}

fn distribute_step(
    state: &mut FactoryState,
    id: StepId,
    active: &BTreeSet<OrderId>,
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
        step_runtime.get(id),
    ) else {
        return;
    };
    if !step.active {
        return;
    }

    let outlets: Vec<LinkId> = graph
        .outputs(id)
        .iter()
        .copied()
        .filter(|&l| graph.link(l).is_some_and(|link| link.active))
        .collect();
    if outlets.is_empty() {
        return;
    }
    let step_speed = rt.multipliers.step_speed(step.params.output_speed);
    let capacities: Vec<u32> = outlets
        .iter()
        .map(|&l| {
            let link_speed = match (graph.link(l), link_runtime.get(l)) {
                (Some(link), Some(lrt)) => lrt.multipliers.link_speed(link.params.input_speed),
                _ => 0,
            };
            step_speed.min(link_speed)
        })
        .collect();

    let entries = inv.entries();
    let mut candidates: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.stage == Stage::Ready && e.is_for(active))
        .map(|(i, _)| i)
        .collect();
    candidates.sort_by_key(|&i| entries[i].arrived_tick);

    let assignment = round_robin(&candidates, &capacities, |dest, &i| {
        graph
            .link(outlets[dest])
            .is_some_and(|link| link.accepts(entries[i].material))
    });
    let picked: Vec<usize> = assignment
        .iter()
        .flatten()
        .map(|&c| candidates[c])
        .collect();
    if picked.is_empty() {
        return;
    }

    let mut sorted = picked.clone();
    sorted.sort_unstable();
    let mut removed: BTreeMap<usize, InventoryEntry> =
        sorted.into_iter().zip(inv.remove_indices(&picked)).collect();

    let step_holder = Holder::Step(id);
    let step_sensors = graph.sensors_of(step_holder);
    let mut logger = SensorLogger {
        counters: sensor_counters,
        log: &mut out.sensor_log,
        tick,
    };
    for (dest, picks) in assignment.iter().enumerate() {
        let link_id = outlets[dest];
        let link_holder = Holder::Link(link_id);
        let (Some(link_inv), Some(lrt)) = (link_inventories.get_mut(link_id), link_runtime.get_mut(link_id)) else {
            continue;
        };
        let link_sensors = graph.sensors_of(link_holder);
        for &c in picks {
            let Some(mut entry) = removed.remove(&candidates[c]) else {
                continue;
            };
            entry.left_tick = Some(tick);
            logger.scan(step_sensors, step_holder, ScanDirection::Output, &entry);
            entry.holder = link_holder;
            entry.arrived_tick = tick;
            entry.stage = Stage::Ready;
            logger.scan(link_sensors, link_holder, ScanDirection::Input, &entry);
            if let Some(order) = entry.order {
                out.moved.insert(order);
            }
            trace!(step = %step.name, material = entry.material.0, tick, "item onto link");
            place(link_inv, &mut lrt.overflow, entry, tick, &mut out.events);
        }
    }
}
