//! Production scheduler: batches at process steps.
//!
//! A recipe step consumes the earliest queued active-order inputs per run
//! and, after `duration` ticks, releases the outputs tagged to the order of
//! the oldest input consumed. A step
//! without a recipe holds everything queued for `duration` ticks and then
//! releases it unchanged. Each step has at most one batch in progress.
//!
//! Recipe steps are processed before non-recipe steps, each group in arena
//! order. Inactive steps are skipped, which freezes their batch.

use crate::engine::{TickOutput, place};
use crate::event::Event;
use crate::fixed::{Fixed64, Ticks};
use crate::graph::ProcessStep;
use crate::id::*;
use crate::inventory::{Inventory, InventoryEntry, Stage};
use crate::registry::{Recipe, Registry};
use crate::rng::SimRng;
use crate::sensor::{ScanDirection, SensorLogger};
use crate::state::{FactoryState, StepRuntime, elapsed};
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// What an in-progress batch will release when it finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchWork {
    /// Outputs of `runs` recipe runs, each tagged to its run's order.
    Recipe {
        runs: u32,
        outputs: Vec<(MaterialId, OrderId)>,
    },
    /// `held` entries sitting in the step's inventory as [`Stage::Holding`].
    Hold { held: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub started_tick: Ticks,
    pub finish_tick: Ticks,
    pub work: BatchWork,
}

impl Batch {
    /// Orders whose output is pending in this batch.
    pub fn orders(&self) -> impl Iterator<Item = OrderId> + '_ {
        let outputs = match &self.work {
            BatchWork::Recipe { outputs, .. } => outputs.as_slice(),
            BatchWork::Hold { .. } => &[],
        };
        outputs.iter().map(|&(_, o)| o)
    }

    /// Ticks left until the batch finishes.
    pub fn remaining(&self, tick: Ticks) -> Ticks {
        self.finish_tick.saturating_sub(tick)
    }
}

pub(crate) fn run(
    state: &mut FactoryState,
    registry: &Registry,
    active: &BTreeSet<OrderId>,
    tick: Ticks,
    out: &mut TickOutput,
) {
    let steps = state.graph.step_ids();
    for recipe_pass in [true, false] {
        for &id in &steps {
            let Some(step) = state.graph.step(id) else {
                continue;
            };
            if !step.active || step.recipe.is_some() != recipe_pass {
                continue;
            }
            run_step(state, registry, id, active, tick, out);
        }
    }
}

fn run_step(
    state: &mut FactoryState,
    registry: &Registry,
    id: StepId,
    active: &BTreeSet<OrderId>,
    tick: Ticks,
    out: &mut TickOutput,
) {
    let FactoryState {
        graph,
        step_inventories,
        step_runtime,
        sensor_counters,
        rng,
        ..
    } = state;
    let (Some(step), Some(inv), Some(rt)) = (
        graph.step(id),
        step_inventories.get_mut(id),
        step_runtime.get_mut(id),
    ) else {
        return;
    };
    let sensors = graph.sensors_of(Holder::Step(id));

    if rt.batch.as_ref().is_some_and(|b| tick >= b.finish_tick) {
        finalize(id, step, inv, rt, sensors, sensor_counters, tick, out);
    }
    if rt.batch.is_some() {
        return;
    }

    let started = match step.recipe {
        Some(recipe_id) => match registry.recipe(recipe_id) {
            Some(recipe) => start_recipe(id, step, recipe, inv, rt, rng, active, tick, out),
            None => false,
        },
        None => start_hold(id, step, inv, rt, tick, out),
    };
    if started && rt.batch.as_ref().is_some_and(|b| b.finish_tick <= tick) {
        finalize(id, step, inv, rt, sensors, sensor_counters, tick, out);
    }
}

#[allow(clippy::too_many_arguments)]
fn start_recipe(
    id: StepId,
    step: &ProcessStep,
    recipe: &Recipe,
    inv: &mut Inventory,
    rt: &mut StepRuntime,
    rng: &mut SimRng,
    active: &BTreeSet<OrderId>,
    tick: Ticks,
    out: &mut TickOutput,
) -> bool {
    let max_runs = rt.multipliers.recipe_runs(step.params.recipe_rate);
    let consumed = recipe.consumed_per_run() as u64;
    let produced = recipe.produced_per_run() as u64;
    let limit = inv.limit() as u64;

    let mut runs = 0u32;
    let mut outputs = Vec::new();
    while runs < max_runs {
        // Outputs of every run so far plus this one must fit once inputs are gone.
        let projected = (inv.len() as u64).saturating_sub(consumed) + produced * (runs as u64 + 1);
        if projected > limit {
            trace!(step = %step.name, runs, "recipe blocked by capacity");
            break;
        }
        let Some((order, picks)) = select_run(inv, recipe, active) else {
            break;
        };
        if !rng.trial(step.params.error_rate) {
            debug!(step = %step.name, order = order.0, tick, "recipe run failed");
            out.events.push(Event::ProductionFailed { step: id, order, tick });
            break;
        }
        let taken = inv.remove_indices(&picks);
        let oldest = taken.iter().map(|e| e.arrived_tick).min().unwrap_or(tick);
        out.step_durations
            .entry(step.name.clone())
            .or_default()
            .push(elapsed(tick, oldest));
        for output in &recipe.outputs {
            for _ in 0..output.quantity {
                outputs.push((output.material, order));
            }
        }
        runs += 1;
    }

    if runs == 0 {
        return false;
    }
    let finish_tick = tick.saturating_add(step.params.duration);
    debug!(step = %step.name, runs, finish_tick, "recipe batch started");
    out.events.push(Event::BatchStarted {
        step: id,
        units: runs,
        finish_tick,
        tick,
    });
    rt.batch = Some(Batch {
        started_tick: tick,
        finish_tick,
        work: BatchWork::Recipe { runs, outputs },
    });
    true
}

/// Inputs for one run.
///
/// Each recipe input takes the earliest queued entries of its material
/// tagged to any active order, so one run may draw on several orders. The
/// run's outputs are tagged to the order of the earliest-arrived entry it
/// consumes.
pub(crate) fn select_run(
    inv: &Inventory,
    recipe: &Recipe,
    active: &BTreeSet<OrderId>,
) -> Option<(OrderId, Vec<usize>)> {
    let entries = inv.entries();
    let mut queued: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.stage == Stage::Queued && e.is_for(active))
        .map(|(i, _)| i)
        .collect();
    queued.sort_by_key(|&i| entries[i].arrived_tick);

    let mut picks: Vec<usize> = Vec::new();
    for input in &recipe.inputs {
        let matching: Vec<usize> = queued
            .iter()
            .copied()
            .filter(|&j| entries[j].material == input.material && !picks.contains(&j))
            .take(input.quantity as usize)
            .collect();
        if matching.len() as u32 != input.quantity {
            return None;
        }
        picks.extend(matching);
    }
    // Stable sort keeps queue position as the tie-break between equal arrivals.
    let first = queued.iter().find(|i| picks.contains(i))?;
    let order = entries[*first].order?;
    Some((order, picks))
}

fn start_hold(
    id: StepId,
    step: &ProcessStep,
    inv: &mut Inventory,
    rt: &mut StepRuntime,
    tick: Ticks,
    out: &mut TickOutput,
) -> bool {
    if rt.multipliers.production == Fixed64::ZERO {
        return false;
    }
    let mut held = 0;
    for e in inv.entries_mut().iter_mut().filter(|e| e.stage == Stage::Queued) {
        e.stage = Stage::Holding;
        held += 1;
    }
    if held == 0 {
        return false;
    }
    let finish_tick = tick.saturating_add(step.params.duration);
    debug!(step = %step.name, held, finish_tick, "hold batch started");
    out.events.push(Event::BatchStarted {
        step: id,
        units: held,
        finish_tick,
        tick,
    });
    rt.batch = Some(Batch {
        started_tick: tick,
        finish_tick,
        work: BatchWork::Hold { held },
    });
    true
}

#[allow(clippy::too_many_arguments)]
fn finalize(
    id: StepId,
    step: &ProcessStep,
    inv: &mut Inventory,
    rt: &mut StepRuntime,
    sensors: &[SensorId],
    counters: &mut SecondaryMap<SensorId, u64>,
    tick: Ticks,
    out: &mut TickOutput,
) {
    let Some(batch) = rt.batch.take() else {
        return;
    };
    let holder = Holder::Step(id);
    let released = match batch.work {
        BatchWork::Recipe { outputs, .. } => {
            let mut logger = SensorLogger {
                counters,
                log: &mut out.sensor_log,
                tick,
            };
            let released = outputs.len() as u32;
            for (material, order) in outputs {
                let entry = InventoryEntry::new(material, holder, tick)
                    .with_order(order)
                    .with_stage(Stage::Ready);
                logger.scan(sensors, holder, ScanDirection::Product, &entry);
                place(inv, &mut rt.overflow, entry, tick, &mut out.events);
            }
            released
        }
        BatchWork::Hold { .. } => {
            let held_for = batch.finish_tick.saturating_sub(batch.started_tick);
            let mut released = 0;
            for e in inv.entries_mut().iter_mut().filter(|e| e.stage == Stage::Holding) {
                e.stage = Stage::Ready;
                released += 1;
            }
            out.step_durations
                .entry(step.name.clone())
                .or_default()
                .extend(std::iter::repeat_n(held_for, released as usize));
            released
        }
    };
    debug!(step = %step.name, released, tick, "batch finished");
    out.events.push(Event::BatchFinished {
        step: id,
        released,
        tick,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RecipeEntry;

    fn step_id() -> StepId {
        let mut g = crate::graph::FactoryGraph::new();
        g.add_step(crate::graph::ProcessStep::new("s", crate::graph::StepParams::new(1)))
            .unwrap()
    }

    fn recipe() -> Recipe {
        Recipe {
            name: "Assemble".into(),
            inputs: vec![RecipeEntry::new(MaterialId(0), 2), RecipeEntry::new(MaterialId(1), 1)],
            outputs: vec![RecipeEntry::new(MaterialId(2), 1)],
        }
    }

    fn push(inv: &mut Inventory, material: u32, order: u32, arrived: Ticks) {
        let mut e = InventoryEntry::new(MaterialId(material), Holder::Step(step_id()), arrived)
            .with_order(OrderId(order));
        e.arrived_tick = arrived;
        inv.try_push(e).unwrap();
    }

    fn active(ids: &[u32]) -> BTreeSet<OrderId> {
        ids.iter().map(|&i| OrderId(i)).collect()
    }

    #[test]
    fn takes_earliest_inputs_across_orders() {
        let mut inv = Inventory::new(10);
        push(&mut inv, 0, 2, 3);
        push(&mut inv, 0, 1, 0);
        push(&mut inv, 1, 2, 4);
        push(&mut inv, 0, 2, 1);
        push(&mut inv, 1, 1, 2);
        let (order, mut picks) = select_run(&inv, &recipe(), &active(&[1, 2])).unwrap();
        picks.sort();
        // Frames arrived at 0 and 1, the cushion at 2; the oldest input owns the output.
        assert_eq!(order, OrderId(1));
        assert_eq!(picks, vec![1, 3, 4]);
    }

    #[test]
    fn short_input_blocks_the_run() {
        let mut inv = Inventory::new(10);
        push(&mut inv, 0, 1, 0);
        push(&mut inv, 1, 2, 0);
        push(&mut inv, 1, 1, 1);
        assert!(select_run(&inv, &recipe(), &active(&[1, 2])).is_none());
    }

    #[test]
    fn untagged_entries_are_not_inputs() {
        let mut inv = Inventory::new(10);
        push(&mut inv, 0, 1, 0);
        push(&mut inv, 1, 1, 0);
        let mut e = InventoryEntry::new(MaterialId(0), Holder::Step(step_id()), 0);
        e.arrived_tick = 0;
        inv.try_push(e).unwrap();
        assert!(select_run(&inv, &recipe(), &active(&[1])).is_none());
    }

    #[test]
    fn inactive_orders_are_ignored() {
        let mut inv = Inventory::new(10);
        push(&mut inv, 0, 1, 0);
        push(&mut inv, 0, 1, 0);
        push(&mut inv, 1, 1, 0);
        assert!(select_run(&inv, &recipe(), &active(&[2])).is_none());
        assert!(select_run(&inv, &recipe(), &active(&[1])).is_some());
    }

    #[test]
    fn ready_entries_are_not_inputs() {
        let mut inv = Inventory::new(10);
        push(&mut inv, 0, 1, 0);
        push(&mut inv, 0, 1, 0);
        push(&mut inv, 1, 1, 0);
        inv.entries_mut()[2].stage = Stage::Ready;
        assert!(select_run(&inv, &recipe(), &active(&[1])).is_none());
    }

    #[test]
    fn batch_orders_and_remaining() {
        let batch = Batch {
            started_tick: 2,
            finish_tick: 5,
            work: BatchWork::Recipe {
                runs: 2,
                outputs: vec![(MaterialId(2), OrderId(1)), (MaterialId(2), OrderId(3))],
            },
        };
        assert_eq!(batch.orders().collect::<Vec<_>>(), vec![OrderId(1), OrderId(3)]);
        assert_eq!(batch.remaining(3), 2);
        assert_eq!(batch.remaining(9), 0);
        let hold = Batch {
            started_tick: 0,
            finish_tick: 1,
            work: BatchWork::Hold { held: 4 },
        };
        assert_eq!(hold.orders().count(), 0);
    }
}
