//! Commands that change a frame from outside the pipeline.
//!
//! A command edits the current frame in place: toggles, parameter updates
//! and order cancellation. The engine then drops every precomputed future
//! frame, since those were derived from the unedited state.

use crate::event::Event;
use crate::fixed::{Fixed64, Ticks};
use crate::id::*;
use crate::order::{self, Order};
use crate::state::FactoryState;
use serde::{Deserialize, Serialize};

/// Partial update of a step's parameters. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub input_speed: Option<u32>,
    pub output_speed: Option<u32>,
    pub recipe_rate: Option<Fixed64>,
    pub duration: Option<Ticks>,
    pub error_rate: Option<Fixed64>,
    pub limit: Option<u32>,
}

/// Partial update of a link's parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkUpdate {
    pub input_speed: Option<u32>,
    pub output_speed: Option<u32>,
    pub min_quantity: Option<u32>,
    pub transport_delay: Option<Ticks>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    ToggleStep(StepId),
    ToggleLink(LinkId),
    ToggleResource(ResourceId),
    SetResourceFaulty { resource: ResourceId, faulty: bool },
    UpdateStep { step: StepId, update: StepUpdate },
    UpdateLink { link: LinkId, update: LinkUpdate },
    CancelOrder(OrderId),
}

impl Command {
    /// Apply to a frame's state and orders. Returns `false` when the target
    /// does not exist (or, for cancellation, is no longer active).
    pub(crate) fn apply(
        &self,
        state: &mut FactoryState,
        orders: &mut [Order],
        tick: Ticks,
        events: &mut Vec<Event>,
    ) -> bool {
        match self {
            Command::ToggleStep(id) => match state.graph.step_mut(*id) {
                Some(step) => {
                    step.active = !step.active;
                    true
                }
                None => false,
            },
            Command::ToggleLink(id) => match state.graph.link_mut(*id) {
                Some(link) => {
                    link.active = !link.active;
                    true
                }
                None => false,
            },
            Command::ToggleResource(id) => match state.graph.resource_mut(*id) {
                Some(r) => {
                    r.active = !r.active;
                    true
                }
                None => false,
            },
            Command::SetResourceFaulty { resource, faulty } => match state.graph.resource_mut(*resource) {
                Some(r) => {
                    r.faulty = *faulty;
                    true
                }
                None => false,
            },
            Command::UpdateStep { step, update } => update_step(state, *step, update),
            Command::UpdateLink { link, update } => update_link(state, *link, update),
            Command::CancelOrder(id) => match order::cancel(orders, *id, tick) {
                Some(event) => {
                    events.push(event);
                    true
                }
                None => false,
            },
        }
    }
}

fn update_step(state: &mut FactoryState, id: StepId, update: &StepUpdate) -> bool {
    let Some(step) = state.graph.step_mut(id) else {
        return false;
    };
    let p = &mut step.params;
    if let Some(v) = update.input_speed {
        p.input_speed = v;
    }
    if let Some(v) = update.output_speed {
        p.output_speed = v;
    }
    if let Some(v) = update.recipe_rate {
        p.recipe_rate = v;
    }
    if let Some(v) = update.duration {
        p.duration = v;
    }
    if let Some(v) = update.error_rate {
        p.error_rate = v.clamp(Fixed64::ZERO, Fixed64::ONE);
    }
    if let Some(limit) = update.limit {
        p.limit = limit;
        if let (Some(inv), Some(rt)) = (state.step_inventories.get_mut(id), state.step_runtime.get_mut(id)) {
            let evicted = inv.set_limit(limit);
            for entry in evicted.into_iter().rev() {
                rt.overflow.push_front(entry);
            }
        }
    }
    true
}

fn update_link(state: &mut FactoryState, id: LinkId, update: &LinkUpdate) -> bool {
    let Some(link) = state.graph.link_mut(id) else {
        return false;
    };
    let p = &mut link.params;
    if let Some(v) = update.input_speed {
        p.input_speed = v;
    }
    if let Some(v) = update.output_speed {
        p.output_speed = v;
    }
    if let Some(v) = update.min_quantity {
        p.min_quantity = v;
    }
    if let Some(v) = update.transport_delay {
        p.transport_delay = v;
    }
    if let Some(limit) = update.limit {
        p.limit = limit;
        if let (Some(inv), Some(rt)) = (state.link_inventories.get_mut(id), state.link_runtime.get_mut(id)) {
            let evicted = inv.set_limit(limit);
            for entry in evicted.into_iter().rev() {
                rt.overflow.push_front(entry);
            }
        }
    }
    true
}
