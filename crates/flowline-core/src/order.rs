//! Order ledger: reservation, lifecycle transitions and completion.
//!
//! An order moves `Pending -> InProgress -> Completed`, or to `Cancelled`
//! by command. Pending and in-progress orders are *active*; only material
//! tagged to an active order moves through the factory.

use crate::event::Event;
use crate::fixed::Ticks;
use crate::id::*;
use crate::registry::RecipeEntry;
use crate::state::FactoryState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub(crate) fn code(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::InProgress => 1,
            OrderStatus::Completed => 2,
            OrderStatus::Cancelled => 3,
        }
    }
}

/// A customer order for `quantity` units of the finished good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub quantity: u32,
    /// Raw material needed per unit ordered.
    pub requirements: Vec<RecipeEntry>,
    pub status: OrderStatus,
    pub reserved: bool,
    pub started_tick: Option<Ticks>,
    pub completed_tick: Option<Ticks>,
}

impl Order {
    pub fn new(id: OrderId, quantity: u32) -> Self {
        Self {
            id,
            quantity,
            requirements: Vec::new(),
            status: OrderStatus::Pending,
            reserved: false,
            started_tick: None,
            completed_tick: None,
        }
    }

    pub fn with_requirement(mut self, material: MaterialId, per_unit: u32) -> Self {
        self.requirements.push(RecipeEntry::new(material, per_unit));
        self
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::InProgress)
    }

    /// Total units of each material needed for the whole order.
    pub fn total_requirements(&self) -> BTreeMap<MaterialId, u32> {
        let mut totals = BTreeMap::new();
        for r in &self.requirements {
            *totals.entry(r.material).or_insert(0) += r.quantity.saturating_mul(self.quantity);
        }
        totals
    }
}

/// IDs of active orders.
pub fn active_orders(orders: &[Order]) -> BTreeSet<OrderId> {
    orders.iter().filter(|o| o.is_active()).map(|o| o.id).collect()
}

/// True once every order has left the active set.
pub fn all_settled(orders: &[Order]) -> bool {
    orders.iter().all(|o| !o.is_active())
}

// ---------------------------------------------------------------------------
// Reservation
// ---------------------------------------------------------------------------

/// Tag unowned step inventory to unreserved active orders.
///
/// Orders are served in list order. An order is reserved only when every
/// required unit is found; otherwise nothing is tagged and it retries next
/// tick.
pub(crate) fn reserve(state: &mut FactoryState, orders: &mut [Order], tick: Ticks, events: &mut Vec<Event>) {
    for order in orders.iter_mut().filter(|o| o.is_active() && !o.reserved) {
        let mut picks: Vec<(StepId, usize)> = Vec::new();
        let mut satisfied = true;
        for (material, needed) in order.total_requirements() {
            let found = unowned(state, material, needed, &picks);
            if (found.len() as u32) < needed {
                satisfied = false;
                debug!(order = order.id.0, material = material.0, needed, found = found.len(), "reservation short");
                break;
            }
            picks.extend(found);
        }
        if !satisfied {
            continue;
        }
        for &(step, index) in &picks {
            if let Some(entry) = state
                .step_inventories
                .get_mut(step)
                .and_then(|inv| inv.entries_mut().get_mut(index))
            {
                entry.order = Some(order.id);
            }
        }
        order.reserved = true;
        info!(order = order.id.0, units = picks.len(), tick, "order reserved");
        events.push(Event::OrderReserved { order: order.id, tick });
    }
}

/// Up to `needed` untagged entries of `material`, walking steps in arena
/// order and skipping already picked ones.
fn unowned(
    state: &FactoryState,
    material: MaterialId,
    needed: u32,
    taken: &[(StepId, usize)],
) -> Vec<(StepId, usize)> {
    let mut found = Vec::new();
    if needed == 0 {
        return found;
    }
    for (step, _) in state.graph.steps() {
        let Some(inv) = state.step_inventories.get(step) else {
            continue;
        };
        for (i, e) in inv.entries().iter().enumerate() {
            if e.material == material && e.order.is_none() && !taken.contains(&(step, i)) {
                found.push((step, i));
                if found.len() as u32 == needed {
                    return found;
                }
            }
        }
    }
    found
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Pending orders whose material moved this tick become in progress.
pub(crate) fn mark_started(orders: &mut [Order], moved: &BTreeSet<OrderId>, tick: Ticks, events: &mut Vec<Event>) {
    for order in orders
        .iter_mut()
        .filter(|o| o.status == OrderStatus::Pending && moved.contains(&o.id))
    {
        order.status = OrderStatus::InProgress;
        order.started_tick = Some(tick);
        info!(order = order.id.0, tick, "order started");
        events.push(Event::OrderStarted { order: order.id, tick });
    }
}

/// Complete active orders with enough finished goods at a shipping step.
/// Returns how many orders completed.
pub(crate) fn check_completion(
    state: &FactoryState,
    orders: &mut [Order],
    finished_good: Option<MaterialId>,
    shipping_step: &str,
    tick: Ticks,
    events: &mut Vec<Event>,
) -> usize {
    let Some(finished_good) = finished_good else {
        return 0;
    };
    let mut shipped: BTreeMap<OrderId, u32> = BTreeMap::new();
    for (step, data) in state.graph.steps() {
        if data.name != shipping_step {
            continue;
        }
        let Some(inv) = state.step_inventories.get(step) else {
            continue;
        };
        for e in inv.entries().iter().filter(|e| e.material == finished_good) {
            if let Some(order) = e.order {
                *shipped.entry(order).or_insert(0) += 1;
            }
        }
    }

    let mut completed = 0;
    for order in orders.iter_mut().filter(|o| o.is_active()) {
        let count = shipped.get(&order.id).copied().unwrap_or(0);
        if count >= order.quantity {
            order.status = OrderStatus::Completed;
            order.completed_tick = Some(tick);
            completed += 1;
            info!(order = order.id.0, shipped = count, tick, "order completed");
            events.push(Event::OrderCompleted { order: order.id, tick });
        }
    }
    completed
}

/// Cancel an active order. Its material stays where it is but stops moving.
pub(crate) fn cancel(orders: &mut [Order], id: OrderId, tick: Ticks) -> Option<Event> {
    let order = orders.iter_mut().find(|o| o.id == id && o.is_active())?;
    order.status = OrderStatus::Cancelled;
    info!(order = id.0, tick, "order cancelled");
    Some(Event::OrderCancelled { order: id, tick })
}

/// Rebuild each holder's set of associated orders from what it holds.
pub(crate) fn refresh_associations(state: &mut FactoryState) {
    for (step, rt) in state.step_runtime.iter_mut() {
        let mut orders = state
            .step_inventories
            .get(step)
            .map(|inv| inv.orders())
            .unwrap_or_default();
        orders.extend(rt.overflow.iter().filter_map(|e| e.order));
        if let Some(batch) = &rt.batch {
            orders.extend(batch.orders());
        }
        rt.orders = orders;
    }
    for (link, rt) in state.link_runtime.iter_mut() {
        let mut orders = state
            .link_inventories
            .get(link)
            .map(|inv| inv.orders())
            .unwrap_or_default();
        orders.extend(rt.overflow.iter().filter_map(|e| e.order));
        rt.orders = orders;
    }
}
