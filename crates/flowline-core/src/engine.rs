//! The simulation engine: owns the timeline and runs the tick pipeline.
//!
//! # Tick pipeline
//!
//! Every frame is computed from a clone of the previous frame's state and
//! orders. [`advance`] runs, in order:
//!
//! 1. **Multipliers** -- recompute resource multipliers for every holder.
//! 2. **Overflow** -- retry entries that found no room on earlier ticks;
//!    queued recipe inputs must also pass admission.
//! 3. **Reservation** -- tag unowned stock to unreserved orders.
//! 4. **Production** -- finish due batches, start new ones.
//! 5. **Distribution** -- move ready items from steps onto output links.
//! 6. **Intake** -- move eligible items from links into steps.
//! 7. **Lifecycle** -- start orders whose material moved, complete orders
//!    with enough finished goods at shipping, refresh associations.
//!
//! The state hash is computed last. Nothing in the pipeline reads global
//! state: the same input frame always yields the same output frame.

use crate::command::Command;
use crate::event::{Event, Notification, Notifier, NullNotifier};
use crate::fixed::Ticks;
use crate::id::*;
use crate::inventory::{Inventory, InventoryEntry, Stage};
use crate::order::{self, Order};
use crate::registry::{Recipe, Registry};
use crate::resource::Multipliers;
use crate::rng::SimRng;
use crate::sensor::LogEntry;
use crate::sim::EngineConfig;
use crate::state::FactoryState;
use crate::timeline::{Frame, Timeline, frame_hash};
use crate::{distributor, intake, production};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from assembling an engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("duplicate order id {0:?}")]
    DuplicateOrder(OrderId),
    #[error("inventory references unknown order {0:?}")]
    UnknownOrder(OrderId),
}

// ---------------------------------------------------------------------------
// Tick pipeline
// ---------------------------------------------------------------------------

/// Everything a tick records besides the new state.
#[derive(Debug, Default)]
pub(crate) struct TickOutput {
    pub events: Vec<Event>,
    pub step_durations: BTreeMap<String, Vec<Ticks>>,
    pub transport_durations: BTreeMap<String, Vec<Ticks>>,
    pub sensor_log: Vec<LogEntry>,
    /// Orders with at least one item moved between holders.
    pub moved: BTreeSet<OrderId>,
}

/// Session rules resolved from [`EngineConfig`] against the registry.
#[derive(Debug, Clone)]
pub(crate) struct CompletionRule {
    pub finished_good: Option<MaterialId>,
    pub shipping_step: String,
}

impl CompletionRule {
    pub fn resolve(config: &EngineConfig, registry: &Registry) -> Self {
        let finished_good = registry.material_id(&config.finished_good);
        if finished_good.is_none() {
            warn!(material = %config.finished_good, "finished good not registered; orders cannot complete");
        }
        Self {
            finished_good,
            shipping_step: config.shipping_step.clone(),
        }
    }
}

/// Store `entry` in `inv`, or queue it on `overflow` when there is no room.
pub(crate) fn place(
    inv: &mut Inventory,
    overflow: &mut VecDeque<InventoryEntry>,
    entry: InventoryEntry,
    tick: Ticks,
    events: &mut Vec<Event>,
) {
    let holder = entry.holder;
    match inv.try_push(entry) {
        Ok(Some(_)) => {}
        Ok(None) => {
            warn!(?holder, tick, "no free slot, entry stored without one");
            events.push(Event::SlotExhausted { holder, tick });
        }
        Err(entry) => {
            debug!(?holder, tick, "holder full, entry queued on overflow");
            overflow.push_back(entry);
        }
    }
}

fn refresh_multipliers(state: &mut FactoryState) {
    let FactoryState {
        graph,
        step_runtime,
        link_runtime,
        ..
    } = state;
    for (id, rt) in step_runtime.iter_mut() {
        rt.multipliers = Multipliers::compute(graph.resources_of(Holder::Step(id)));
    }
    for (id, rt) in link_runtime.iter_mut() {
        rt.multipliers = Multipliers::compute(graph.resources_of(Holder::Link(id)));
    }
}

fn flush_overflow(state: &mut FactoryState, registry: &Registry, tick: Ticks, events: &mut Vec<Event>) {
    let FactoryState {
        graph,
        step_inventories,
        link_inventories,
        step_runtime,
        link_runtime,
        ..
    } = state;
    for (id, rt) in step_runtime.iter_mut() {
        let recipe = graph
            .step(id)
            .and_then(|s| s.recipe)
            .and_then(|r| registry.recipe(r));
        if let Some(inv) = step_inventories.get_mut(id) {
            drain_step(inv, &mut rt.overflow, recipe, tick, events);
        }
    }
    for (id, rt) in link_runtime.iter_mut() {
        if let Some(inv) = link_inventories.get_mut(id) {
            drain(inv, &mut rt.overflow, tick, events);
        }
    }
}

fn drain(inv: &mut Inventory, overflow: &mut VecDeque<InventoryEntry>, tick: Ticks, events: &mut Vec<Event>) {
    while !inv.is_full() {
        let Some(entry) = overflow.pop_front() else {
            break;
        };
        place(inv, overflow, entry, tick, events);
    }
}

/// Like [`drain`], but queued inputs must also pass the recipe admission
/// test. Entries that fail keep their place in the queue.
fn drain_step(
    inv: &mut Inventory,
    overflow: &mut VecDeque<InventoryEntry>,
    recipe: Option<&Recipe>,
    tick: Ticks,
    events: &mut Vec<Event>,
) {
    let mut waiting = std::mem::take(overflow);
    while let Some(entry) = waiting.pop_front() {
        if inv.is_full() {
            overflow.push_back(entry);
            overflow.append(&mut waiting);
            break;
        }
        let fits = entry.stage != Stage::Queued
            || intake::admits(
                recipe,
                inv.limit(),
                inv.len(),
                &inv.counts_in(Stage::Queued),
                entry.material,
            );
        if fits {
            place(inv, overflow, entry, tick, events);
        } else {
            overflow.push_back(entry);
        }
    }
}

/// Run one tick in place.
pub(crate) fn advance(
    state: &mut FactoryState,
    orders: &mut [Order],
    registry: &Registry,
    rule: &CompletionRule,
    tick: Ticks,
) -> TickOutput {
    let mut out = TickOutput::default();

    refresh_multipliers(state);
    flush_overflow(state, registry, tick, &mut out.events);
    order::reserve(state, orders, tick, &mut out.events);

    let active = order::active_orders(orders);
    production::run(state, registry, &active, tick, &mut out);
    distributor::run(state, &active, tick, &mut out);
    intake::run(state, registry, &active, tick, &mut out);

    order::mark_started(orders, &out.moved, tick, &mut out.events);
    let completed = order::check_completion(
        state,
        orders,
        rule.finished_good,
        &rule.shipping_step,
        tick,
        &mut out.events,
    );
    order::refresh_associations(state);

    if completed > 0 && order::all_settled(orders) {
        info!(tick, "all orders completed");
        out.events.push(Event::AllOrdersCompleted { tick });
    }
    out
}

/// Compute the frame for `tick` from a previous state and order list.
pub(crate) fn compute_frame(
    state: &FactoryState,
    orders: &[Order],
    registry: &Registry,
    rule: &CompletionRule,
    tick: Ticks,
) -> Frame {
    let mut state = state.clone();
    let mut orders = orders.to_vec();
    let out = advance(&mut state, &mut orders, registry, rule, tick);
    let state_hash = frame_hash(tick, &state, &orders);
    debug!(tick, events = out.events.len(), hash = state_hash, "frame computed");
    Frame {
        tick,
        state,
        orders,
        transport_durations: out.transport_durations,
        step_durations: out.step_durations,
        events: out.events,
        sensor_log: out.sensor_log,
        state_hash,
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns a simulation session: the registry, the authored initial state and
/// the timeline of computed frames.
pub struct Engine {
    registry: Registry,
    config: EngineConfig,
    rule: CompletionRule,
    initial_state: FactoryState,
    initial_orders: Vec<Order>,
    timeline: Timeline,
    notifier: Box<dyn Notifier>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("current_tick", &self.current_tick())
            .field("frames", &self.timeline.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine and compute frame 0.
    pub fn new(
        registry: Registry,
        state: FactoryState,
        orders: Vec<Order>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        Self::with_notifier(registry, state, orders, config, Box::new(NullNotifier))
    }

    pub fn with_notifier(
        registry: Registry,
        mut state: FactoryState,
        orders: Vec<Order>,
        config: EngineConfig,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self, EngineError> {
        let mut known = BTreeSet::new();
        for o in &orders {
            if !known.insert(o.id) {
                return Err(EngineError::DuplicateOrder(o.id));
            }
        }
        if let Some(unknown) = state
            .all_entries()
            .filter_map(|e| e.order)
            .find(|id| !known.contains(id))
        {
            return Err(EngineError::UnknownOrder(unknown));
        }

        state.rng = SimRng::new(config.seed);
        let rule = CompletionRule::resolve(&config, &registry);
        let first = compute_frame(&state, &orders, &registry, &rule, 0);
        info!(
            steps = state.graph.step_count(),
            links = state.graph.link_count(),
            orders = orders.len(),
            seed = config.seed,
            "engine created"
        );
        let mut engine = Self {
            registry,
            config,
            rule,
            initial_state: state,
            initial_orders: orders,
            timeline: Timeline::new(first),
            notifier,
        };
        engine.notify_current();
        Ok(engine)
    }

    fn notify_current(&mut self) {
        for event in &self.timeline.current().events {
            if let Some(n) = Notification::from_event(event) {
                self.notifier.notify(&n);
            }
        }
    }

    fn compute_after(&self, frame: &Frame) -> Frame {
        compute_frame(&frame.state, &frame.orders, &self.registry, &self.rule, frame.tick + 1)
    }

    // -----------------------------------------------------------------------
    // Time travel
    // -----------------------------------------------------------------------

    /// Move to the next tick, adopting a precomputed frame if one exists.
    pub fn tick_forward(&mut self) -> &Frame {
        if !self.timeline.advance_cursor() {
            let next = self.compute_after(self.timeline.current());
            self.timeline.push(next);
            self.timeline.advance_cursor();
        }
        self.notify_current();
        self.timeline.current()
    }

    /// Tick forward `n` times.
    pub fn run_next(&mut self, n: u64) -> &Frame {
        for _ in 0..n {
            self.tick_forward();
        }
        self.timeline.current()
    }

    /// Compute `n` frames beyond the latest without moving the cursor.
    pub fn precompute(&mut self, n: u64) {
        for _ in 0..n {
            let next = self.compute_after(self.timeline.latest());
            self.timeline.push(next);
        }
        debug!(latest = self.timeline.latest_tick(), "frames precomputed");
    }

    /// Make the frame for `tick` current.
    ///
    /// Rewinding to a held frame drops every frame after it. A tick past
    /// the latest frame is reached by ticking forward.
    pub fn jump_to_tick(&mut self, tick: Ticks) -> &Frame {
        if tick < self.timeline.earliest_tick() {
            self.reset();
        }
        if self.timeline.seek(tick) {
            self.discard_future_frames();
        } else {
            while self.timeline.current_tick() < tick {
                self.tick_forward();
            }
        }
        info!(tick, "jumped");
        self.timeline.current()
    }

    /// Drop every frame and recompute frame 0 from the authored state.
    pub fn reset(&mut self) {
        let first = compute_frame(
            &self.initial_state,
            &self.initial_orders,
            &self.registry,
            &self.rule,
            0,
        );
        self.timeline = Timeline::new(first);
        info!("timeline reset");
        self.notify_current();
    }

    /// Drop precomputed frames after the current one.
    pub fn discard_future_frames(&mut self) -> usize {
        let dropped = self.timeline.truncate_future();
        if dropped > 0 {
            debug!(dropped, "future frames discarded");
        }
        dropped
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Apply a command to the current frame and discard its futures.
    /// Returns `false`, changing nothing, when the target does not exist.
    ///
    /// The current frame is rewritten in place: its state, orders and events
    /// take the command's effect and its hash is recomputed. Its recorded
    /// history therefore no longer matches what the pipeline computed for
    /// that tick, and replaying from an earlier frame will not reproduce it.
    pub fn apply(&mut self, command: Command) -> bool {
        let frame = self.timeline.current_mut();
        let tick = frame.tick;
        if !command.apply(&mut frame.state, &mut frame.orders, tick, &mut frame.events) {
            debug!(?command, "command target not found");
            return false;
        }
        frame.rehash();
        info!(?command, tick, "command applied");
        self.discard_future_frames();
        true
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn current_frame(&self) -> &Frame {
        self.timeline.current()
    }

    pub fn current_tick(&self) -> Ticks {
        self.timeline.current_tick()
    }

    pub fn frame_at(&self, tick: Ticks) -> Option<&Frame> {
        self.timeline.frame_at(tick)
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn initial_state(&self) -> &FactoryState {
        &self.initial_state
    }

    /// True once the current frame has no active order left.
    pub fn is_finished(&self) -> bool {
        self.current_frame().all_orders_settled()
    }
}
