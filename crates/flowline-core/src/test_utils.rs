//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::engine::Engine;
use crate::fixed::Fixed64;
use crate::graph::*;
use crate::id::*;
use crate::order::Order;
use crate::registry::{RecipeEntry, Registry, RegistryBuilder};
use crate::sim::EngineConfig;
use crate::state::FactoryState;

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Seat line
// ===========================================================================

/// Warehouse -> conveyor -> Assembly -> cart -> Shipping.
///
/// Assembly turns 2 Frame + 1 Cushion into 1 Complete Seat. The warehouse
/// starts with 4 Frame and 2 Cushion, enough for order 1 (2 seats).
pub struct SeatLine {
    pub registry: Registry,
    pub state: FactoryState,
    pub orders: Vec<Order>,
    pub warehouse: StepId,
    pub assembly: StepId,
    pub shipping: StepId,
    pub conveyor: LinkId,
    pub cart: LinkId,
    pub seat_counter: SensorId,
    pub frame: MaterialId,
    pub cushion: MaterialId,
    pub seat: MaterialId,
}

pub fn seat_line() -> SeatLine {
    let mut rb = RegistryBuilder::new();
    let frame = rb.register_material("Frame");
    let cushion = rb.register_material("Cushion");
    let seat = rb.register_material("Complete Seat");
    let assemble = rb
        .register_recipe(
            "Assemble Seat",
            vec![RecipeEntry::new(frame, 2), RecipeEntry::new(cushion, 1)],
            vec![RecipeEntry::new(seat, 1)],
        )
        .unwrap();
    let registry = rb.build();

    let mut g = FactoryGraph::new();
    let plant = g.add_location("Plant");
    let warehouse = g
        .add_step(ProcessStep::new("Warehouse", StepParams::new(20).with_speeds(4, 4)).at(plant))
        .unwrap();
    let assembly = g
        .add_step(
            ProcessStep::new(
                "Assembly",
                StepParams::new(6).with_speeds(4, 2).with_duration(2),
            )
            .with_recipe(assemble)
            .at(plant),
        )
        .unwrap();
    let shipping = g
        .add_step(ProcessStep::new("Shipping", StepParams::new(10).with_speeds(4, 4)).at(plant))
        .unwrap();
    let conveyor = g
        .add_link(
            TransportLink::new(
                "Warehouse->Assembly",
                warehouse,
                assembly,
                LinkParams::new(10).with_speeds(4, 4).with_delay(1),
            )
            .with_kind("conveyor"),
        )
        .unwrap();
    let cart = g
        .add_link(
            TransportLink::new(
                "Assembly->Shipping",
                assembly,
                shipping,
                LinkParams::new(10).with_speeds(2, 2),
            )
            .with_kind("cart"),
        )
        .unwrap();
    let seat_counter = g.add_sensor(Sensor::new("Seat counter", assembly)).unwrap();

    let mut state = FactoryState::new(g);
    state.seed_step(warehouse, frame, 4, None).unwrap();
    state.seed_step(warehouse, cushion, 2, None).unwrap();

    let orders = vec![
        Order::new(OrderId(1), 2)
            .with_requirement(frame, 2)
            .with_requirement(cushion, 1),
    ];

    SeatLine {
        registry,
        state,
        orders,
        warehouse,
        assembly,
        shipping,
        conveyor,
        cart,
        seat_counter,
        frame,
        cushion,
        seat,
    }
}

impl SeatLine {
    pub fn engine(self) -> Engine {
        Engine::new(self.registry, self.state, self.orders, EngineConfig::default()).unwrap()
    }
}

// ===========================================================================
// Two-step line
// ===========================================================================

/// Source -> link -> Sink, no recipes. Returns the graph and its ids.
pub fn two_step_line(
    source: StepParams,
    link: LinkParams,
    sink: StepParams,
) -> (FactoryGraph, StepId, LinkId, StepId) {
    let mut g = FactoryGraph::new();
    let a = g.add_step(ProcessStep::new("Source", source)).unwrap();
    let b = g.add_step(ProcessStep::new("Sink", sink)).unwrap();
    let l = g
        .add_link(TransportLink::new("Source->Sink", a, b, link).with_kind("belt"))
        .unwrap();
    (g, a, l, b)
}

/// A registry with materials `A`, `B`, `C` and nothing else.
pub fn abc_registry() -> (Registry, MaterialId, MaterialId, MaterialId) {
    let mut rb = RegistryBuilder::new();
    let a = rb.register_material("A");
    let b = rb.register_material("B");
    let c = rb.register_material("C");
    (rb.build(), a, b, c)
}
