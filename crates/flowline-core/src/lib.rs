//! Flowline Core -- a deterministic, tick-based production-flow simulator.
//!
//! A factory is a graph of process steps joined by transport links. Raw
//! material sits in step inventories, gets reserved by customer orders,
//! moves along links, is transformed by recipes and finally ships. Every
//! tick produces an immutable [`timeline::Frame`], so the whole run can be
//! rewound, replayed and exported.
//!
//! # Tick Pipeline
//!
//! [`engine::Engine::tick_forward`] computes the next frame from a clone of
//! the current one:
//!
//! 1. **Multipliers** -- resources scale each holder's rates.
//! 2. **Overflow** -- entries that found no room earlier are retried.
//! 3. **Reservation** -- unowned stock is tagged to waiting orders.
//! 4. **Production** -- batches finish and start at process steps.
//! 5. **Distribution** -- ready items leave steps onto output links.
//! 6. **Intake** -- eligible items leave links into their destination.
//! 7. **Lifecycle** -- orders start, complete, and associations refresh.
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- session owner and time-travel API.
//! - [`graph::FactoryGraph`] -- arenas of steps, links, resources, sensors.
//! - [`state::FactoryState`] -- graph plus inventories and runtime tables.
//! - [`inventory::Inventory`] -- per-item, slot-numbered storage.
//! - [`order::Order`] -- customer orders and their lifecycle.
//! - [`command::Command`] -- toggles, parameter updates, cancellation.
//! - [`serialize::SimulationRun`] -- JSON / bitcode export of a run.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.

pub mod command;
pub mod distributor;
pub mod engine;
pub mod event;
pub mod fixed;
pub mod graph;
pub mod id;
pub mod intake;
pub mod inventory;
pub mod order;
pub mod production;
pub mod query;
pub mod registry;
pub mod resource;
pub mod rng;
pub mod sensor;
pub mod serialize;
pub mod sim;
pub mod slot;
pub mod state;
pub mod timeline;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
