//! End-to-end scenarios on small factories.
//!
//! Each test builds a factory by hand, runs the engine for a few ticks and
//! checks where material is, which events fired and what was measured.

use flowline_core::command::{Command, LinkUpdate};
use flowline_core::engine::Engine;
use flowline_core::event::{CollectingNotifier, Event, EventKind, NotificationKind};
use flowline_core::graph::*;
use flowline_core::id::*;
use flowline_core::inventory::Stage;
use flowline_core::order::{Order, OrderStatus};
use flowline_core::registry::{RecipeEntry, RegistryBuilder};
use flowline_core::sim::EngineConfig;
use flowline_core::state::FactoryState;
use flowline_core::test_utils::*;
use std::cell::RefCell;
use std::rc::Rc;

fn has_event(engine: &Engine, tick: u64, kind: EventKind) -> bool {
    engine
        .frame_at(tick)
        .is_some_and(|f| f.events.iter().any(|e| e.kind() == kind))
}

// ===========================================================================
// Production timing
// ===========================================================================

#[test]
fn recipe_consumes_at_start_and_releases_after_duration() {
    let mut rb = RegistryBuilder::new();
    let a = rb.register_material("A");
    let b = rb.register_material("B");
    let c = rb.register_material("C");
    let recipe = rb
        .register_recipe(
            "Press",
            vec![RecipeEntry::new(a, 2), RecipeEntry::new(b, 1)],
            vec![RecipeEntry::new(c, 1)],
        )
        .unwrap();
    let registry = rb.build();

    let mut g = FactoryGraph::new();
    let press = g
        .add_step(
            ProcessStep::new("Press", StepParams::new(10).with_duration(2)).with_recipe(recipe),
        )
        .unwrap();
    let mut state = FactoryState::new(g);
    state.seed_step(press, a, 2, Some(OrderId(7))).unwrap();
    state.seed_step(press, b, 1, Some(OrderId(7))).unwrap();

    let orders = vec![Order::new(OrderId(7), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();

    let inv = engine.current_frame().state.step_inventory(press).unwrap();
    assert!(inv.is_empty(), "inputs are removed when the run starts");
    assert!(has_event(&engine, 0, EventKind::BatchStarted));

    engine.tick_forward();
    let inv = engine.current_frame().state.step_inventory(press).unwrap();
    assert_eq!(inv.count(c), 0);

    engine.tick_forward();
    let inv = engine.current_frame().state.step_inventory(press).unwrap();
    assert_eq!(inv.count(c), 1);
    let out = &inv.entries()[0];
    assert_eq!(out.order, Some(OrderId(7)));
    assert_eq!(out.stage, Stage::Ready);
    assert!(has_event(&engine, 2, EventKind::BatchFinished));
}

#[test]
fn inputs_from_different_orders_combine() {
    let mut rb = RegistryBuilder::new();
    let a = rb.register_material("A");
    let b = rb.register_material("B");
    let c = rb.register_material("C");
    let recipe = rb
        .register_recipe(
            "Press",
            vec![RecipeEntry::new(a, 2), RecipeEntry::new(b, 1)],
            vec![RecipeEntry::new(c, 1)],
        )
        .unwrap();
    let registry = rb.build();

    let mut g = FactoryGraph::new();
    let press = g
        .add_step(ProcessStep::new("Press", StepParams::new(10)).with_recipe(recipe))
        .unwrap();
    let mut state = FactoryState::new(g);
    state.seed_step(press, a, 2, Some(OrderId(1))).unwrap();
    state.seed_step(press, b, 1, Some(OrderId(2))).unwrap();

    let orders = vec![Order::new(OrderId(1), 1), Order::new(OrderId(2), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();
    engine.run_next(3);

    let inv = engine.current_frame().state.step_inventory(press).unwrap();
    assert_eq!(inv.count(c), 1);
    assert_eq!(inv.len(), 1);
    // Both inputs arrived together; the first queued one owns the output.
    assert_eq!(inv.entries()[0].order, Some(OrderId(1)));
}

#[test]
fn huge_duration_saturates_finish_tick() {
    let mut rb = RegistryBuilder::new();
    let a = rb.register_material("A");
    let b = rb.register_material("B");
    let c = rb.register_material("C");
    let recipe = rb
        .register_recipe(
            "Press",
            vec![RecipeEntry::new(a, 2), RecipeEntry::new(b, 1)],
            vec![RecipeEntry::new(c, 1)],
        )
        .unwrap();
    let registry = rb.build();

    let mut g = FactoryGraph::new();
    let press = g
        .add_step(
            ProcessStep::new("Press", StepParams::new(10).with_duration(u64::MAX))
                .with_recipe(recipe),
        )
        .unwrap();
    let hold = g
        .add_step(ProcessStep::new("Cure", StepParams::new(10).with_duration(u64::MAX)))
        .unwrap();
    let mut state = FactoryState::new(g);
    state.seed_step(press, a, 2, Some(OrderId(1))).unwrap();
    state.seed_step(press, b, 1, Some(OrderId(1))).unwrap();
    state.seed_step(hold, a, 1, Some(OrderId(1))).unwrap();

    let orders = vec![Order::new(OrderId(1), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();
    engine.run_next(2);

    let frame = engine.current_frame();
    let press_batch = frame.state.step_runtime(press).unwrap().batch.as_ref().unwrap();
    assert_eq!(press_batch.finish_tick, u64::MAX);
    let hold_batch = frame.state.step_runtime(hold).unwrap().batch.as_ref().unwrap();
    assert_eq!(hold_batch.finish_tick, u64::MAX);
    assert_eq!(frame.state.step_inventory(press).unwrap().count(c), 0);
}

// ===========================================================================
// Order completion
// ===========================================================================

#[test]
fn order_completes_when_shipping_holds_enough() {
    let mut rb = RegistryBuilder::new();
    let seat = rb.register_material("Complete Seat");
    let registry = rb.build();

    let mut g = FactoryGraph::new();
    let shipping = g
        .add_step(ProcessStep::new("Shipping", StepParams::new(10)))
        .unwrap();
    let mut state = FactoryState::new(g);
    state.seed_step(shipping, seat, 2, Some(OrderId(1))).unwrap();

    let orders = vec![Order::new(OrderId(1), 2), Order::new(OrderId(2), 3)];
    let engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();

    let frame = engine.current_frame();
    let done = frame.order(OrderId(1)).unwrap();
    assert_eq!(done.status, OrderStatus::Completed);
    assert_eq!(done.completed_tick, Some(0));
    assert_eq!(frame.order(OrderId(2)).unwrap().status, OrderStatus::Pending);
    assert!(!has_event(&engine, 0, EventKind::AllOrdersCompleted));
    assert!(!engine.is_finished());
}

#[test]
fn finished_goods_elsewhere_do_not_count() {
    let mut rb = RegistryBuilder::new();
    let seat = rb.register_material("Complete Seat");
    let registry = rb.build();

    let mut g = FactoryGraph::new();
    let dock = g.add_step(ProcessStep::new("Dock", StepParams::new(10))).unwrap();
    let mut state = FactoryState::new(g);
    state.seed_step(dock, seat, 5, Some(OrderId(1))).unwrap();

    let orders = vec![Order::new(OrderId(1), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();
    engine.run_next(3);
    assert!(engine.current_frame().order(OrderId(1)).unwrap().is_active());
}

// ===========================================================================
// Minimum batch gating
// ===========================================================================

#[test]
fn link_waits_for_minimum_batch_while_upstream_busy() {
    let (registry, a, _, _) = abc_registry();
    let (g, source, link, sink) = two_step_line(
        StepParams::new(10).with_speeds(5, 5),
        LinkParams::new(10).with_speeds(5, 5).with_min_quantity(3),
        StepParams::new(10).with_speeds(5, 5),
    );
    let mut state = FactoryState::new(g);
    state.seed_link(link, a, 2, Some(OrderId(1))).unwrap();
    state.seed_step(source, a, 1, Some(OrderId(1))).unwrap();

    let orders = vec![Order::new(OrderId(1), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();

    let frame = engine.current_frame();
    assert_eq!(frame.state.step_inventory(sink).unwrap().len(), 0);
    assert_eq!(frame.state.link_inventory(link).unwrap().len(), 2);

    engine.tick_forward();
    let frame = engine.current_frame();
    assert_eq!(frame.state.step_inventory(sink).unwrap().len(), 3);
    assert!(frame.state.link_inventory(link).unwrap().is_empty());
}

#[test]
fn link_drains_short_batch_when_upstream_is_idle() {
    let (registry, a, _, _) = abc_registry();
    let (g, _, link, sink) = two_step_line(
        StepParams::new(10),
        LinkParams::new(10).with_speeds(5, 5).with_min_quantity(3),
        StepParams::new(10).with_speeds(5, 5),
    );
    let mut state = FactoryState::new(g);
    state.seed_link(link, a, 2, Some(OrderId(1))).unwrap();

    let orders = vec![Order::new(OrderId(1), 1)];
    let engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();
    assert_eq!(engine.current_frame().state.step_inventory(sink).unwrap().len(), 2);
}

// ===========================================================================
// Transport
// ===========================================================================

#[test]
fn transport_delay_holds_items_on_the_link() {
    let (registry, a, _, _) = abc_registry();
    let (g, _, link, sink) = two_step_line(
        StepParams::new(10),
        LinkParams::new(10).with_speeds(5, 5).with_delay(3),
        StepParams::new(10).with_speeds(5, 5),
    );
    let mut state = FactoryState::new(g);
    state.seed_link(link, a, 2, Some(OrderId(1))).unwrap();
    let orders = vec![Order::new(OrderId(1), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();

    engine.run_next(2);
    assert_eq!(engine.current_frame().state.step_inventory(sink).unwrap().len(), 0);
    engine.tick_forward();
    let frame = engine.current_frame();
    assert_eq!(frame.state.step_inventory(sink).unwrap().len(), 2);
    assert_eq!(frame.transport_durations.get("belt"), Some(&vec![3, 3]));
}

#[test]
fn cancelled_order_material_stops_moving() {
    let (registry, a, _, _) = abc_registry();
    let (g, _, link, sink) = two_step_line(
        StepParams::new(10),
        LinkParams::new(10).with_speeds(5, 5).with_delay(2),
        StepParams::new(10).with_speeds(5, 5),
    );
    let mut state = FactoryState::new(g);
    state.seed_link(link, a, 2, Some(OrderId(1))).unwrap();
    let orders = vec![Order::new(OrderId(1), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();

    assert!(engine.apply(Command::CancelOrder(OrderId(1))));
    engine.run_next(5);
    let frame = engine.current_frame();
    assert_eq!(frame.state.link_inventory(link).unwrap().len(), 2);
    assert_eq!(frame.state.step_inventory(sink).unwrap().len(), 0);
    assert_eq!(frame.order(OrderId(1)).unwrap().status, OrderStatus::Cancelled);
}

#[test]
fn inactive_link_blocks_until_toggled() {
    let (registry, a, _, _) = abc_registry();
    let (mut g, _, link, sink) = two_step_line(
        StepParams::new(10),
        LinkParams::new(10).with_speeds(5, 5),
        StepParams::new(10).with_speeds(5, 5),
    );
    g.link_mut(link).unwrap().active = false;
    let mut state = FactoryState::new(g);
    state.seed_link(link, a, 1, Some(OrderId(1))).unwrap();
    let orders = vec![Order::new(OrderId(1), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();
    engine.run_next(2);
    assert_eq!(engine.current_frame().state.step_inventory(sink).unwrap().len(), 0);

    assert!(engine.apply(Command::ToggleLink(link)));
    engine.tick_forward();
    assert_eq!(engine.current_frame().state.step_inventory(sink).unwrap().len(), 1);
}

#[test]
fn link_update_raises_output_speed() {
    let (registry, a, _, _) = abc_registry();
    let (g, _, link, sink) = two_step_line(
        StepParams::new(10),
        LinkParams::new(10).with_speeds(5, 1),
        StepParams::new(10).with_speeds(5, 5),
    );
    let mut state = FactoryState::new(g);
    state.seed_link(link, a, 4, Some(OrderId(1))).unwrap();
    let orders = vec![Order::new(OrderId(1), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();
    assert_eq!(engine.current_frame().state.step_inventory(sink).unwrap().len(), 1);

    let update = LinkUpdate {
        output_speed: Some(3),
        ..Default::default()
    };
    assert!(engine.apply(Command::UpdateLink { link, update }));
    engine.tick_forward();
    assert_eq!(engine.current_frame().state.step_inventory(sink).unwrap().len(), 4);
}

#[test]
fn recipe_input_that_does_not_fit_waits_in_overflow() {
    let mut rb = RegistryBuilder::new();
    let a = rb.register_material("A");
    let b = rb.register_material("B");
    let c = rb.register_material("C");
    let recipe = rb
        .register_recipe(
            "Press",
            vec![RecipeEntry::new(a, 2), RecipeEntry::new(b, 1)],
            vec![RecipeEntry::new(c, 1)],
        )
        .unwrap();
    let registry = rb.build();

    let (mut g, _, link, press) = two_step_line(
        StepParams::new(10),
        LinkParams::new(10).with_speeds(3, 3),
        StepParams::new(3).with_speeds(3, 3),
    );
    g.step_mut(press).unwrap().recipe = Some(recipe);
    let mut state = FactoryState::new(g);
    state.seed_link(link, a, 3, Some(OrderId(1))).unwrap();
    state.seed_link(link, b, 1, Some(OrderId(1))).unwrap();
    let orders = vec![Order::new(OrderId(1), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();

    // A third A would leave no room for B, so it leaves the link for overflow.
    let frame = engine.current_frame();
    let inv = frame.state.step_inventory(press).unwrap();
    assert_eq!(inv.count(a), 2);
    assert_eq!(inv.len(), 2);
    let overflow = &frame.state.step_runtime(press).unwrap().overflow;
    assert_eq!(overflow.len(), 1);
    assert_eq!(overflow[0].material, a);
    assert_eq!(overflow[0].left_tick, Some(0));
    assert_eq!(overflow[0].holder, Holder::Step(press));
    let on_link = frame.state.link_inventory(link).unwrap();
    assert_eq!(on_link.len(), 1);
    assert_eq!(on_link.count(b), 1);
    assert_eq!(frame.transport_durations.get("belt"), Some(&vec![0, 0, 0]));

    // B still gets in; the waiting A is not flushed over it.
    engine.tick_forward();
    let frame = engine.current_frame();
    let inv = frame.state.step_inventory(press).unwrap();
    assert_eq!((inv.count(a), inv.count(b)), (2, 1));
    assert_eq!(frame.state.step_runtime(press).unwrap().overflow.len(), 1);

    // Once the run consumes its inputs the waiting A is admitted.
    engine.run_next(2);
    let frame = engine.current_frame();
    assert_eq!(frame.tick, 3);
    let inv = frame.state.step_inventory(press).unwrap();
    assert_eq!((inv.count(a), inv.count(c)), (1, 1));
    assert!(frame.state.step_runtime(press).unwrap().overflow.is_empty());
}

// ===========================================================================
// Resources
// ===========================================================================

#[test]
fn faulty_mandatory_resource_stops_a_step() {
    let (registry, a, _, _) = abc_registry();
    let (mut g, _, link, sink) = two_step_line(
        StepParams::new(10),
        LinkParams::new(10).with_speeds(5, 5).with_delay(1),
        StepParams::new(10).with_speeds(5, 5),
    );
    let operator = g
        .add_resource(Resource::new("Operator", sink, ResourceEffect::Inventory).mandatory())
        .unwrap();
    let mut state = FactoryState::new(g);
    state.seed_link(link, a, 2, Some(OrderId(1))).unwrap();
    let orders = vec![Order::new(OrderId(1), 1)];
    let mut engine = Engine::new(registry, state, orders, EngineConfig::default()).unwrap();
    assert!(engine.apply(Command::SetResourceFaulty {
        resource: operator,
        faulty: true,
    }));

    engine.run_next(3);
    assert_eq!(engine.current_frame().state.step_inventory(sink).unwrap().len(), 0);

    assert!(engine.apply(Command::SetResourceFaulty {
        resource: operator,
        faulty: false,
    }));
    engine.tick_forward();
    assert_eq!(engine.current_frame().state.step_inventory(sink).unwrap().len(), 2);
}

// ===========================================================================
// Seat line
// ===========================================================================

#[test]
fn seat_line_completes_order() {
    let line = seat_line();
    let counter = line.seat_counter;
    let mut engine = line.engine();
    for _ in 0..30 {
        if engine.is_finished() {
            break;
        }
        engine.tick_forward();
    }
    assert!(engine.is_finished());

    let frame = engine.current_frame();
    let order = frame.order(OrderId(1)).unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.started_tick, Some(1));
    assert_eq!(order.completed_tick, Some(8));
    assert_eq!(frame.tick, 8);
    assert!(frame
        .events
        .iter()
        .any(|e| matches!(e, Event::AllOrdersCompleted { tick: 8 })));
    assert_eq!(frame.state.sensor_count(counter), 2);
}

#[test]
fn seat_line_measures_durations() {
    let mut engine = seat_line().engine();
    engine.run_next(8);

    assert_eq!(engine.mean_step_duration("Assembly"), Some(fixed(3.0)));
    assert_eq!(engine.mean_step_duration("Warehouse"), Some(fixed(1.0)));
    assert_eq!(engine.mean_transport_duration("conveyor"), Some(fixed(1.0)));
    assert_eq!(engine.mean_transport_duration("cart"), Some(fixed(0.0)));
    assert_eq!(engine.mean_transport_duration("truck"), None);
}

#[test]
fn seat_line_notifies_host() {
    let line = seat_line();
    let collector = Rc::new(RefCell::new(CollectingNotifier::default()));
    let mut engine = Engine::with_notifier(
        line.registry,
        line.state,
        line.orders,
        EngineConfig::default(),
        Box::new(collector.clone()),
    )
    .unwrap();
    engine.run_next(8);

    let kinds: Vec<NotificationKind> = collector.borrow().received.iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::OrderReserved,
            NotificationKind::OrderStarted,
            NotificationKind::OrderCompleted,
            NotificationKind::SimulationStopped,
        ]
    );
}
