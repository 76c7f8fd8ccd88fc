//! Time travel, commands against the timeline, and export.

use flowline_core::command::{Command, StepUpdate};
use flowline_core::id::*;
use flowline_core::order::OrderStatus;
use flowline_core::sensor::ScanDirection;
use flowline_core::timeline::Frame;
use flowline_core::test_utils::*;

fn hashes(engine: &flowline_core::engine::Engine) -> Vec<u64> {
    engine.timeline().frames().iter().map(|f| f.state_hash).collect()
}

// ===========================================================================
// Navigation
// ===========================================================================

#[test]
fn frames_are_contiguous_from_zero() {
    let mut engine = seat_line().engine();
    engine.run_next(6);
    for (i, f) in engine.timeline().frames().iter().enumerate() {
        assert_eq!(f.tick, i as u64);
    }
    assert_eq!(engine.current_tick(), 6);
}

#[test]
fn precompute_keeps_cursor() {
    let mut engine = seat_line().engine();
    engine.precompute(5);
    assert_eq!(engine.current_tick(), 0);
    assert_eq!(engine.timeline().latest_tick(), 5);
    assert!(engine.timeline().has_next());

    let expected = engine.frame_at(3).unwrap().state_hash;
    engine.run_next(3);
    assert_eq!(engine.current_frame().state_hash, expected);
    assert_eq!(engine.timeline().latest_tick(), 5);
}

#[test]
fn jump_back_then_forward_reproduces_frames() {
    let mut engine = seat_line().engine();
    engine.run_next(8);
    let before = hashes(&engine);

    engine.jump_to_tick(3);
    assert_eq!(engine.current_tick(), 3);
    assert_eq!(engine.timeline().latest_tick(), 3);

    engine.jump_to_tick(8);
    assert_eq!(hashes(&engine), before);
}

#[test]
fn jump_to_current_tick_changes_nothing() {
    let mut engine = seat_line().engine();
    engine.run_next(4);
    let before = hashes(&engine);
    engine.jump_to_tick(4);
    assert_eq!(hashes(&engine), before);
}

#[test]
fn reset_replays_identically() {
    let mut engine = seat_line().engine();
    engine.run_next(8);
    let first = hashes(&engine);

    engine.reset();
    assert_eq!(engine.current_tick(), 0);
    assert_eq!(engine.timeline().len(), 1);
    engine.run_next(8);
    assert_eq!(hashes(&engine), first);
}

#[test]
fn discard_future_frames_counts_dropped() {
    let mut engine = seat_line().engine();
    engine.precompute(4);
    assert_eq!(engine.discard_future_frames(), 4);
    assert_eq!(engine.discard_future_frames(), 0);
}

// ===========================================================================
// Commands
// ===========================================================================

#[test]
fn command_discards_precomputed_frames() {
    let line = seat_line();
    let assembly = line.assembly;
    let mut engine = line.engine();
    engine.run_next(2);
    engine.precompute(5);

    let update = StepUpdate {
        duration: Some(4),
        ..Default::default()
    };
    assert!(engine.apply(Command::UpdateStep { step: assembly, update }));
    assert_eq!(engine.timeline().latest_tick(), 2);
    let step = engine.current_frame().state.graph().step(assembly).unwrap();
    assert_eq!(step.params.duration, 4);
}

#[test]
fn command_on_missing_target_is_rejected() {
    let mut engine = seat_line().engine();
    engine.precompute(3);
    let before = engine.current_frame().state_hash;
    assert!(!engine.apply(Command::CancelOrder(OrderId(99))));
    assert_eq!(engine.current_frame().state_hash, before);
    assert_eq!(engine.timeline().latest_tick(), 3);
}

#[test]
fn stopped_assembly_delays_completion() {
    let line = seat_line();
    let assembly = line.assembly;
    let mut engine = line.engine();
    engine.run_next(3);
    assert!(engine.apply(Command::ToggleStep(assembly)));
    engine.run_next(10);
    let order = engine.current_frame().order(OrderId(1)).unwrap();
    assert_eq!(order.status, OrderStatus::InProgress);

    assert!(engine.apply(Command::ToggleStep(assembly)));
    engine.run_next(20);
    let order = engine.current_frame().order(OrderId(1)).unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
}

#[test]
fn reset_forgets_commands() {
    let line = seat_line();
    let assembly = line.assembly;
    let mut engine = line.engine();
    assert!(engine.apply(Command::ToggleStep(assembly)));
    engine.reset();
    assert!(engine.current_frame().state.graph().step(assembly).unwrap().active);
}

// ===========================================================================
// Queries
// ===========================================================================

#[test]
fn snapshots_describe_the_line() {
    let line = seat_line();
    let (assembly, conveyor, frame_mat) = (line.assembly, line.conveyor, line.frame);
    let mut engine = line.engine();
    engine.run_next(2);

    let frame = engine.current_frame();
    let step = frame.step_snapshot(assembly).unwrap();
    assert_eq!(step.name, "Assembly");
    assert_eq!(step.contents.get(&frame_mat), Some(&4));
    assert_eq!(step.input_links, vec![conveyor]);
    assert!(step.orders.contains(&OrderId(1)));

    let link = frame.link_snapshot(conveyor).unwrap();
    assert_eq!(link.kind, "conveyor");
    assert_eq!(link.in_transit, 2);
    assert_eq!(link.utilization, fixed(2.0) / fixed(10.0));
}

#[test]
fn sensor_history_counts_products() {
    let line = seat_line();
    let counter = line.seat_counter;
    let mut engine = line.engine();
    engine.run_next(8);
    let history = engine.sensor_history(counter);
    assert_eq!(history.len(), 9);
    assert_eq!(history.last(), Some(&(8, 2)));

    let products = engine
        .timeline()
        .sensor_log(counter)
        .into_iter()
        .filter(|e| e.direction == ScanDirection::Product)
        .count();
    assert_eq!(products, 2);
}

// ===========================================================================
// Export
// ===========================================================================

#[test]
fn frame_encoding_preserves_hash() {
    let mut engine = seat_line().engine();
    engine.run_next(5);
    let frame = engine.current_frame();
    let bytes = frame.encode().unwrap();
    let decoded = Frame::decode(&bytes).unwrap();
    assert_eq!(decoded.tick, frame.tick);
    assert_eq!(decoded.state_hash, frame.state_hash);
}

#[test]
fn decoding_garbage_fails() {
    assert!(Frame::decode(&[0xde, 0xad, 0xbe, 0xef]).is_err());
}

#[test]
fn identical_runs_export_identical_bytes() {
    let mut a = seat_line().engine();
    let mut b = seat_line().engine();
    a.run_next(8);
    b.run_next(8);
    let bytes_a = a.simulation_run().to_bitcode().unwrap();
    let bytes_b = b.simulation_run().to_bitcode().unwrap();
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn json_export_lists_every_frame() {
    let mut engine = seat_line().engine();
    engine.run_next(8);
    let run = engine.simulation_run();
    assert_eq!(run.frames.len(), 9);
    let json = run.to_json().unwrap();
    assert!(json.contains("Complete Seat"));
    assert!(json.contains("AllOrdersCompleted"));
}
