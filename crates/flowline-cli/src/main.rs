//! Headless driver: loads a scenario, runs it and prints a summary.
//!
//! ```text
//! flowline --scenario seat_line.ron [--ticks 200] [--export run.json]
//! ```
//!
//! Without `--ticks` the run stops once every order is settled, or after
//! `MAX_TICKS`.

use anyhow::{Context, Result, bail};
use flowline_core::engine::Engine;
use flowline_core::event::LogNotifier;
use flowline_core::fixed::fixed64_to_f64;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const MAX_TICKS: u64 = 10_000;

#[derive(Debug, Default)]
struct Args {
    scenario: Option<PathBuf>,
    ticks: Option<u64>,
    export: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--scenario" => args.scenario = it.next().map(PathBuf::from),
            "--ticks" => {
                let raw = it.next().context("--ticks needs a value")?;
                args.ticks = Some(raw.parse().with_context(|| format!("invalid tick count '{raw}'"))?);
            }
            "--export" => args.export = it.next().map(PathBuf::from),
            other => bail!("unknown argument '{other}'"),
        }
    }
    Ok(args)
}

fn run(engine: &mut Engine, ticks: Option<u64>) {
    match ticks {
        Some(n) => {
            engine.run_next(n);
        }
        None => {
            while !engine.is_finished() && engine.current_tick() < MAX_TICKS {
                engine.tick_forward();
            }
        }
    }
}

fn print_summary(engine: &Engine) {
    let frame = engine.current_frame();
    println!(
        "Run | tick: {} | orders completed: {}/{} | state hash: {:016x}",
        frame.tick,
        frame.completed_orders(),
        frame.orders.len(),
        frame.state_hash
    );
    for order in &frame.orders {
        println!(
            "Order {} | qty: {} | status: {:?} | started: {:?} | completed: {:?}",
            order.id.0, order.quantity, order.status, order.started_tick, order.completed_tick
        );
    }

    let graph = frame.state.graph();
    for (_, step) in graph.steps() {
        if let Some(mean) = engine.mean_step_duration(&step.name) {
            println!("KPI | step '{}' mean duration: {:.2}", step.name, fixed64_to_f64(mean));
        }
    }
    let kinds: BTreeSet<&str> = graph.links().map(|(_, l)| l.kind.as_str()).collect();
    for kind in kinds {
        if let Some(mean) = engine.mean_transport_duration(kind) {
            println!("KPI | transport '{kind}' mean duration: {:.2}", fixed64_to_f64(mean));
        }
    }
    for (id, sensor) in graph.sensors() {
        println!("Sensor '{}' | produced: {}", sensor.name, frame.state.sensor_count(id));
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;
    let path = args.scenario.context("missing --scenario <path>")?;
    info!(scenario = %path.display(), ticks = ?args.ticks, "starting run");

    let scenario = flowline_data::load_scenario(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    let mut engine = scenario.into_engine_with(Box::new(LogNotifier))?;
    run(&mut engine, args.ticks);
    print_summary(&engine);

    if let Some(out) = args.export {
        let json = engine.simulation_run().to_json_pretty()?;
        std::fs::write(&out, json).with_context(|| format!("writing {}", out.display()))?;
        info!(file = %out.display(), frames = engine.timeline().len(), "run exported");
    }
    Ok(())
}
