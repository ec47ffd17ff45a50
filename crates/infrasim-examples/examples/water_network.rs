//! Water network example: a data-driven run with per-step reporting.
//!
//! Loads a run directory (scenario plus config), runs it step by step and
//! prints every element's stock and the net flow at every node. The final
//! snapshot is printed as JSON.
//!
//! Run with: `cargo run -p infrasim-examples --example water_network [run-dir]`
//! Set `RUST_LOG=debug` to see the kernel's step logs.

use std::path::PathBuf;

use infrasim_core::event::Event;
use infrasim_core::simulator::Simulator;
use infrasim_data::load_run;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/water_network"));
    let run = load_run(&dir)?;
    let config = run.config;

    let mut sim = Simulator::new(run.scenario).with_numeric_context(config.numeric);
    sim.on_event(Box::new(|event: &Event| {
        if let Event::ViolationDetected { time, violation } = event {
            println!("  ! t={time}: {violation:?}");
        }
    }));

    // --- Step through the run by hand ---

    sim.initialize();
    let end = sim.time() + config.duration;
    while sim.time() <= end {
        sim.step(config.time_step, config.rounds_per_step)?;
        let snapshot = sim.snapshot();
        println!("t={}", snapshot.time);
        for element in &snapshot.elements {
            println!(
                "  {:<10} in {:<10} stock {}",
                element.name, element.parent_name, element.stock
            );
        }
        for node in &snapshot.nodes {
            println!("  node {:<10} net flow {}", node.name, node.net_flow);
        }
    }
    sim.finish();

    println!("state hash: {:016x}", sim.state_hash());
    println!("{}", serde_json::to_string_pretty(&sim.snapshot())?);
    Ok(())
}
