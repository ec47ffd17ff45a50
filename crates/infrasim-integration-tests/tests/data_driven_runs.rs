//! Cross-crate tests: scenarios loaded from data files and run to completion.

use std::path::PathBuf;

use infrasim_core::resource::{ResourceKind, ResourceVector};
use infrasim_core::simulator::Simulator;
use infrasim_core::state::ElementState;
use infrasim_core::test_utils::*;
use infrasim_data::{Format, load_run, parse_scenario};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn data_dir(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data").join(name)
}

fn stock_named(sim: &Simulator, name: &str) -> ResourceVector {
    sim.snapshot()
        .element(name)
        .map(|e| e.stock)
        .unwrap_or_else(|| panic!("no element named {name}"))
}

// ===========================================================================
// Water network
// ===========================================================================

#[test]
fn water_network_runs_consistently() {
    init_tracing();
    let run = load_run(&data_dir("water_network")).unwrap();
    assert_eq!(run.config.rounds_per_step, 3);
    assert_eq!(run.config.numeric.epsilon, fx(0.0001));

    let mut sim = Simulator::new(run.scenario);
    let report = sim.execute_with(&run.config).unwrap();
    assert!(report.is_consistent(), "violations: {:?}", report.violations);
    assert_eq!(report.steps_run, 10);

    // Transport: 15 per tick until the tank's deficit of 50 is met.
    assert_eq!(stock_named(&sim, "aquifer"), water(150.0));
    assert_eq!(stock_named(&sim, "city-tank"), water(50.0));
    assert_eq!(stock_named(&sim, "main"), ResourceVector::ZERO);

    // Retail: the relay passes water through untouched.
    assert_eq!(stock_named(&sim, "pump"), water(460.0));
    assert_eq!(stock_named(&sim, "utility"), ResourceVector::ZERO);
    assert_eq!(
        stock_named(&sim, "homes"),
        water(40.0).add(&ResourceVector::of(ResourceKind::Electricity, fx(20.0)))
    );

    // Open process.
    assert_eq!(stock_named(&sim, "farm-well"), water(30.0).add(&oil(40.0)));
}

#[test]
fn water_network_conserves_outside_processes() {
    let run = load_run(&data_dir("water_network")).unwrap();
    let mut sim = Simulator::new(run.scenario);
    sim.initialize();
    let initial = total_stock(&sim);

    // Net production per tick of every process element.
    let per_tick: ResourceVector = sim
        .scenario()
        .elements()
        .values()
        .filter_map(|e| match e.state() {
            ElementState::Process(p) => Some(
                p.production
                    .add(&p.storage)
                    .subtract(&p.consumption)
                    .subtract(&p.retrieval),
            ),
            _ => None,
        })
        .sum();

    let report = sim.execute_with(&run.config).unwrap();
    let ticks = report.steps_run * run.config.time_step;
    let produced = per_tick.multiply(fx(ticks as f64));
    assert_eq!(total_stock(&sim), initial.add(&produced));
}

#[test]
fn water_network_snapshot_reports_parents_and_flows() {
    let run = load_run(&data_dir("water_network")).unwrap();
    let mut sim = Simulator::new(run.scenario);
    sim.initialize();
    sim.step(1, run.config.rounds_per_step).unwrap();

    let snapshot = sim.snapshot();
    assert_eq!(snapshot.time, 1);
    assert_eq!(snapshot.element("meter").unwrap().parent_name, "homes");
    assert_eq!(snapshot.element("homes").unwrap().parent_name, "homes");
    for node in &snapshot.nodes {
        assert_eq!(node.net_flow, ResourceVector::ZERO, "node {}", node.name);
    }

    let main = snapshot.element("main").unwrap();
    assert_eq!(main.rates.input, water(15.0));
    assert_eq!(main.rates.output, water(15.0));
}

// ===========================================================================
// Formats
// ===========================================================================

const RON: &str = r#"(
    name: "pair",
    nodes: ["n"],
    elements: [
        (name: "src", location: (origin: "n"), stock: {"oil": 30.0}, state: Source),
        (name: "dst", location: (origin: "n"), state: Consumer(demand: {"oil": 2.5})),
    ],
    exchanges: [(supplier: "src", customer: "dst", kind: oil)],
)"#;

const JSON: &str = r#"{
    "name": "pair",
    "nodes": ["n"],
    "elements": [
        {"name": "src", "location": {"origin": "n"}, "stock": {"oil": 30.0}, "state": "Source"},
        {"name": "dst", "location": {"origin": "n"}, "state": {"Consumer": {"demand": {"oil": 2.5}}}}
    ],
    "exchanges": [{"supplier": "src", "customer": "dst", "kind": "oil"}]
}"#;

const TOML: &str = r#"
name = "pair"
nodes = ["n"]

[[elements]]
name = "src"
location = { origin = "n" }
stock = { oil = 30.0 }
state = "Source"

[[elements]]
name = "dst"
location = { origin = "n" }
state = { Consumer = { demand = { oil = 2.5 } } }

[[exchanges]]
supplier = "src"
customer = "dst"
kind = "oil"
"#;

#[test]
fn every_format_produces_the_same_run() {
    let hashes: Vec<u64> = [(RON, Format::Ron), (JSON, Format::Json), (TOML, Format::Toml)]
        .into_iter()
        .map(|(content, format)| {
            let mut sim = Simulator::new(parse_scenario(content, format).unwrap());
            let report = sim.execute(3, 1, 1).unwrap();
            assert!(report.is_consistent());
            assert_eq!(stock_named(&sim, "dst"), oil(10.0));
            sim.state_hash()
        })
        .collect();
    assert_eq!(hashes[0], hashes[1]);
    assert_eq!(hashes[1], hashes[2]);
}
