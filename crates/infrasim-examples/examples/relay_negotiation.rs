//! Relay negotiation example: how many rounds a supply chain needs.
//!
//! Builds a source feeding a consumer through a chain of relays, then runs
//! it with too few and with enough negotiation rounds per step. With too
//! few rounds the first steps report asymmetric exchanges (logged as
//! warnings) and stock is not conserved while demand propagates upstream.
//!
//! Run with: `cargo run -p infrasim-examples --example relay_negotiation`

use infrasim_core::element::Element;
use infrasim_core::exchange::ExchangingState;
use infrasim_core::fixed::f64_to_fixed64;
use infrasim_core::location::Location;
use infrasim_core::resource::{ResourceKind, ResourceVector};
use infrasim_core::scenario::{Scenario, ScenarioBuilder, ScenarioError};
use infrasim_core::simulator::Simulator;
use infrasim_core::state::ElementState;

const RELAYS: usize = 3;

fn build() -> Result<Scenario, ScenarioError> {
    let water = |v: f64| ResourceVector::of(ResourceKind::Water, f64_to_fixed64(v));

    let mut b = ScenarioBuilder::new("relay-chain", 0);
    let grid = b.add_node("grid")?;
    let mut upstream = b.add_element(Element::new(
        "reservoir",
        Location::at(grid),
        water(1000.0),
        ElementState::Exchanging(ExchangingState::source()),
    ))?;
    for i in 0..RELAYS {
        let relay = b.add_element(Element::new(
            format!("station-{i}"),
            Location::at(grid),
            ResourceVector::ZERO,
            ElementState::Exchanging(ExchangingState::relay()),
        ))?;
        b.connect_exchange(upstream, relay, ResourceKind::Water)?;
        upstream = relay;
    }
    let town = b.add_element(Element::new(
        "town",
        Location::at(grid),
        ResourceVector::ZERO,
        ElementState::Exchanging(ExchangingState::consumer(water(12.0))),
    ))?;
    b.connect_exchange(upstream, town, ResourceKind::Water)?;
    Ok(b.build())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    for rounds in [1, RELAYS as u32 + 1] {
        let mut sim = Simulator::new(build()?);
        let report = sim.execute(5, 1, rounds)?;
        let total: ResourceVector = sim.snapshot().total_stock();
        tracing::info!(rounds, violations = report.violations.len(), "run finished");
        println!(
            "rounds={rounds}: {} violation(s), total stock {total}, consistent={}",
            report.violations.len(),
            report.is_consistent()
        );
    }
    Ok(())
}
