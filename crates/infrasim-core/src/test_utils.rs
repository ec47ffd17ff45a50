//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::element::Element;
use crate::exchange::ExchangingState;
use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::id::ElementId;
use crate::location::Location;
use crate::resource::{ResourceKind, ResourceVector};
use crate::scenario::{Scenario, ScenarioBuilder};
use crate::simulator::Simulator;
use crate::state::ElementState;
use crate::transport::{StorageState, TransportState};

// ===========================================================================
// Value helpers
// ===========================================================================

pub fn fx(v: f64) -> Fixed64 {
    f64_to_fixed64(v)
}

pub fn water(v: f64) -> ResourceVector {
    ResourceVector::of(ResourceKind::Water, fx(v))
}

pub fn oil(v: f64) -> ResourceVector {
    ResourceVector::of(ResourceKind::Oil, fx(v))
}

/// Sum of every element's committed stock.
pub fn total_stock(sim: &Simulator) -> ResourceVector {
    sim.scenario().elements().values().map(Element::stock).sum()
}

pub fn stock_of(sim: &Simulator, id: ElementId) -> ResourceVector {
    sim.element(id).map(Element::stock).unwrap_or_default()
}

// ===========================================================================
// Scenario builders
// ===========================================================================

/// One node, a water source holding 100 and a consumer demanding `demand`
/// per tick. Returns `(scenario, producer, consumer)`.
pub fn producer_consumer(demand: f64) -> (Scenario, ElementId, ElementId) {
    let mut b = ScenarioBuilder::new("producer-consumer", 0);
    let plant = b.add_node("plant").unwrap();
    let producer = b
        .add_element(Element::new(
            "producer",
            Location::at(plant),
            water(100.0),
            ElementState::Exchanging(ExchangingState::source()),
        ))
        .unwrap();
    let consumer = b
        .add_element(Element::new(
            "consumer",
            Location::at(plant),
            ResourceVector::ZERO,
            ElementState::Exchanging(ExchangingState::consumer(water(demand))),
        ))
        .unwrap();
    b.connect_exchange(producer, consumer, ResourceKind::Water)
        .unwrap();
    (b.build(), producer, consumer)
}

/// A water source, `relays` relays in series, then a consumer demanding
/// `demand` per tick. Returned ids run from the source to the consumer.
pub fn relay_chain(relays: usize, demand: f64) -> (Scenario, Vec<ElementId>) {
    let mut b = ScenarioBuilder::new("relay-chain", 0);
    let node = b.add_node("grid").unwrap();
    let mut ids = vec![
        b.add_element(Element::new(
            "source",
            Location::at(node),
            water(1000.0),
            ElementState::Exchanging(ExchangingState::source()),
        ))
        .unwrap(),
    ];
    for i in 0..relays {
        let relay = b
            .add_element(Element::new(
                format!("relay-{i}"),
                Location::at(node),
                ResourceVector::ZERO,
                ElementState::Exchanging(ExchangingState::relay()),
            ))
            .unwrap();
        b.connect_exchange(ids[ids.len() - 1], relay, ResourceKind::Water)
            .unwrap();
        ids.push(relay);
    }
    let consumer = b
        .add_element(Element::new(
            "sink",
            Location::at(node),
            ResourceVector::ZERO,
            ElementState::Exchanging(ExchangingState::consumer(water(demand))),
        ))
        .unwrap();
    b.connect_exchange(ids[ids.len() - 1], consumer, ResourceKind::Water)
        .unwrap();
    ids.push(consumer);
    (b.build(), ids)
}

/// Ids of a two-depot transport scenario.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline {
    pub upstream: ElementId,
    pub downstream: ElementId,
    pub pipe: ElementId,
}

/// Two depots on separate nodes joined by a water pipe of `capacity` per
/// tick. The upstream depot keeps `reserve`; the downstream fills to
/// `target`.
pub fn depot_pipeline(
    upstream_stock: f64,
    reserve: f64,
    downstream_stock: f64,
    target: f64,
    capacity: f64,
) -> (Scenario, Pipeline) {
    let mut b = ScenarioBuilder::new("depot-pipeline", 0);
    let up = b.add_node("upstream").unwrap();
    let down = b.add_node("downstream").unwrap();
    let upstream = b
        .add_element(Element::new(
            "upstream-depot",
            Location::at(up),
            water(upstream_stock),
            ElementState::Storage(StorageState::new(water(reserve), ResourceVector::ZERO)),
        ))
        .unwrap();
    let downstream = b
        .add_element(Element::new(
            "downstream-depot",
            Location::at(down),
            water(downstream_stock),
            ElementState::Storage(StorageState::new(ResourceVector::ZERO, water(target))),
        ))
        .unwrap();
    let pipe = b
        .add_element(Element::new(
            "pipe",
            Location::between(up, down),
            ResourceVector::ZERO,
            ElementState::Transport(TransportState::new(
                ResourceKind::Water,
                fx(capacity),
                upstream,
                downstream,
            )),
        ))
        .unwrap();
    (
        b.build(),
        Pipeline {
            upstream,
            downstream,
            pipe,
        },
    )
}

/// `pairs` independent producer/consumer pairs plus `pairs` depot
/// pipelines, for throughput measurements.
pub fn build_wide_network(pairs: usize) -> Scenario {
    let mut b = ScenarioBuilder::new("wide-network", 0);
    for i in 0..pairs {
        let plant = b.add_node(format!("plant-{i}")).unwrap();
        let far = b.add_node(format!("far-{i}")).unwrap();
        let producer = b
            .add_element(Element::new(
                format!("producer-{i}"),
                Location::at(plant),
                water(1_000_000.0),
                ElementState::Exchanging(ExchangingState::source()),
            ))
            .unwrap();
        let consumer = b
            .add_element(Element::new(
                format!("consumer-{i}"),
                Location::at(plant),
                ResourceVector::ZERO,
                ElementState::Exchanging(ExchangingState::consumer(water(1.0))),
            ))
            .unwrap();
        b.connect_exchange(producer, consumer, ResourceKind::Water)
            .unwrap();

        let near_depot = b
            .add_element(Element::new(
                format!("near-depot-{i}"),
                Location::at(plant),
                oil(1_000_000.0),
                ElementState::Storage(StorageState::new(ResourceVector::ZERO, ResourceVector::ZERO)),
            ))
            .unwrap();
        let far_depot = b
            .add_element(Element::new(
                format!("far-depot-{i}"),
                Location::at(far),
                ResourceVector::ZERO,
                ElementState::Storage(StorageState::new(
                    ResourceVector::ZERO,
                    oil(1_000_000.0),
                )),
            ))
            .unwrap();
        b.add_element(Element::new(
            format!("pipe-{i}"),
            Location::between(plant, far),
            ResourceVector::ZERO,
            ElementState::Transport(TransportState::new(
                ResourceKind::Oil,
                fx(5.0),
                near_depot,
                far_depot,
            )),
        ))
        .unwrap();
    }
    b.build()
}
