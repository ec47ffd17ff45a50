//! Integration tests for the simulation kernel.
//!
//! These tests exercise end-to-end behavior across the full step pipeline:
//! negotiation, verification, commit, conservation, transport allocation,
//! staged topology changes, events and determinism.

use std::cell::RefCell;
use std::rc::Rc;

use infrasim_core::event::{Event, EventKind};
use infrasim_core::fixed::NumericContext;
use infrasim_core::location::Location;
use infrasim_core::resource::{ResourceKind, ResourceVector};
use infrasim_core::sim::SimConfig;
use infrasim_core::simulator::{SimError, Simulator};
use infrasim_core::state::{ElementState, ProcessState, RemoteState};
use infrasim_core::transport::{StorageState, TransportState};
use infrasim_core::test_utils::*;
use infrasim_core::validation::Violation;
use infrasim_core::element::ElementError;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ===========================================================================
// Test 1: Producer -> consumer
// ===========================================================================
//
// A source holding 100 water supplies a consumer demanding 10 per tick.
// One negotiation round settles the exchange.

#[test]
fn producer_consumer_settles_in_one_round() {
    init_tracing();
    let (scenario, producer, consumer) = producer_consumer(10.0);
    let mut sim = Simulator::new(scenario);

    let report = sim.execute(2, 1, 1).unwrap();
    assert!(report.is_consistent(), "violations: {:?}", report.violations);
    assert_eq!(report.steps_run, 3);
    assert_eq!(stock_of(&sim, producer), water(70.0));
    assert_eq!(stock_of(&sim, consumer), water(30.0));

    let snapshot = sim.snapshot();
    assert_eq!(snapshot.time, 3);
    let c = snapshot.element("consumer").unwrap();
    assert_eq!(c.rates.receiving, water(10.0));
    assert_eq!(c.parent_name, "consumer");
    assert_eq!(snapshot.element("producer").unwrap().rates.sending, water(10.0));
    assert_eq!(snapshot.node("plant").unwrap().net_flow, ResourceVector::ZERO);
}

#[test]
fn longer_steps_scale_exchanged_quantities() {
    let (scenario, producer, consumer) = producer_consumer(10.0);
    let mut sim = Simulator::new(scenario);

    let report = sim.execute(2, 2, 1).unwrap();
    assert_eq!(report.steps_run, 2);
    assert!(report.is_consistent());
    assert_eq!(stock_of(&sim, producer), water(60.0));
    assert_eq!(stock_of(&sim, consumer), water(40.0));
    assert_eq!(sim.snapshot().element("consumer").unwrap().rates.receiving, water(20.0));
}

// ===========================================================================
// Test 2: Conservation
// ===========================================================================

#[test]
fn closed_scenarios_conserve_stock() {
    let (scenario, _) = relay_chain(3, 7.5);
    let mut sim = Simulator::new(scenario);
    sim.initialize();
    let before = total_stock(&sim);

    for _ in 0..10 {
        let step = sim.step(1, 5).unwrap();
        assert!(step.verification.is_consistent());
        assert_eq!(total_stock(&sim), before);
    }
}

#[test]
fn relays_pass_demand_upstream() {
    let (scenario, ids) = relay_chain(2, 4.0);
    let mut sim = Simulator::new(scenario);
    let report = sim.execute(4, 1, 3).unwrap();
    assert!(report.is_consistent());

    let (source, relays, sink) = (ids[0], &ids[1..3], ids[3]);
    assert_eq!(stock_of(&sim, source), water(980.0));
    for &relay in relays {
        assert_eq!(stock_of(&sim, relay), ResourceVector::ZERO);
    }
    assert_eq!(stock_of(&sim, sink), water(20.0));
}

// ===========================================================================
// Test 3: Verification is reported, never fatal
// ===========================================================================
//
// With a single round a relay learns its customer's demand in the same round
// its supplier reads the relay's stale receiving rate, so the first step is
// asymmetric. The run proceeds and settles on the second step.

#[test]
fn too_few_rounds_report_asymmetry_and_continue() {
    init_tracing();
    let (scenario, ids) = relay_chain(1, 10.0);
    let mut sim = Simulator::new(scenario);

    let report = sim.execute(2, 1, 1).unwrap();
    assert_eq!(report.steps_run, 3);
    assert!(!report.is_consistent());
    assert!(report.violations.iter().all(|(time, _)| *time == 0));

    let (_, violation) = &report.violations[0];
    match violation {
        Violation::Asymmetric { a, b, mismatch, .. } => {
            assert_eq!((*a, *b), (ids[0], ids[1]));
            assert_eq!(mismatch.magnitude(), fx(10.0));
        }
        other => panic!("expected asymmetric exchange, got {other:?}"),
    }
}

#[test]
fn violations_reach_listeners_before_commit() {
    let (scenario, _) = relay_chain(1, 10.0);
    let mut sim = Simulator::new(scenario);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    sim.on_event(Box::new(move |e: &Event| sink.borrow_mut().push(e.kind())));

    sim.execute(1, 1, 1).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![
            EventKind::ViolationDetected,
            EventKind::StepCommitted,
            EventKind::StepCommitted,
        ]
    );
}

#[test]
fn suppressed_events_are_not_delivered() {
    let (scenario, _) = relay_chain(1, 10.0);
    let mut sim = Simulator::new(scenario);
    let count = Rc::new(RefCell::new(0));
    let sink = Rc::clone(&count);
    sim.on_event(Box::new(move |_: &Event| *sink.borrow_mut() += 1));
    sim.suppress_event(EventKind::ViolationDetected);

    sim.execute(1, 1, 1).unwrap();
    assert_eq!(*count.borrow(), 2);
}

// ===========================================================================
// Test 4: Depot-to-depot transport
// ===========================================================================

#[test]
fn pipeline_is_capacity_limited_then_deficit_limited() {
    init_tracing();
    let (scenario, p) = depot_pipeline(10.0, 0.0, 0.0, 8.0, 6.0);
    let mut sim = Simulator::new(scenario);
    sim.initialize();

    let step = sim.step(1, 2).unwrap();
    assert!(step.verification.is_consistent(), "{:?}", step.verification.violations);
    assert_eq!(stock_of(&sim, p.upstream), water(4.0));
    assert_eq!(stock_of(&sim, p.downstream), water(6.0));
    assert_eq!(stock_of(&sim, p.pipe), ResourceVector::ZERO);

    let step = sim.step(1, 2).unwrap();
    assert!(step.verification.is_consistent());
    assert_eq!(stock_of(&sim, p.upstream), water(2.0));
    assert_eq!(stock_of(&sim, p.downstream), water(8.0));

    sim.step(1, 2).unwrap();
    assert_eq!(stock_of(&sim, p.upstream), water(2.0));
    assert_eq!(stock_of(&sim, p.downstream), water(8.0));
}

#[test]
fn pipeline_respects_reserve() {
    let (scenario, p) = depot_pipeline(10.0, 7.0, 0.0, 100.0, 6.0);
    let mut sim = Simulator::new(scenario);
    let report = sim.execute(4, 1, 2).unwrap();
    assert!(report.is_consistent());
    assert_eq!(stock_of(&sim, p.upstream), water(7.0));
    assert_eq!(stock_of(&sim, p.downstream), water(3.0));
}

#[test]
fn single_round_leaves_depots_behind_their_pipe() {
    let (scenario, _) = depot_pipeline(10.0, 0.0, 0.0, 8.0, 6.0);
    let mut sim = Simulator::new(scenario);
    sim.initialize();
    let before = total_stock(&sim);

    let step = sim.step(1, 1).unwrap();
    let flows: Vec<_> = step
        .verification
        .violations
        .iter()
        .filter(|v| matches!(v, Violation::NetFlow { .. }))
        .collect();
    assert_eq!(flows.len(), 2);
    assert_eq!(total_stock(&sim), before);
}

// Quantities that do not divide evenly by the step length must still arrive
// whole: 8 and 5 over 3 ticks have no exact per-tick value.

#[test]
fn long_steps_move_exact_pipeline_quantities() {
    let (scenario, p) = depot_pipeline(10.0, 0.0, 0.0, 8.0, 6.0);
    let mut sim = Simulator::new(scenario);
    sim.initialize();
    let before = total_stock(&sim);

    let step = sim.step(3, 2).unwrap();
    assert!(step.verification.is_consistent(), "{:?}", step.verification.violations);
    assert_eq!(stock_of(&sim, p.upstream), water(2.0));
    assert_eq!(stock_of(&sim, p.downstream), water(8.0));
    assert_eq!(total_stock(&sim), before);
    assert_eq!(sim.snapshot().element("pipe").unwrap().rates.input, water(8.0));
}

#[test]
fn long_step_runs_drain_to_reserve_exactly() {
    let (scenario, p) = depot_pipeline(5.0, 0.0, 0.0, 100.0, 6.0);
    let mut sim = Simulator::new(scenario);
    let report = sim.execute(6, 3, 2).unwrap();
    assert_eq!(report.steps_run, 3);
    assert!(report.is_consistent(), "violations: {:?}", report.violations);
    assert_eq!(stock_of(&sim, p.upstream), ResourceVector::ZERO);
    assert_eq!(stock_of(&sim, p.downstream), water(5.0));
}

// Two pipes leave one depot. The first attached is served first; the second
// gets what is left, so the origin never goes below its reserve.

#[test]
fn fan_out_splits_surplus_in_attachment_order() {
    let mut b = infrasim_core::scenario::ScenarioBuilder::new("fan-out", 0);
    let field = b.add_node("field").unwrap();
    let east = b.add_node("east").unwrap();
    let west = b.add_node("west").unwrap();
    let depot = |name: &str, at, stock: f64, reserve: f64, target: f64| {
        infrasim_core::element::Element::new(
            name,
            Location::at(at),
            water(stock),
            ElementState::Storage(StorageState::new(water(reserve), water(target))),
        )
    };
    let origin = b.add_element(depot("origin", field, 10.0, 1.0, 0.0)).unwrap();
    let east_depot = b.add_element(depot("east-depot", east, 0.0, 0.0, 6.0)).unwrap();
    let west_depot = b.add_element(depot("west-depot", west, 0.0, 0.0, 6.0)).unwrap();
    for (name, to, depot) in [("east-pipe", east, east_depot), ("west-pipe", west, west_depot)] {
        b.add_element(infrasim_core::element::Element::new(
            name,
            Location::between(field, to),
            ResourceVector::ZERO,
            ElementState::Transport(TransportState::new(
                ResourceKind::Water,
                fx(100.0),
                origin,
                depot,
            )),
        ))
        .unwrap();
    }
    let mut sim = Simulator::new(b.build());
    sim.initialize();
    let before = total_stock(&sim);

    let step = sim.step(1, 2).unwrap();
    assert!(step.verification.is_consistent(), "{:?}", step.verification.violations);
    assert_eq!(stock_of(&sim, origin), water(1.0));
    assert_eq!(stock_of(&sim, east_depot), water(6.0));
    assert_eq!(stock_of(&sim, west_depot), water(3.0));
    assert_eq!(total_stock(&sim), before);
}

// ===========================================================================
// Test 5: Staged topology and state changes
// ===========================================================================

#[test]
fn store_element_rejects_parent_elsewhere() {
    let (scenario, p) = depot_pipeline(10.0, 0.0, 0.0, 8.0, 6.0);
    let mut sim = Simulator::new(scenario);
    sim.initialize();

    let err = sim.store_element(p.downstream, p.upstream).unwrap_err();
    assert!(matches!(
        err,
        SimError::Element(ElementError::IncompatibleLocation { .. })
    ));
}

#[test]
fn transport_element_takes_effect_on_commit() {
    let (scenario, p) = depot_pipeline(10.0, 0.0, 0.0, 8.0, 6.0);
    let downstream_at = sim_location(&scenario, p.downstream);
    let mut sim = Simulator::new(scenario);
    sim.initialize();

    sim.transport_element(p.upstream, downstream_at).unwrap();
    assert_ne!(sim.element(p.upstream).unwrap().location(), downstream_at);
    sim.step(1, 2).unwrap();
    assert_eq!(sim.element(p.upstream).unwrap().location(), downstream_at);

    // Now co-located, the depots can nest.
    sim.store_element(p.downstream, p.upstream).unwrap();
    sim.step(1, 2).unwrap();
    assert_eq!(sim.element(p.downstream).unwrap().parent(), Some(p.upstream));
}

fn sim_location(
    scenario: &infrasim_core::scenario::Scenario,
    id: infrasim_core::id::ElementId,
) -> Location {
    scenario.element(id).unwrap().location()
}

#[test]
fn transform_element_switches_behaviour_next_step() {
    let (scenario, producer, _) = producer_consumer(10.0);
    let mut sim = Simulator::new(scenario);
    sim.initialize();

    let well = ElementState::Process(ProcessState {
        production: water(5.0),
        ..ProcessState::default()
    });
    sim.transform_element(producer, well).unwrap();
    sim.step(1, 1).unwrap();
    // The old exchanging state paid out this step.
    assert_eq!(stock_of(&sim, producer), water(90.0));

    sim.step(1, 1).unwrap();
    assert_eq!(stock_of(&sim, producer), water(95.0));
}

#[test]
fn remote_rates_are_injected_and_verified() {
    let mut b = infrasim_core::scenario::ScenarioBuilder::new("federated", 0);
    let n = b.add_node("border").unwrap();
    let proxy_a = b
        .add_element(infrasim_core::element::Element::new(
            "proxy-a",
            Location::at(n),
            water(50.0),
            ElementState::Remote(RemoteState::new()),
        ))
        .unwrap();
    let proxy_b = b
        .add_element(infrasim_core::element::Element::new(
            "proxy-b",
            Location::at(n),
            ResourceVector::ZERO,
            ElementState::Remote(RemoteState::new()),
        ))
        .unwrap();
    let mut sim = Simulator::new(b.build());
    sim.initialize();

    sim.remote_state_mut(proxy_a)
        .unwrap()
        .inject_sending_rate_to(proxy_b, water(5.0));
    sim.remote_state_mut(proxy_b)
        .unwrap()
        .inject_receiving_rate_from(proxy_a, water(5.0));

    let step = sim.step(2, 1).unwrap();
    assert!(step.verification.is_consistent());
    assert_eq!(stock_of(&sim, proxy_a), water(40.0));
    assert_eq!(stock_of(&sim, proxy_b), water(10.0));
}

// ===========================================================================
// Test 6: Configuration and determinism
// ===========================================================================

#[test]
fn execute_with_config() {
    let (scenario, _, consumer) = producer_consumer(2.0);
    let mut sim = Simulator::new(scenario);
    let config = SimConfig {
        duration: 5,
        time_step: 3,
        rounds_per_step: 1,
        numeric: NumericContext::new(fx(0.001)),
    };
    let report = sim.execute_with(&config).unwrap();
    assert_eq!(report.steps_run, 2);
    assert_eq!(sim.numeric_context().epsilon, fx(0.001));
    assert_eq!(stock_of(&sim, consumer), water(12.0));
}

#[test]
fn identical_runs_hash_identically() {
    let run = || {
        let (scenario, _) = relay_chain(4, 3.25);
        let mut sim = Simulator::new(scenario);
        sim.execute(20, 1, 2).unwrap();
        sim.state_hash()
    };
    assert_eq!(run(), run());
}

#[test]
fn reexecuting_restarts_from_declared_state() {
    let (scenario, producer, _) = producer_consumer(10.0);
    let mut sim = Simulator::new(scenario);
    sim.execute(2, 1, 1).unwrap();
    let first = sim.state_hash();
    sim.execute(2, 1, 1).unwrap();
    assert_eq!(sim.state_hash(), first);
    assert_eq!(stock_of(&sim, producer), water(70.0));
}

#[test]
fn oil_exchange_ignores_other_kinds() {
    let mut b = infrasim_core::scenario::ScenarioBuilder::new("oil", 0);
    let n = b.add_node("field").unwrap();
    let supplier = b
        .add_element(infrasim_core::element::Element::new(
            "rig",
            Location::at(n),
            oil(10.0),
            ElementState::Exchanging(infrasim_core::exchange::ExchangingState::source()),
        ))
        .unwrap();
    let customer = b
        .add_element(infrasim_core::element::Element::new(
            "refinery",
            Location::at(n),
            ResourceVector::ZERO,
            ElementState::Exchanging(infrasim_core::exchange::ExchangingState::consumer(
                oil(1.0).add(&water(3.0)),
            )),
        ))
        .unwrap();
    b.connect_exchange(supplier, customer, ResourceKind::Oil)
        .unwrap();
    let mut sim = Simulator::new(b.build());
    let report = sim.execute(1, 1, 1).unwrap();
    assert!(report.is_consistent());
    assert_eq!(stock_of(&sim, customer), oil(2.0));
}
