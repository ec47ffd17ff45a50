//! Infrasim Core -- the kernel of the infrastructure element simulator.
//!
//! Networks of elements (producers, consumers, relays, depots, transports)
//! exchange typed resource quantities over discrete time steps. Within each
//! step every element settles its supply and demand with its trading
//! partners before anything is committed, and resources are conserved.
//!
//! # Step Pipeline
//!
//! Each call to [`simulator::Simulator::step`] runs:
//!
//! 1. **Negotiate** -- a configured number of propose/stage/publish rounds.
//! 2. **Verify** -- per-node net flow and bilateral exchange symmetry.
//! 3. **Tick** -- every element computes its next stock from current rates.
//! 4. **Tock** -- every element publishes its next values at once.
//! 5. **Deliver** -- buffered events reach listeners; the clock advances.
//!
//! # Double Buffering
//!
//! Elements never see each other's half-written values. Proposals are
//! computed from committed peer values only and published together:
//!
//! ```rust,ignore
//! let proposal = element.propose(id, scenario.elements(), time_step);
//! element.iterate_tick(proposal);
//! element.iterate_tock();
//! ```
//!
//! # Key Types
//!
//! - [`resource::ResourceVector`] -- fixed-dimension vector of resource
//!   quantities, one per [`resource::ResourceKind`].
//! - [`element::Element`] -- a named agent with location, parent, stock and
//!   state, each double-buffered.
//! - [`state::ElementState`] -- the closed set of behaviours an element can
//!   have: idle, process, exchanging, transport, storage and remote.
//! - [`scenario::ScenarioBuilder`] -- the only place topology and wiring are
//!   declared.
//! - [`simulator::Simulator`] -- phase orchestration and verification.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`event::EventBus`] -- buffered delivery of step events to listeners.

pub mod element;
pub mod event;
pub mod exchange;
pub mod fixed;
pub mod id;
pub mod location;
pub mod query;
pub mod resource;
pub mod scenario;
pub mod sim;
pub mod simulator;
pub mod state;
pub mod transport;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
