//! The simulator: owns a scenario and drives it through committed steps.
//!
//! # Step pipeline
//!
//! Each `step()` runs:
//! 1. **Negotiate** -- `rounds` times: every negotiating element proposes
//!    from committed peer values, then every element stages its proposal,
//!    then every element publishes it (`iterate_tock`)
//! 2. **Verify** -- net flow per node and bilateral symmetry; violations are
//!    logged and recorded, never fatal. Unsettled exchanges are logged at
//!    debug level only
//! 3. **Tick** -- every element computes its shadow stock from current rates
//! 4. **Tock** -- every element publishes its shadow values
//! 5. **Deliver** -- buffered events go to listeners; the clock advances
//!
//! Each phase finishes for every element before the next begins. Within the
//! negotiate phase the read half never observes a write from the same round.

use slotmap::{Key, SecondaryMap};

use crate::element::{Element, ElementError};
use crate::event::{Event, EventBus, EventKind, PassiveListener};
use crate::fixed::{NumericContext, Ticks};
use crate::id::{ElementId, NodeId};
use crate::location::Location;
use crate::query::{ElementSnapshot, NodeSnapshot, RateSnapshot, StepSnapshot};
use crate::resource::ResourceVector;
use crate::scenario::Scenario;
use crate::sim::{RunReport, SimConfig, SimPhase, StateHash, StepReport};
use crate::state::{ElementState, Proposal, RemoteState};
use crate::validation::{self, Violation};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    #[error("time step must be non-zero")]
    ZeroTimeStep,
    #[error("simulator is {0:?}, not running")]
    NotRunning(SimPhase),
    #[error("unknown element {0:?}")]
    UnknownElement(ElementId),
    #[error("element '{0}' is not a remote proxy")]
    NotRemote(String),
    #[error(transparent)]
    Element(#[from] ElementError),
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Simulator {
    scenario: Scenario,
    phase: SimPhase,
    time: Ticks,
    numeric: NumericContext,
    events: EventBus,
    /// Duration of the last committed step; rates in snapshots use it.
    last_time_step: Ticks,
    /// Net flows verified during the last committed step.
    last_net_flows: SecondaryMap<NodeId, ResourceVector>,
    steps_run: u64,
}

impl Simulator {
    pub fn new(scenario: Scenario) -> Self {
        let time = scenario.start_time();
        Self {
            scenario,
            phase: SimPhase::NotStarted,
            time,
            numeric: NumericContext::default(),
            events: EventBus::default(),
            last_time_step: 1,
            last_net_flows: SecondaryMap::new(),
            steps_run: 0,
        }
    }

    pub fn with_numeric_context(mut self, numeric: NumericContext) -> Self {
        self.numeric = numeric;
        self
    }

    pub fn phase(&self) -> SimPhase {
        self.phase
    }

    pub fn time(&self) -> Ticks {
        self.time
    }

    pub fn numeric_context(&self) -> &NumericContext {
        &self.numeric
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.scenario.element(id)
    }

    pub fn steps_run(&self) -> u64 {
        self.steps_run
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Reset every element to its declared values at the scenario start
    /// time and enter the `Running` phase. May be called again to restart.
    pub fn initialize(&mut self) {
        let start = self.scenario.start_time();
        for element in self.scenario.elements_mut().values_mut() {
            element.initialize(start);
        }
        self.time = start;
        self.steps_run = 0;
        self.last_net_flows = SecondaryMap::new();
        self.phase = SimPhase::Running;
        tracing::debug!(scenario = %self.scenario.name(), start, "initialized");
    }

    /// Enter the `Completed` phase. Further steps are rejected until the
    /// simulator is initialized again.
    pub fn finish(&mut self) {
        self.phase = SimPhase::Completed;
    }

    /// Run one full step of `time_step` ticks with `rounds` negotiation
    /// rounds.
    pub fn step(&mut self, time_step: Ticks, rounds: u32) -> Result<StepReport, SimError> {
        if time_step == 0 {
            return Err(SimError::ZeroTimeStep);
        }
        if self.phase != SimPhase::Running {
            return Err(SimError::NotRunning(self.phase));
        }
        let time = self.time;

        // Phase 1: negotiate.
        for round in 0..rounds {
            self.negotiate(time_step);
            tracing::trace!(time, round, "negotiation round published");
        }

        // Phase 2: verify.
        let verification = validation::verify(
            self.scenario.node_map(),
            self.scenario.elements(),
            time_step,
            &self.numeric,
        );
        for violation in &verification.violations {
            log_violation(time, violation);
            self.events.emit(Event::ViolationDetected {
                time,
                violation: violation.clone(),
            });
        }
        for &(customer, supplier) in &verification.unsettled {
            let elements = self.scenario.elements();
            tracing::debug!(
                time,
                customer = elements.get(customer).map_or("?", Element::name),
                supplier = elements.get(supplier).map_or("?", Element::name),
                "exchange not settled after negotiation"
            );
        }

        // Phases 3 and 4: tick, then tock.
        let elements = self.scenario.elements_mut();
        for element in elements.values_mut() {
            element.tick(time_step);
        }
        for element in elements.values_mut() {
            element.tock();
        }

        // Phase 5: deliver and advance.
        self.events.emit(Event::StepCommitted { time, time_step });
        self.events.deliver();
        self.time = time.saturating_add(time_step);
        self.last_time_step = time_step;
        self.last_net_flows = verification.net_flows.clone();
        self.steps_run += 1;
        tracing::debug!(
            time,
            time_step,
            rounds,
            violations = verification.violations.len(),
            "step committed"
        );

        Ok(StepReport {
            time,
            time_step,
            verification,
        })
    }

    /// Initialize, then run every step that starts within the closed range
    /// `[start, start + duration]`.
    ///
    /// That is `duration / time_step + 1` steps, so a zero duration still
    /// runs one step. Verification failures are collected in the report.
    pub fn execute(
        &mut self,
        duration: Ticks,
        time_step: Ticks,
        rounds: u32,
    ) -> Result<RunReport, SimError> {
        if time_step == 0 {
            return Err(SimError::ZeroTimeStep);
        }
        self.initialize();
        let start = self.time;
        let steps = duration / time_step + 1;
        tracing::info!(
            scenario = %self.scenario.name(),
            start,
            duration,
            time_step,
            steps,
            rounds,
            elements = self.scenario.element_count(),
            "run started"
        );

        let mut report = RunReport {
            start_time: start,
            ..RunReport::default()
        };
        for _ in 0..steps {
            let step = self.step(time_step, rounds)?;
            report
                .violations
                .extend(step.verification.violations.into_iter().map(|v| (step.time, v)));
            report.steps_run += 1;
        }
        report.end_time = self.time;
        self.finish();

        tracing::info!(
            scenario = %self.scenario.name(),
            steps = report.steps_run,
            end = report.end_time,
            violations = report.violations.len(),
            "run completed"
        );
        Ok(report)
    }

    pub fn execute_with(&mut self, config: &SimConfig) -> Result<RunReport, SimError> {
        self.numeric = config.numeric;
        self.execute(config.duration, config.time_step, config.rounds_per_step)
    }

    // -----------------------------------------------------------------------
    // Negotiation
    // -----------------------------------------------------------------------

    /// One round: propose all (read-only), stage all, publish all.
    fn negotiate(&mut self, duration: Ticks) {
        let proposals = self.propose_all(duration);
        let elements = self.scenario.elements_mut();
        for (id, proposal) in proposals {
            if let Some(element) = elements.get_mut(id) {
                element.iterate_tick(proposal);
            }
        }
        for element in elements.values_mut() {
            element.iterate_tock();
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn propose_all(&self, duration: Ticks) -> Vec<(ElementId, Proposal)> {
        let elements = self.scenario.elements();
        elements
            .iter()
            .filter(|(_, e)| e.state().negotiates())
            .map(|(id, e)| (id, e.propose(id, elements, duration)))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn propose_all(&self, duration: Ticks) -> Vec<(ElementId, Proposal)> {
        use rayon::prelude::*;

        let elements = self.scenario.elements();
        let ids: Vec<ElementId> = elements
            .iter()
            .filter(|(_, e)| e.state().negotiates())
            .map(|(id, _)| id)
            .collect();
        ids.par_iter()
            .filter_map(|&id| {
                elements
                    .get(id)
                    .map(|e| (id, e.propose(id, elements, duration)))
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Staged changes
    // -----------------------------------------------------------------------

    fn element_mut(&mut self, id: ElementId) -> Result<&mut Element, SimError> {
        self.scenario
            .elements_mut()
            .get_mut(id)
            .ok_or(SimError::UnknownElement(id))
    }

    /// Replace an element's state on the next commit.
    pub fn transform_element(&mut self, id: ElementId, state: ElementState) -> Result<(), SimError> {
        self.element_mut(id)?.transform_element(state);
        Ok(())
    }

    /// Move an element on the next commit.
    pub fn transport_element(&mut self, id: ElementId, location: Location) -> Result<(), SimError> {
        self.element_mut(id)?.transport_element(location);
        Ok(())
    }

    /// Place `child` inside `parent` on the next commit. Storing an element
    /// in itself releases it from its parent.
    pub fn store_element(&mut self, child: ElementId, parent: ElementId) -> Result<(), SimError> {
        if child == parent {
            self.element_mut(child)?.release_element();
            return Ok(());
        }
        let parent_location = self
            .scenario
            .element(parent)
            .map(Element::location)
            .ok_or(SimError::UnknownElement(parent))?;
        self.element_mut(child)?
            .store_element(parent, parent_location)?;
        Ok(())
    }

    /// Rates of a remote proxy, for a federation layer to inject into.
    pub fn remote_state_mut(&mut self, id: ElementId) -> Result<&mut RemoteState, SimError> {
        let element = self.element_mut(id)?;
        let name = element.name().to_string();
        element
            .state_mut()
            .as_remote_mut()
            .ok_or(SimError::NotRemote(name))
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn on_event(&mut self, listener: PassiveListener) {
        self.events.on_event(listener);
    }

    pub fn suppress_event(&mut self, kind: EventKind) {
        self.events.suppress(kind);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Owned view of the committed state after the last step.
    pub fn snapshot(&self) -> StepSnapshot {
        let elements = self.scenario.elements();
        let element_snapshots = elements
            .iter()
            .map(|(id, e)| ElementSnapshot {
                id,
                name: e.name().to_string(),
                location: e.location(),
                parent_name: e
                    .parent()
                    .and_then(|p| elements.get(p))
                    .map_or_else(|| e.name().to_string(), |p| p.name().to_string()),
                stock: e.stock(),
                rates: RateSnapshot::of(e, self.last_time_step),
            })
            .collect();
        let node_snapshots = self
            .scenario
            .nodes()
            .map(|(id, n)| NodeSnapshot {
                id,
                name: n.name.clone(),
                net_flow: self
                    .last_net_flows
                    .get(id)
                    .copied()
                    .unwrap_or(ResourceVector::ZERO),
            })
            .collect();

        StepSnapshot {
            time: self.time,
            elements: element_snapshots,
            nodes: node_snapshots,
        }
    }

    /// Hash of the clock and every element's committed values. Identical
    /// runs of the same scenario produce identical hashes.
    pub fn state_hash(&self) -> u64 {
        let mut hash = StateHash::new();
        hash.write_u64(self.time);
        for (id, e) in self.scenario.elements() {
            hash.write_u64(id.data().as_ffi());
            hash.write_vector(&e.stock());
            let location = e.location();
            hash.write_u64(location.origin.data().as_ffi());
            hash.write_u64(location.destination.data().as_ffi());
            hash.write_u64(e.parent().map_or(0, |p| p.data().as_ffi()));
            let rates = RateSnapshot::of(e, 1);
            hash.write_vector(&rates.sending);
            hash.write_vector(&rates.receiving);
            hash.write_vector(&rates.input);
            hash.write_vector(&rates.output);
        }
        hash.finish()
    }
}

fn log_violation(time: Ticks, violation: &Violation) {
    match violation {
        Violation::NetFlow { node_name, net, .. } => {
            tracing::warn!(time, node = %node_name, net = %net, "net flow at node is not zero");
        }
        Violation::Asymmetric {
            a_name,
            b_name,
            mismatch,
            ..
        } => {
            tracing::warn!(
                time,
                a = %a_name,
                b = %b_name,
                mismatch = %mismatch,
                magnitude = %violation.magnitude(),
                "bilateral exchange is asymmetric"
            );
        }
    }
}
