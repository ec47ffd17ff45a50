//! Elements: named agents with a location, a parent, a stock and a state.
//!
//! Every mutable field exists twice. The *current* copy is what peers and
//! observers see; the *shadow* copy is where a step writes. `tick` fills the
//! shadow stock from rates reported by the current state, and `tock`
//! publishes every shadow field at once, so within a step every element
//! reads a mutually consistent snapshot of its peers.

use slotmap::SlotMap;

use crate::fixed::{Fixed64, Ticks};
use crate::id::ElementId;
use crate::location::Location;
use crate::resource::{ResourceKind, ResourceVector};
use crate::state::{ElementState, PeerView, Proposal};
use crate::transport::{StorageState, TransportState};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElementError {
    /// A parent must sit at the same location as the element it contains.
    #[error("cannot store '{child}' at {child_location:?} in a parent at {parent_location:?}")]
    IncompatibleLocation {
        child: String,
        child_location: Location,
        parent_location: Location,
    },
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

/// Declared starting values restored by [`Element::initialize`].
#[derive(Debug, Clone, PartialEq)]
struct Initial {
    stock: ResourceVector,
    location: Location,
    parent: Option<ElementId>,
    state: ElementState,
}

/// A simulated agent. `parent == None` means the element is unparented.
#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    initial: Initial,

    stock: ResourceVector,
    location: Location,
    parent: Option<ElementId>,
    state: ElementState,

    next_stock: ResourceVector,
    next_location: Location,
    next_parent: Option<ElementId>,
    /// A state change staged by [`Element::transform_element`]. The current
    /// state carries negotiated values, so it is only replaced on request.
    next_state: Option<ElementState>,
}

impl Element {
    pub fn new(
        name: impl Into<String>,
        location: Location,
        stock: ResourceVector,
        state: ElementState,
    ) -> Self {
        Self {
            name: name.into(),
            initial: Initial {
                stock,
                location,
                parent: None,
                state: state.clone(),
            },
            stock,
            location,
            parent: None,
            state,
            next_stock: stock,
            next_location: location,
            next_parent: None,
            next_state: None,
        }
    }

    // -----------------------------------------------------------------------
    // Current (committed) values
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stock(&self) -> ResourceVector {
        self.stock
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn state(&self) -> &ElementState {
        &self.state
    }

    /// Mutable access to the current state, for injecting remote rates.
    pub fn state_mut(&mut self) -> &mut ElementState {
        &mut self.state
    }

    /// The stock `tick` computed, visible before `tock` publishes it.
    pub fn pending_stock(&self) -> ResourceVector {
        self.next_stock
    }

    pub fn initial_stock(&self) -> ResourceVector {
        self.initial.stock
    }

    // -----------------------------------------------------------------------
    // Declaration (scenario construction only)
    // -----------------------------------------------------------------------

    pub(crate) fn declared_state_mut(&mut self) -> &mut ElementState {
        &mut self.initial.state
    }

    pub(crate) fn declare_parent(&mut self, parent: Option<ElementId>) {
        self.initial.parent = parent;
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Reset current and shadow fields to the declared initial values.
    pub fn initialize(&mut self, start_time: Ticks) {
        let Initial {
            stock,
            location,
            parent,
            state,
        } = self.initial.clone();
        self.stock = stock;
        self.location = location;
        self.parent = parent;
        self.state = state;
        self.next_stock = stock;
        self.next_location = location;
        self.next_parent = parent;
        self.next_state = None;
        tracing::trace!(element = %self.name, start_time, "initialized");
    }

    /// Compute the shadow stock for `duration` from the current state's
    /// rates. Only the shadow stock changes.
    pub fn tick(&mut self, duration: Ticks) {
        let s = &self.state;
        self.next_stock = self
            .stock
            .add(&s.storage_rate(duration))
            .subtract(&s.retrieval_rate(duration))
            .add(&s.production_rate(duration))
            .subtract(&s.consumption_rate(duration))
            .add(&s.input_rate(duration))
            .subtract(&s.output_rate(duration))
            .add(&s.receiving_rate(duration))
            .subtract(&s.sending_rate(duration));
    }

    /// Publish every shadow field as current.
    pub fn tock(&mut self) {
        self.stock = self.next_stock;
        self.location = self.next_location;
        self.parent = self.next_parent;
        if let Some(state) = self.next_state.take() {
            self.state = state;
        }
    }

    // -----------------------------------------------------------------------
    // Staged changes
    // -----------------------------------------------------------------------

    /// Replace the state on the next `tock`.
    pub fn transform_element(&mut self, state: ElementState) {
        self.next_state = Some(state);
    }

    /// Move the element on the next `tock`.
    pub fn transport_element(&mut self, location: Location) {
        self.next_location = location;
    }

    /// Place the element inside `parent` on the next `tock`.
    ///
    /// Fails if the parent's current location differs from this element's
    /// current location.
    pub fn store_element(
        &mut self,
        parent: ElementId,
        parent_location: Location,
    ) -> Result<(), ElementError> {
        if parent_location != self.location {
            return Err(ElementError::IncompatibleLocation {
                child: self.name.clone(),
                child_location: self.location,
                parent_location,
            });
        }
        self.next_parent = Some(parent);
        Ok(())
    }

    /// Remove the element from its parent on the next `tock`.
    pub fn release_element(&mut self) {
        self.next_parent = None;
    }

    // -----------------------------------------------------------------------
    // Negotiation
    // -----------------------------------------------------------------------

    /// Read-only half of `iterate_tick`.
    pub fn propose<P: PeerView + ?Sized>(
        &self,
        me: ElementId,
        peers: &P,
        duration: Ticks,
    ) -> Proposal {
        self.state.propose(me, peers, duration)
    }

    /// Write half of `iterate_tick`: stage a proposal in the current state.
    pub fn iterate_tick(&mut self, proposal: Proposal) {
        self.state.stage(proposal);
    }

    pub fn iterate_tock(&mut self) {
        self.state.iterate_tock();
    }
}

// ---------------------------------------------------------------------------
// Arena as peer view
// ---------------------------------------------------------------------------

const UNIT: Ticks = 1;

impl PeerView for SlotMap<ElementId, Element> {
    fn sending_rate_to(&self, from: ElementId, to: ElementId) -> ResourceVector {
        self.get(from)
            .map_or(ResourceVector::ZERO, |e| e.state.sending_rate_to(to, UNIT))
    }

    fn receiving_rate_from(&self, at: ElementId, from: ElementId) -> ResourceVector {
        self.get(at)
            .map_or(ResourceVector::ZERO, |e| e.state.receiving_rate_from(from, UNIT))
    }

    fn input_rate(&self, id: ElementId, duration: Ticks) -> ResourceVector {
        self.get(id)
            .map_or(ResourceVector::ZERO, |e| e.state.input_rate(duration))
    }

    fn output_rate(&self, id: ElementId, duration: Ticks) -> ResourceVector {
        self.get(id)
            .map_or(ResourceVector::ZERO, |e| e.state.output_rate(duration))
    }

    fn outbound_links(&self, id: ElementId) -> &[ElementId] {
        self.get(id)
            .and_then(|e| e.state.as_storage())
            .map(StorageState::outbound)
            .unwrap_or(&[])
    }

    fn transport(&self, id: ElementId) -> Option<&TransportState> {
        self.get(id).and_then(|e| e.state.as_transport())
    }

    fn surplus(&self, id: ElementId, kind: ResourceKind) -> Fixed64 {
        self.get(id)
            .map_or(Fixed64::ZERO, |e| e.state.surplus(&e.stock, kind))
    }

    fn deficit(&self, id: ElementId, kind: ResourceKind) -> Fixed64 {
        self.get(id)
            .map_or(Fixed64::ZERO, |e| e.state.deficit(&e.stock, kind))
    }
}
