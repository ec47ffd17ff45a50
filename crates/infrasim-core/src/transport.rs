//! Capacity-limited transport between storage depots.
//!
//! A transport element (pipeline, power line, tanker route) connects an
//! origin depot to a destination depot and carries a single resource kind.
//! Depots learn their transport input/output by asking the transports
//! attached to them, so both sides of every link see the same flow.
//!
//! # Allocation policy
//!
//! Each round the carried quantity for the elapsed duration is
//! [`allocate_transport`]: the lesser of the origin's surplus and the
//! destination's deficit, truncated at zero, then clamped to the rated
//! capacity for the duration.
//!
//! A depot with several outbound links of the same kind hands out its
//! surplus in attachment order: each link sees only what the links attached
//! before it leave over. Inbound links each see the destination's whole
//! deficit, so several links into one depot may fill it past its target.
//!
//! Negotiated quantities are kept for the whole step rather than per tick,
//! so the amount a link draws and the amount it delivers stay identical for
//! any step length.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, Ticks, ticks_to_fixed64};
use crate::id::ElementId;
use crate::resource::{ResourceKind, ResourceVector};
use crate::state::{PeerView, Proposal};

// ---------------------------------------------------------------------------
// Allocation policy
// ---------------------------------------------------------------------------

/// Quantity a capacity-constrained bilateral link moves for one duration.
///
/// `min(surplus, deficit)`, then non-negative truncation, then the capacity
/// clamp, in that order.
pub fn allocate_transport(surplus: Fixed64, deficit: Fixed64, capacity: Fixed64) -> Fixed64 {
    let wanted = surplus.min(deficit);
    let wanted = if wanted > Fixed64::ZERO { wanted } else { Fixed64::ZERO };
    wanted.min(capacity)
}

// ---------------------------------------------------------------------------
// Step flow
// ---------------------------------------------------------------------------

/// A quantity agreed for a step of `span` ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFlow {
    quantity: ResourceVector,
    span: Ticks,
}

impl StepFlow {
    pub fn new(quantity: ResourceVector, span: Ticks) -> Self {
        Self { quantity, span }
    }

    /// The quantity as agreed, for [`Self::span`] ticks.
    pub fn quantity(&self) -> ResourceVector {
        self.quantity
    }

    pub fn span(&self) -> Ticks {
        self.span
    }

    /// The quantity moved over `duration` ticks.
    ///
    /// Exact when `duration` is the span it was agreed for; any other
    /// duration is rescaled proportionally.
    pub fn over(&self, duration: Ticks) -> ResourceVector {
        if duration == self.span {
            return self.quantity;
        }
        self.quantity
            .multiply(ticks_to_fixed64(duration))
            .checked_divide(ticks_to_fixed64(self.span))
            .unwrap_or(ResourceVector::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Transport state
// ---------------------------------------------------------------------------

/// State of a transport element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportState {
    /// The single resource kind this link carries.
    pub kind: ResourceKind,
    /// Rated capacity per tick.
    pub capacity: Fixed64,
    /// Depot the flow is drawn from (at the transport's origin).
    pub from_depot: ElementId,
    /// Depot the flow is delivered to (at the transport's destination).
    pub to_depot: ElementId,
    flow: StepFlow,
    next_flow: StepFlow,
}

impl TransportState {
    pub fn new(
        kind: ResourceKind,
        capacity: Fixed64,
        from_depot: ElementId,
        to_depot: ElementId,
    ) -> Self {
        Self {
            kind,
            capacity,
            from_depot,
            to_depot,
            flow: StepFlow::default(),
            next_flow: StepFlow::default(),
        }
    }

    /// Published flow.
    pub fn flow(&self) -> StepFlow {
        self.flow
    }

    /// Published flow over `duration` ticks, as a vector of the carried kind.
    pub fn carried(&self, duration: Ticks) -> ResourceVector {
        self.flow.over(duration)
    }

    /// What this link would move out of `surplus` for `duration`, given its
    /// destination's committed deficit.
    fn allocate<P: PeerView + ?Sized>(&self, surplus: Fixed64, peers: &P, duration: Ticks) -> Fixed64 {
        allocate_transport(
            surplus,
            peers.deficit(self.to_depot, self.kind),
            self.capacity.saturating_mul(ticks_to_fixed64(duration)),
        )
    }

    pub(crate) fn propose<P: PeerView + ?Sized>(
        &self,
        me: ElementId,
        peers: &P,
        duration: Ticks,
    ) -> Proposal {
        let mut surplus = peers.surplus(self.from_depot, self.kind);
        for &link in peers.outbound_links(self.from_depot) {
            if link == me {
                break;
            }
            if let Some(sibling) = peers.transport(link).filter(|t| t.kind == self.kind) {
                surplus = surplus.saturating_sub(sibling.allocate(surplus, peers, duration));
            }
        }
        let moved = self.allocate(surplus, peers, duration);
        Proposal::Transport {
            flow: StepFlow::new(ResourceVector::of(self.kind, moved), duration),
        }
    }

    pub(crate) fn stage(&mut self, flow: StepFlow) {
        self.next_flow = flow;
    }

    pub(crate) fn publish(&mut self) {
        self.flow = self.next_flow;
    }
}

// ---------------------------------------------------------------------------
// Storage depot state
// ---------------------------------------------------------------------------

/// A depot holding stock between a reserve floor and a target level.
///
/// Its transport input is the sum of what its inbound transports deliver;
/// its output is the sum of what its outbound transports draw. Both are
/// re-read every round, one round behind the transports, so a step needs at
/// least two rounds for depots to agree with their links.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    /// Stock the depot keeps for itself and never offers.
    pub reserve: ResourceVector,
    /// Stock level the depot tries to reach.
    pub target: ResourceVector,
    pub(crate) inbound: Vec<ElementId>,
    pub(crate) outbound: Vec<ElementId>,
    input: StepFlow,
    output: StepFlow,
    next_input: StepFlow,
    next_output: StepFlow,
}

impl StorageState {
    pub fn new(reserve: ResourceVector, target: ResourceVector) -> Self {
        Self {
            reserve,
            target,
            ..Self::default()
        }
    }

    pub fn inbound(&self) -> &[ElementId] {
        &self.inbound
    }

    /// Outbound links in attachment order, which is the order they share
    /// the surplus in.
    pub fn outbound(&self) -> &[ElementId] {
        &self.outbound
    }

    pub(crate) fn attach_inbound(&mut self, transport: ElementId) {
        if !self.inbound.contains(&transport) {
            self.inbound.push(transport);
        }
    }

    pub(crate) fn attach_outbound(&mut self, transport: ElementId) {
        if !self.outbound.contains(&transport) {
            self.outbound.push(transport);
        }
    }

    /// Published transport input over `duration` ticks.
    pub fn input(&self, duration: Ticks) -> ResourceVector {
        self.input.over(duration)
    }

    /// Published transport output over `duration` ticks.
    pub fn output(&self, duration: Ticks) -> ResourceVector {
        self.output.over(duration)
    }

    pub fn surplus(&self, stock: &ResourceVector, kind: ResourceKind) -> Fixed64 {
        stock.get(kind).saturating_sub(self.reserve.get(kind))
    }

    pub fn deficit(&self, stock: &ResourceVector, kind: ResourceKind) -> Fixed64 {
        self.target.get(kind).saturating_sub(stock.get(kind))
    }

    pub(crate) fn propose<P: PeerView + ?Sized>(&self, peers: &P, duration: Ticks) -> Proposal {
        let input = self
            .inbound
            .iter()
            .map(|&t| peers.output_rate(t, duration))
            .sum();
        let output = self
            .outbound
            .iter()
            .map(|&t| peers.input_rate(t, duration))
            .sum();
        Proposal::Storage {
            input: StepFlow::new(input, duration),
            output: StepFlow::new(output, duration),
        }
    }

    pub(crate) fn stage(&mut self, input: StepFlow, output: StepFlow) {
        self.next_input = input;
        self.next_output = output;
    }

    pub(crate) fn publish(&mut self) {
        self.input = self.next_input;
        self.output = self.next_output;
    }
}
