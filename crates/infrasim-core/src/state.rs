//! Element behavior: the rate contract and its variants.
//!
//! Every element carries an [`ElementState`] that reports flow rates for an
//! elapsed duration and takes part in the per-step negotiation rounds. The
//! set of behaviors is closed and uses **enum dispatch**, mirroring how
//! variants are selected once at construction and never inspected at
//! runtime.
//!
//! # Rate convention
//!
//! Exchange and process states hold per-tick rates; their accessors take
//! the elapsed `duration` and multiply by it, which is exact for whole
//! ticks. Transports and depots hold the quantity negotiated for the step
//! itself (see [`StepFlow`]), so their accessors return it unchanged for the
//! step's duration.
//!
//! Scaling saturates at the numeric range rather than overflowing.
//!
//! # Negotiation
//!
//! A negotiation round is split in two so that no element ever reads a
//! peer's staged values:
//!
//! 1. [`ElementState::propose`] reads only committed peer values through a
//!    [`PeerView`] and returns a [`Proposal`]; the caller then hands it back
//!    to [`ElementState::stage`] (together these form `iterate_tick`).
//! 2. [`ElementState::iterate_tock`] publishes staged values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::exchange::ExchangingState;
use crate::fixed::{Fixed64, Ticks, ticks_to_fixed64};
use crate::id::ElementId;
use crate::resource::{ResourceKind, ResourceVector};
use crate::transport::{StepFlow, StorageState, TransportState};

// ---------------------------------------------------------------------------
// Peer view
// ---------------------------------------------------------------------------

/// Read-only access to the committed state of other elements.
///
/// Exchange rates returned here are per tick (duration 1). Implemented by
/// the element arena; a federation layer can implement it for remote
/// proxies.
pub trait PeerView {
    /// What `from` currently reports sending to `to`.
    fn sending_rate_to(&self, from: ElementId, to: ElementId) -> ResourceVector;

    /// What `at` currently reports receiving from `from`.
    fn receiving_rate_from(&self, at: ElementId, from: ElementId) -> ResourceVector;

    /// Transport input of `id` over `duration` ticks.
    fn input_rate(&self, id: ElementId, duration: Ticks) -> ResourceVector;

    /// Transport output of `id` over `duration` ticks.
    fn output_rate(&self, id: ElementId, duration: Ticks) -> ResourceVector;

    /// Outbound transport links of depot `id`, in attachment order.
    fn outbound_links(&self, id: ElementId) -> &[ElementId];

    fn transport(&self, id: ElementId) -> Option<&TransportState>;

    /// Quantity of `kind` that `id` can give up without dropping below its
    /// reserve level.
    fn surplus(&self, id: ElementId, kind: ResourceKind) -> Fixed64;

    /// Quantity of `kind` that `id` is short of its target level.
    fn deficit(&self, id: ElementId, kind: ResourceKind) -> Fixed64;
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// Values computed by [`ElementState::propose`], staged by
/// [`ElementState::stage`]. Variants match the state variants that negotiate.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    /// The state does not negotiate.
    Nothing,
    Exchange {
        demand: BTreeMap<ElementId, ResourceVector>,
        supply: BTreeMap<ElementId, ResourceVector>,
    },
    Transport {
        flow: StepFlow,
    },
    Storage {
        input: StepFlow,
        output: StepFlow,
    },
}

// ---------------------------------------------------------------------------
// Simple variants
// ---------------------------------------------------------------------------

/// A non-negotiating producer/consumer with constant per-tick rates.
///
/// Production and consumption create and destroy resources, so scenarios
/// containing a `Process` are not closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessState {
    pub production: ResourceVector,
    pub consumption: ResourceVector,
    pub storage: ResourceVector,
    pub retrieval: ResourceVector,
}

/// A stand-in for an element owned by a remote simulation.
///
/// The federation layer injects the rates the remote side reports; the
/// kernel queries them exactly like a local element's.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteState {
    sending: BTreeMap<ElementId, ResourceVector>,
    receiving: BTreeMap<ElementId, ResourceVector>,
}

impl RemoteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the per-tick rate the remote element sends to `counterpart`.
    pub fn inject_sending_rate_to(&mut self, counterpart: ElementId, rate: ResourceVector) {
        self.sending.insert(counterpart, rate);
    }

    /// Record the per-tick rate the remote element receives from `counterpart`.
    pub fn inject_receiving_rate_from(&mut self, counterpart: ElementId, rate: ResourceVector) {
        self.receiving.insert(counterpart, rate);
    }

    pub fn clear(&mut self) {
        self.sending.clear();
        self.receiving.clear();
    }

    fn counterparts(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.sending.keys().chain(self.receiving.keys()).copied()
    }
}

// ---------------------------------------------------------------------------
// Element state
// ---------------------------------------------------------------------------

/// Behavior attached to an element. See the module docs for the rate
/// convention and negotiation protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ElementState {
    /// Every rate is zero; negotiation hooks do nothing.
    #[default]
    Idle,
    Process(ProcessState),
    Exchanging(ExchangingState),
    Transport(TransportState),
    Storage(StorageState),
    Remote(RemoteState),
}

#[inline]
fn scaled(rate: ResourceVector, duration: Ticks) -> ResourceVector {
    rate.multiply(ticks_to_fixed64(duration))
}

impl ElementState {
    // -- per-tick rates --

    fn sending_per_tick(&self) -> ResourceVector {
        match self {
            ElementState::Exchanging(x) => x.sending_rate(),
            ElementState::Remote(r) => r.sending.values().copied().sum(),
            _ => ResourceVector::ZERO,
        }
    }

    fn sending_to_per_tick(&self, counterpart: ElementId) -> ResourceVector {
        match self {
            ElementState::Exchanging(x) => x.sending_rate_to(counterpart),
            ElementState::Remote(r) => r
                .sending
                .get(&counterpart)
                .copied()
                .unwrap_or(ResourceVector::ZERO),
            _ => ResourceVector::ZERO,
        }
    }

    fn receiving_per_tick(&self) -> ResourceVector {
        match self {
            ElementState::Exchanging(x) => x.receiving_rate(),
            ElementState::Remote(r) => r.receiving.values().copied().sum(),
            _ => ResourceVector::ZERO,
        }
    }

    fn receiving_from_per_tick(&self, counterpart: ElementId) -> ResourceVector {
        match self {
            ElementState::Exchanging(x) => x.receiving_rate_from(counterpart),
            ElementState::Remote(r) => r
                .receiving
                .get(&counterpart)
                .copied()
                .unwrap_or(ResourceVector::ZERO),
            _ => ResourceVector::ZERO,
        }
    }

    fn process(&self) -> Option<&ProcessState> {
        match self {
            ElementState::Process(p) => Some(p),
            _ => None,
        }
    }

    // -- duration-scaled accessors --

    pub fn input_rate(&self, duration: Ticks) -> ResourceVector {
        match self {
            ElementState::Transport(t) => t.carried(duration),
            ElementState::Storage(s) => s.input(duration),
            _ => ResourceVector::ZERO,
        }
    }

    pub fn output_rate(&self, duration: Ticks) -> ResourceVector {
        match self {
            ElementState::Transport(t) => t.carried(duration),
            ElementState::Storage(s) => s.output(duration),
            _ => ResourceVector::ZERO,
        }
    }

    pub fn production_rate(&self, duration: Ticks) -> ResourceVector {
        scaled(self.process().map_or(ResourceVector::ZERO, |p| p.production), duration)
    }

    pub fn consumption_rate(&self, duration: Ticks) -> ResourceVector {
        scaled(self.process().map_or(ResourceVector::ZERO, |p| p.consumption), duration)
    }

    pub fn storage_rate(&self, duration: Ticks) -> ResourceVector {
        scaled(self.process().map_or(ResourceVector::ZERO, |p| p.storage), duration)
    }

    pub fn retrieval_rate(&self, duration: Ticks) -> ResourceVector {
        scaled(self.process().map_or(ResourceVector::ZERO, |p| p.retrieval), duration)
    }

    pub fn sending_rate(&self, duration: Ticks) -> ResourceVector {
        scaled(self.sending_per_tick(), duration)
    }

    pub fn sending_rate_to(&self, counterpart: ElementId, duration: Ticks) -> ResourceVector {
        scaled(self.sending_to_per_tick(counterpart), duration)
    }

    pub fn receiving_rate(&self, duration: Ticks) -> ResourceVector {
        scaled(self.receiving_per_tick(), duration)
    }

    pub fn receiving_rate_from(&self, counterpart: ElementId, duration: Ticks) -> ResourceVector {
        scaled(self.receiving_from_per_tick(counterpart), duration)
    }

    /// Net exchange with `counterpart`: what this state sends it minus what
    /// it receives from it.
    pub fn net_exchange_with(&self, counterpart: ElementId, duration: Ticks) -> ResourceVector {
        self.sending_rate_to(counterpart, duration)
            .subtract(&self.receiving_rate_from(counterpart, duration))
    }

    // -- depot levels --

    /// See [`PeerView::surplus`]. Non-depot elements offer their whole stock.
    pub fn surplus(&self, stock: &ResourceVector, kind: ResourceKind) -> Fixed64 {
        match self {
            ElementState::Storage(s) => s.surplus(stock, kind),
            _ => stock.get(kind),
        }
    }

    /// See [`PeerView::deficit`]. Non-depot elements want nothing.
    pub fn deficit(&self, stock: &ResourceVector, kind: ResourceKind) -> Fixed64 {
        match self {
            ElementState::Storage(s) => s.deficit(stock, kind),
            _ => Fixed64::ZERO,
        }
    }

    // -- negotiation --

    /// Compute this round's proposal from committed peer values only.
    pub fn propose<P: PeerView + ?Sized>(
        &self,
        me: ElementId,
        peers: &P,
        duration: Ticks,
    ) -> Proposal {
        match self {
            ElementState::Exchanging(x) => x.propose(me, peers),
            ElementState::Transport(t) => t.propose(me, peers, duration),
            ElementState::Storage(s) => s.propose(peers, duration),
            ElementState::Idle | ElementState::Process(_) | ElementState::Remote(_) => {
                Proposal::Nothing
            }
        }
    }

    /// Stage a proposal without publishing it. Proposals that do not match
    /// the variant are ignored.
    pub fn stage(&mut self, proposal: Proposal) {
        match (self, proposal) {
            (ElementState::Exchanging(x), Proposal::Exchange { demand, supply }) => {
                x.stage(demand, supply);
            }
            (ElementState::Transport(t), Proposal::Transport { flow }) => t.stage(flow),
            (ElementState::Storage(s), Proposal::Storage { input, output }) => {
                s.stage(input, output);
            }
            _ => {}
        }
    }

    /// Publish staged values as the basis for subsequent rate queries.
    pub fn iterate_tock(&mut self) {
        match self {
            ElementState::Exchanging(x) => x.publish(),
            ElementState::Transport(t) => t.publish(),
            ElementState::Storage(s) => s.publish(),
            ElementState::Idle | ElementState::Process(_) | ElementState::Remote(_) => {}
        }
    }

    /// Whether this variant takes part in negotiation rounds.
    pub fn negotiates(&self) -> bool {
        matches!(
            self,
            ElementState::Exchanging(_) | ElementState::Transport(_) | ElementState::Storage(_)
        )
    }

    /// Every element this state refers to.
    pub fn referenced_elements(&self) -> Vec<ElementId> {
        match self {
            ElementState::Exchanging(x) => x.counterparts().collect(),
            ElementState::Transport(t) => vec![t.from_depot, t.to_depot],
            ElementState::Storage(s) => s.inbound.iter().chain(s.outbound.iter()).copied().collect(),
            ElementState::Remote(r) => r.counterparts().collect(),
            ElementState::Idle | ElementState::Process(_) => Vec::new(),
        }
    }

    pub fn as_exchanging(&self) -> Option<&ExchangingState> {
        match self {
            ElementState::Exchanging(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_storage(&self) -> Option<&StorageState> {
        match self {
            ElementState::Storage(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_exchanging_mut(&mut self) -> Option<&mut ExchangingState> {
        match self {
            ElementState::Exchanging(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_storage_mut(&mut self) -> Option<&mut StorageState> {
        match self {
            ElementState::Storage(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_remote_mut(&mut self) -> Option<&mut RemoteState> {
        match self {
            ElementState::Remote(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_transport(&self) -> Option<&TransportState> {
        match self {
            ElementState::Transport(t) => Some(t),
            _ => None,
        }
    }
}
