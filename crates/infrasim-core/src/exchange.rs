//! Supplier/customer negotiation.
//!
//! An exchanging element is at once a customer of up to one supplier per
//! resource kind and a supplier to any number of customers. Each round it
//! asks every customer "what do you want to receive from me?" and every
//! supplier "what will you send me?", stages the answers, and publishes them
//! on the following tock. Nobody reads anybody's internals; repeated rounds
//! let mutually dependent rates settle on a consistent fixed point.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::ElementId;
use crate::resource::{ResourceKind, ResourceVector};
use crate::state::{PeerView, Proposal};

/// How an exchanging element decides what it wants to receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExchangeRole {
    /// Sends from its own stock whatever customers ask for; asks for nothing.
    Source,
    /// Asks its suppliers for exactly what its customers currently ask of
    /// it, so that flows pass straight through.
    Relay,
    /// Asks its suppliers for a fixed per-tick demand.
    Consumer { demand: ResourceVector },
}

/// Negotiation state for the exchanging variant. All quantities are per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangingState {
    role: ExchangeRole,
    suppliers: BTreeMap<ResourceKind, ElementId>,
    customers: Vec<ElementId>,
    /// Customer -> quantity owed to it (published).
    demand: BTreeMap<ElementId, ResourceVector>,
    /// Supplier -> quantity it promises (published).
    supply: BTreeMap<ElementId, ResourceVector>,
    next_demand: BTreeMap<ElementId, ResourceVector>,
    next_supply: BTreeMap<ElementId, ResourceVector>,
}

impl ExchangingState {
    pub fn new(role: ExchangeRole) -> Self {
        Self {
            role,
            suppliers: BTreeMap::new(),
            customers: Vec::new(),
            demand: BTreeMap::new(),
            supply: BTreeMap::new(),
            next_demand: BTreeMap::new(),
            next_supply: BTreeMap::new(),
        }
    }

    pub fn source() -> Self {
        Self::new(ExchangeRole::Source)
    }

    pub fn relay() -> Self {
        Self::new(ExchangeRole::Relay)
    }

    pub fn consumer(demand: ResourceVector) -> Self {
        Self::new(ExchangeRole::Consumer { demand })
    }

    pub fn role(&self) -> &ExchangeRole {
        &self.role
    }

    // -----------------------------------------------------------------------
    // Wiring
    // -----------------------------------------------------------------------

    /// Register `supplier` as the source of `kind`, replacing any previous
    /// supplier of that kind.
    pub fn set_supplier(&mut self, kind: ResourceKind, supplier: ElementId) {
        self.suppliers.insert(kind, supplier);
    }

    pub fn add_customer(&mut self, customer: ElementId) {
        if !self.customers.contains(&customer) {
            self.customers.push(customer);
        }
    }

    pub fn supplier_of(&self, kind: ResourceKind) -> Option<ElementId> {
        self.suppliers.get(&kind).copied()
    }

    pub fn suppliers(&self) -> impl Iterator<Item = (ResourceKind, ElementId)> + '_ {
        self.suppliers.iter().map(|(&k, &s)| (k, s))
    }

    pub fn customers(&self) -> &[ElementId] {
        &self.customers
    }

    pub(crate) fn counterparts(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.suppliers.values().copied().chain(self.customers.iter().copied())
    }

    fn supplied_kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.suppliers.keys().copied()
    }

    // -----------------------------------------------------------------------
    // Rates (per tick)
    // -----------------------------------------------------------------------

    /// Published quantity owed to `counterpart`; zero if it is not a customer.
    pub fn sending_rate_to(&self, counterpart: ElementId) -> ResourceVector {
        self.demand
            .get(&counterpart)
            .copied()
            .unwrap_or(ResourceVector::ZERO)
    }

    pub fn sending_rate(&self) -> ResourceVector {
        self.customers
            .iter()
            .map(|&c| self.sending_rate_to(c))
            .sum()
    }

    /// What this element wants before restricting to kinds it has a
    /// supplier for.
    fn wanted(&self) -> ResourceVector {
        match &self.role {
            ExchangeRole::Source => ResourceVector::ZERO,
            ExchangeRole::Relay => self.sending_rate(),
            ExchangeRole::Consumer { demand } => *demand,
        }
    }

    /// Total receiving rate: the wanted quantity of every supplied kind.
    /// Kinds without a supplier are never received.
    pub fn receiving_rate(&self) -> ResourceVector {
        let wanted = self.wanted();
        self.supplied_kinds().map(|k| wanted.project(k)).sum()
    }

    /// The share of [`Self::receiving_rate`] for every kind `counterpart`
    /// supplies; zero if it supplies nothing to this element.
    pub fn receiving_rate_from(&self, counterpart: ElementId) -> ResourceVector {
        let total = self.receiving_rate();
        self.suppliers
            .iter()
            .filter(|&(_, &s)| s == counterpart)
            .map(|(&k, _)| total.project(k))
            .sum()
    }

    /// Published quantity `supplier` promised to send.
    pub fn expected_supply_from(&self, supplier: ElementId) -> ResourceVector {
        self.supply
            .get(&supplier)
            .copied()
            .unwrap_or(ResourceVector::ZERO)
    }

    /// Suppliers whose published promise differs from what this state
    /// receives from them, in supplier order without repeats.
    pub fn unsettled_suppliers(&self) -> Vec<ElementId> {
        let mut out: Vec<ElementId> = Vec::new();
        for &s in self.suppliers.values() {
            if !out.contains(&s) && self.expected_supply_from(s) != self.receiving_rate_from(s) {
                out.push(s);
            }
        }
        out
    }

    /// True when every supplier promises exactly what is asked of it.
    pub fn is_settled(&self) -> bool {
        self.unsettled_suppliers().is_empty()
    }

    // -----------------------------------------------------------------------
    // Negotiation
    // -----------------------------------------------------------------------

    pub(crate) fn propose<P: PeerView + ?Sized>(&self, me: ElementId, peers: &P) -> Proposal {
        let demand = self
            .customers
            .iter()
            .map(|&c| (c, peers.receiving_rate_from(c, me)))
            .collect();
        let supply = self
            .suppliers
            .values()
            .map(|&s| (s, peers.sending_rate_to(s, me)))
            .collect();
        Proposal::Exchange { demand, supply }
    }

    pub(crate) fn stage(
        &mut self,
        demand: BTreeMap<ElementId, ResourceVector>,
        supply: BTreeMap<ElementId, ResourceVector>,
    ) {
        self.next_demand = demand;
        self.next_supply = supply;
    }

    pub(crate) fn publish(&mut self) {
        self.demand.clone_from(&self.next_demand);
        self.supply.clone_from(&self.next_supply);
    }
}
