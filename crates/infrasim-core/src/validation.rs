//! Per-step consistency verification.
//!
//! Two checks run after negotiation and before a step is committed:
//!
//! - **Net flow**: at every node, transport output delivered there minus
//!   transport input drawn from there must be zero.
//! - **Bilateral symmetry**: for every pair of elements, the net exchange
//!   each reports with the other must be exact negations.
//!
//! The report also lists exchanges whose supplier has not yet promised what
//! its customer takes. These are normal while a chain is still converging,
//! so they are informational and never count as violations.
//!
//! Failures are scenario-modeling defects (for example a negotiation chain
//! longer than the configured rounds), not kernel faults: they are logged and
//! reported, never raised.

use slotmap::{SecondaryMap, SlotMap};

use crate::element::Element;
use crate::fixed::{NumericContext, Ticks};
use crate::id::{ElementId, NodeId};
use crate::resource::ResourceVector;
use crate::scenario::Node;

// ---------------------------------------------------------------------------
// Violation types
// ---------------------------------------------------------------------------

/// A single failed consistency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Flow into a node does not match flow out of it.
    NetFlow {
        node: NodeId,
        node_name: String,
        net: ResourceVector,
    },
    /// `a` and `b` disagree about what they exchange. `mismatch` is the sum
    /// of both net exchanges, which is zero when they agree.
    Asymmetric {
        a: ElementId,
        b: ElementId,
        a_name: String,
        b_name: String,
        mismatch: ResourceVector,
    },
}

impl Violation {
    /// Size of the discrepancy, as the largest absolute component.
    pub fn magnitude(&self) -> crate::fixed::Fixed64 {
        match self {
            Violation::NetFlow { net, .. } => net.magnitude(),
            Violation::Asymmetric { mismatch, .. } => mismatch.magnitude(),
        }
    }
}

/// Result of verifying one step.
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    /// Net transport flow at every node for the step duration.
    pub net_flows: SecondaryMap<NodeId, ResourceVector>,
    pub violations: Vec<Violation>,
    /// `(customer, supplier)` pairs whose negotiation has not settled.
    pub unsettled: Vec<(ElementId, ElementId)>,
}

impl VerificationReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Net transport flow at every node over `duration`.
///
/// An element's output is delivered at its destination; its input is drawn
/// from its origin.
pub fn net_flows(
    nodes: &SlotMap<NodeId, Node>,
    elements: &SlotMap<ElementId, Element>,
    duration: Ticks,
) -> SecondaryMap<NodeId, ResourceVector> {
    let mut flows: SecondaryMap<NodeId, ResourceVector> = SecondaryMap::new();
    for node in nodes.keys() {
        flows.insert(node, ResourceVector::ZERO);
    }
    for element in elements.values() {
        let location = element.location();
        let state = element.state();
        if let Some(net) = flows.get_mut(location.destination) {
            *net = net.add(&state.output_rate(duration));
        }
        if let Some(net) = flows.get_mut(location.origin) {
            *net = net.subtract(&state.input_rate(duration));
        }
    }
    flows
}

/// Pairs of elements whose reported net exchanges are not exact negations.
pub fn asymmetric_exchanges(
    elements: &SlotMap<ElementId, Element>,
    duration: Ticks,
    ctx: &NumericContext,
) -> Vec<Violation> {
    let entries: Vec<(ElementId, &Element)> = elements.iter().collect();
    let mut violations = Vec::new();

    for (i, &(a, ea)) in entries.iter().enumerate() {
        for &(b, eb) in &entries[i + 1..] {
            let a_to_b = ea.state().net_exchange_with(b, duration);
            let b_to_a = eb.state().net_exchange_with(a, duration);
            let mismatch = a_to_b.add(&b_to_a);
            if !mismatch.is_zero(ctx) {
                violations.push(Violation::Asymmetric {
                    a,
                    b,
                    a_name: ea.name().to_string(),
                    b_name: eb.name().to_string(),
                    mismatch,
                });
            }
        }
    }
    violations
}

/// `(customer, supplier)` pairs where the supplier's published promise
/// differs from what the customer receives.
pub fn unsettled_exchanges(elements: &SlotMap<ElementId, Element>) -> Vec<(ElementId, ElementId)> {
    elements
        .iter()
        .filter_map(|(id, e)| e.state().as_exchanging().map(|x| (id, x)))
        .flat_map(|(id, x)| x.unsettled_suppliers().into_iter().map(move |s| (id, s)))
        .collect()
}

/// Run every check for a step of `duration` against committed values.
pub fn verify(
    nodes: &SlotMap<NodeId, Node>,
    elements: &SlotMap<ElementId, Element>,
    duration: Ticks,
    ctx: &NumericContext,
) -> VerificationReport {
    let net_flows = net_flows(nodes, elements, duration);
    let mut violations: Vec<Violation> = net_flows
        .iter()
        .filter(|(_, net)| !net.is_zero(ctx))
        .map(|(node, net)| Violation::NetFlow {
            node,
            node_name: nodes.get(node).map(|n| n.name.clone()).unwrap_or_default(),
            net: *net,
        })
        .collect();
    violations.extend(asymmetric_exchanges(elements, duration, ctx));

    VerificationReport {
        net_flows,
        violations,
        unsettled: unsettled_exchanges(elements),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64;
    use crate::location::Location;
    use crate::resource::ResourceKind;
    use crate::exchange::ExchangingState;
    use crate::state::{ElementState, RemoteState};

    fn w(v: f64) -> ResourceVector {
        ResourceVector::of(ResourceKind::Water, f64_to_fixed64(v))
    }

    #[test]
    fn empty_nodes_have_zero_flow() {
        let mut nodes: SlotMap<NodeId, Node> = SlotMap::with_key();
        let a = nodes.insert(Node { name: "a".into() });
        let elements: SlotMap<ElementId, Element> = SlotMap::with_key();

        let report = verify(&nodes, &elements, 1, &NumericContext::default());
        assert!(report.is_consistent());
        assert_eq!(report.net_flows[a], ResourceVector::ZERO);
    }

    #[test]
    fn one_sided_remote_claim_is_reported() {
        let mut nodes: SlotMap<NodeId, Node> = SlotMap::with_key();
        let a = nodes.insert(Node { name: "a".into() });
        let mut elements: SlotMap<ElementId, Element> = SlotMap::with_key();

        let local = elements.insert(Element::new("local", Location::at(a), w(0.0), ElementState::Idle));
        let mut remote = RemoteState::new();
        remote.inject_sending_rate_to(local, w(2.0));
        elements.insert(Element::new(
            "remote",
            Location::at(a),
            w(0.0),
            ElementState::Remote(remote),
        ));

        let report = verify(&nodes, &elements, 3, &NumericContext::default());
        assert_eq!(report.violations.len(), 1);
        let violation = &report.violations[0];
        assert!(matches!(violation, Violation::Asymmetric { .. }));
        assert_eq!(violation.magnitude(), f64_to_fixed64(6.0));
    }

    #[test]
    fn matching_remote_claims_are_symmetric() {
        let mut nodes: SlotMap<NodeId, Node> = SlotMap::with_key();
        let a = nodes.insert(Node { name: "a".into() });
        let mut elements: SlotMap<ElementId, Element> = SlotMap::with_key();

        let left = elements.insert(Element::new("left", Location::at(a), w(0.0), ElementState::Idle));
        let right = elements.insert(Element::new("right", Location::at(a), w(0.0), ElementState::Idle));

        let mut l = RemoteState::new();
        l.inject_sending_rate_to(right, w(2.0));
        let mut r = RemoteState::new();
        r.inject_receiving_rate_from(left, w(2.0));
        *elements[left].state_mut() = ElementState::Remote(l);
        *elements[right].state_mut() = ElementState::Remote(r);

        assert!(asymmetric_exchanges(&elements, 1, &NumericContext::default()).is_empty());
    }

    #[test]
    fn unanswered_demand_is_reported_as_unsettled() {
        let mut nodes: SlotMap<NodeId, Node> = SlotMap::with_key();
        let a = nodes.insert(Node { name: "a".into() });
        let mut elements: SlotMap<ElementId, Element> = SlotMap::with_key();

        let supplier = elements.insert(Element::new(
            "supplier",
            Location::at(a),
            w(10.0),
            ElementState::Exchanging(ExchangingState::source()),
        ));
        let mut consumer = ExchangingState::consumer(w(4.0));
        consumer.set_supplier(ResourceKind::Water, supplier);
        consumer.set_supplier(ResourceKind::Oil, supplier);
        let customer = elements.insert(Element::new(
            "customer",
            Location::at(a),
            w(0.0),
            ElementState::Exchanging(consumer),
        ));

        let unsettled = unsettled_exchanges(&elements);
        assert_eq!(unsettled, vec![(customer, supplier)]);

        // The supplier has not published a matching send, so the pair is
        // also asymmetric; unsettled pairs alone never add violations.
        let report = verify(&nodes, &elements, 1, &NumericContext::default());
        assert_eq!(report.unsettled, unsettled);
        assert_eq!(report.violations.len(), 1);
    }
}
