//! Scenario construction.
//!
//! A [`Scenario`] is the immutable starting point of a run: its name, start
//! time, the named nodes locations refer to, and every element. It is built
//! once through [`ScenarioBuilder`], which is also the only place
//! negotiation and transport wiring can be set up. Once built, membership
//! and wiring never change.

use std::collections::HashMap;

use slotmap::SlotMap;

use crate::element::Element;
use crate::fixed::Ticks;
use crate::id::{ElementId, NodeId};
use crate::location::Location;
use crate::resource::ResourceKind;
use crate::state::ElementState;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Faults detected while building a scenario. A scenario that fails to
/// build is never simulated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),
    #[error("duplicate element name '{0}'")]
    DuplicateElement(String),
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("unknown element {0:?}")]
    UnknownElement(ElementId),
    #[error("element '{0}' does not have an exchanging state")]
    NotExchanging(String),
    #[error("transport '{transport}' does not connect the locations of its depots")]
    TransportEndpointMismatch { transport: String },
    #[error("depot '{0}' does not have a storage state")]
    NotStorage(String),
    #[error("parent '{parent}' is not at the location of '{child}'")]
    IncompatibleLocation { child: String, parent: String },
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// A named place that locations refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    start_time: Ticks,
    nodes: SlotMap<NodeId, Node>,
    elements: SlotMap<ElementId, Element>,
}

impl Scenario {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_time(&self) -> Ticks {
        self.start_time
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    pub(crate) fn node_map(&self) -> &SlotMap<NodeId, Node> {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|(_, n)| n.name == name).map(|(id, _)| id)
    }

    pub fn elements(&self) -> &SlotMap<ElementId, Element> {
        &self.elements
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn element_by_name(&self, name: &str) -> Option<ElementId> {
        self.elements
            .iter()
            .find(|(_, e)| e.name() == name)
            .map(|(id, _)| id)
    }

    /// Element states evolve during a run; membership does not.
    pub(crate) fn elements_mut(&mut self) -> &mut SlotMap<ElementId, Element> {
        &mut self.elements
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ScenarioBuilder {
    name: String,
    start_time: Ticks,
    nodes: SlotMap<NodeId, Node>,
    elements: SlotMap<ElementId, Element>,
    node_names: HashMap<String, NodeId>,
    element_names: HashMap<String, ElementId>,
}

impl ScenarioBuilder {
    pub fn new(name: impl Into<String>, start_time: Ticks) -> Self {
        Self {
            name: name.into(),
            start_time,
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, name: impl Into<String>) -> Result<NodeId, ScenarioError> {
        let name = name.into();
        if self.node_names.contains_key(&name) {
            return Err(ScenarioError::DuplicateNode(name));
        }
        let id = self.nodes.insert(Node { name: name.clone() });
        self.node_names.insert(name, id);
        Ok(id)
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_names.get(name).copied()
    }

    pub fn element_id(&self, name: &str) -> Option<ElementId> {
        self.element_names.get(name).copied()
    }

    /// Add an element.
    ///
    /// Every node its location names and every element its state refers to
    /// must already exist. A transport element is attached to its depots
    /// here, after checking that its origin and destination are the depots'
    /// locations.
    pub fn add_element(&mut self, element: Element) -> Result<ElementId, ScenarioError> {
        if self.element_names.contains_key(element.name()) {
            return Err(ScenarioError::DuplicateElement(element.name().to_string()));
        }
        let location = element.location();
        for node in [location.origin, location.destination] {
            if !self.nodes.contains_key(node) {
                return Err(ScenarioError::UnknownNode(node));
            }
        }
        for peer in element.state().referenced_elements() {
            if !self.elements.contains_key(peer) {
                return Err(ScenarioError::UnknownElement(peer));
            }
        }
        if let Some(transport) = element.state().as_transport() {
            self.check_transport_endpoints(&element, transport.from_depot, transport.to_depot)?;
        }

        let name = element.name().to_string();
        let depots = element
            .state()
            .as_transport()
            .map(|t| (t.from_depot, t.to_depot));
        let id = self.elements.insert(element);
        self.element_names.insert(name, id);

        if let Some((from, to)) = depots {
            self.storage_mut(from)?.attach_outbound(id);
            self.storage_mut(to)?.attach_inbound(id);
        }
        Ok(id)
    }

    fn check_transport_endpoints(
        &self,
        transport: &Element,
        from: ElementId,
        to: ElementId,
    ) -> Result<(), ScenarioError> {
        let location = transport.location();
        let from_at = self.elements.get(from).map(Element::location);
        let to_at = self.elements.get(to).map(Element::location);
        if from_at != Some(Location::at(location.origin))
            || to_at != Some(Location::at(location.destination))
        {
            return Err(ScenarioError::TransportEndpointMismatch {
                transport: transport.name().to_string(),
            });
        }
        for depot in [from, to] {
            let is_storage = self
                .elements
                .get(depot)
                .is_some_and(|e| matches!(e.state(), ElementState::Storage(_)));
            if !is_storage {
                return Err(ScenarioError::NotStorage(self.name_of(depot)));
            }
        }
        Ok(())
    }

    fn name_of(&self, id: ElementId) -> String {
        self.elements
            .get(id)
            .map(|e| e.name().to_string())
            .unwrap_or_default()
    }

    fn element_mut(&mut self, id: ElementId) -> Result<&mut Element, ScenarioError> {
        self.elements
            .get_mut(id)
            .ok_or(ScenarioError::UnknownElement(id))
    }

    fn storage_mut(
        &mut self,
        id: ElementId,
    ) -> Result<&mut crate::transport::StorageState, ScenarioError> {
        let element = self.element_mut(id)?;
        let name = element.name().to_string();
        element
            .declared_state_mut()
            .as_storage_mut()
            .ok_or(ScenarioError::NotStorage(name))
    }

    fn exchanging_mut(
        &mut self,
        id: ElementId,
    ) -> Result<&mut crate::exchange::ExchangingState, ScenarioError> {
        let element = self.element_mut(id)?;
        let name = element.name().to_string();
        element
            .declared_state_mut()
            .as_exchanging_mut()
            .ok_or(ScenarioError::NotExchanging(name))
    }

    /// Make `supplier` the source of `kind` for `customer`.
    pub fn set_supplier(
        &mut self,
        customer: ElementId,
        kind: ResourceKind,
        supplier: ElementId,
    ) -> Result<(), ScenarioError> {
        if !self.elements.contains_key(supplier) {
            return Err(ScenarioError::UnknownElement(supplier));
        }
        self.exchanging_mut(customer)?.set_supplier(kind, supplier);
        Ok(())
    }

    /// Make `customer` one of the customers `supplier` serves.
    pub fn add_customer(
        &mut self,
        supplier: ElementId,
        customer: ElementId,
    ) -> Result<(), ScenarioError> {
        if !self.elements.contains_key(customer) {
            return Err(ScenarioError::UnknownElement(customer));
        }
        self.exchanging_mut(supplier)?.add_customer(customer);
        Ok(())
    }

    /// Wire both sides of an exchange of `kind` from `supplier` to `customer`.
    pub fn connect_exchange(
        &mut self,
        supplier: ElementId,
        customer: ElementId,
        kind: ResourceKind,
    ) -> Result<(), ScenarioError> {
        self.set_supplier(customer, kind, supplier)?;
        self.add_customer(supplier, customer)
    }

    /// Declare that `child` starts inside `parent`. Both must be at the same
    /// location.
    pub fn set_parent(&mut self, child: ElementId, parent: ElementId) -> Result<(), ScenarioError> {
        if child == parent {
            self.element_mut(child)?.declare_parent(None);
            return Ok(());
        }
        let parent_element = self
            .elements
            .get(parent)
            .ok_or(ScenarioError::UnknownElement(parent))?;
        let (parent_at, parent_name) = (parent_element.location(), parent_element.name().to_string());
        let child_element = self.element_mut(child)?;
        if child_element.location() != parent_at {
            return Err(ScenarioError::IncompatibleLocation {
                child: child_element.name().to_string(),
                parent: parent_name,
            });
        }
        child_element.declare_parent(Some(parent));
        Ok(())
    }

    /// Freeze the scenario. Every element is initialized at the start time
    /// so that declared wiring is visible through the current state.
    pub fn build(self) -> Scenario {
        let mut elements = self.elements;
        for element in elements.values_mut() {
            element.initialize(self.start_time);
        }
        tracing::debug!(
            scenario = %self.name,
            nodes = self.nodes.len(),
            elements = elements.len(),
            "scenario built"
        );
        Scenario {
            name: self.name,
            start_time: self.start_time,
            nodes: self.nodes,
            elements,
        }
    }
}
