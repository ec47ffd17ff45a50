//! Read-only query API for inspecting simulation state.
//!
//! Provides snapshot types that aggregate element state into convenient views
//! for rendering, reporting, and federation consumers. All types are owned
//! copies -- no references into internal simulator storage.

use serde::Serialize;

use crate::element::Element;
use crate::fixed::Ticks;
use crate::id::{ElementId, NodeId};
use crate::location::Location;
use crate::resource::ResourceVector;

// ---------------------------------------------------------------------------
// Element snapshot
// ---------------------------------------------------------------------------

/// The eight aggregate rates of an element for one step duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateSnapshot {
    pub input: ResourceVector,
    pub output: ResourceVector,
    pub production: ResourceVector,
    pub consumption: ResourceVector,
    pub storage: ResourceVector,
    pub retrieval: ResourceVector,
    pub sending: ResourceVector,
    pub receiving: ResourceVector,
}

impl RateSnapshot {
    pub fn of(element: &Element, duration: Ticks) -> Self {
        let s = element.state();
        Self {
            input: s.input_rate(duration),
            output: s.output_rate(duration),
            production: s.production_rate(duration),
            consumption: s.consumption_rate(duration),
            storage: s.storage_rate(duration),
            retrieval: s.retrieval_rate(duration),
            sending: s.sending_rate(duration),
            receiving: s.receiving_rate(duration),
        }
    }
}

/// An aggregated, read-only view of a single element.
#[derive(Debug, Clone, Serialize)]
pub struct ElementSnapshot {
    #[serde(skip)]
    pub id: ElementId,
    pub name: String,
    pub location: Location,
    /// The parent's name, or this element's own name when unparented.
    pub parent_name: String,
    pub stock: ResourceVector,
    pub rates: RateSnapshot,
}

// ---------------------------------------------------------------------------
// Node snapshot
// ---------------------------------------------------------------------------

/// Verified net flow at one node for the last step.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    #[serde(skip)]
    pub id: NodeId,
    pub name: String,
    pub net_flow: ResourceVector,
}

// ---------------------------------------------------------------------------
// Step snapshot
// ---------------------------------------------------------------------------

/// Everything an observer may read after a committed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepSnapshot {
    /// Clock value after the step.
    pub time: Ticks,
    pub elements: Vec<ElementSnapshot>,
    pub nodes: Vec<NodeSnapshot>,
}

impl StepSnapshot {
    pub fn element(&self, name: &str) -> Option<&ElementSnapshot> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn node(&self, name: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Sum of every element's stock.
    pub fn total_stock(&self) -> ResourceVector {
        self.elements.iter().map(|e| e.stock).sum()
    }
}
