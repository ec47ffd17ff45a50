use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Where an element currently is.
///
/// Static elements sit at a single node (`origin == destination`). Transport
/// elements take their input at `origin` and deliver their output at
/// `destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub origin: NodeId,
    pub destination: NodeId,
}

impl Location {
    /// A location fixed at one node.
    pub fn at(node: NodeId) -> Self {
        Self {
            origin: node,
            destination: node,
        }
    }

    /// A location connecting two nodes.
    pub fn between(origin: NodeId, destination: NodeId) -> Self {
        Self { origin, destination }
    }

    pub fn is_static(&self) -> bool {
        self.origin == self.destination
    }

    /// Whether either endpoint is `node`.
    pub fn touches(&self, node: NodeId) -> bool {
        self.origin == node || self.destination == node
    }
}
