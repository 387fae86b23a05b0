//! Edge (relationship) in the property graph.

use serde::{Deserialize, Serialize};

use super::{NodeId, PropertyMap, Value};

/// Opaque edge identifier. Never zero — `0` is reserved as a sentinel for
/// "no edge" in the same way `NodeId(0)` is reserved for "no node".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelId(pub u64);

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traversal direction relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// An edge (directed relationship) in the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: RelId,
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub rel_type: String,
    pub properties: PropertyMap,
    /// Edge weight used by weighted traversal and path scoring; defaults to
    /// `1.0` for edges that never set one explicitly.
    pub weight: f64,
}

impl Edge {
    pub fn new(id: RelId, from_id: NodeId, to_id: NodeId, rel_type: impl Into<String>) -> Self {
        Self {
            id,
            from_id,
            to_id,
            rel_type: rel_type.into(),
            properties: PropertyMap::new(),
            weight: 1.0,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// The "other" end of the edge from the given node.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.from_id {
            Some(self.to_id)
        } else if from == self.to_id {
            Some(self.from_id)
        } else {
            None
        }
    }
}
