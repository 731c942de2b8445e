//! Property-graph store contract.
//!
//! The graph has eight node labels. `Document` nodes are keyed by content
//! hash, every other label by its `name`. All edges point from a Document
//! to one target node and are identified by `(type, from_key, to_key)`.
//!
//! Writes go through a [`GraphTransaction`]: both operations are merges
//! (create if absent, otherwise update), so replaying a transaction leaves
//! the graph unchanged. A transaction that is dropped without
//! [`commit`](GraphTransaction::commit) writes nothing.
//!
//! | Backend | Module |
//! |---------|--------|
//! | In-memory maps | [`memory`] |
//! | SQLite tables | [`sqlite`] |

pub mod memory;
pub mod sqlite;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GraphWriteError;

/// Scalar properties stored on a node.
pub type Properties = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeLabel {
    Document,
    Client,
    Region,
    Domain,
    Industry,
    Technology,
    Partner,
    Product,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 8] = [
        NodeLabel::Document,
        NodeLabel::Client,
        NodeLabel::Region,
        NodeLabel::Domain,
        NodeLabel::Industry,
        NodeLabel::Technology,
        NodeLabel::Partner,
        NodeLabel::Product,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Document => "Document",
            NodeLabel::Client => "Client",
            NodeLabel::Region => "Region",
            NodeLabel::Domain => "Domain",
            NodeLabel::Industry => "Industry",
            NodeLabel::Technology => "Technology",
            NodeLabel::Partner => "Partner",
            NodeLabel::Product => "Product",
        }
    }

    /// Name of the property that holds the merge key.
    pub fn key_property(&self) -> &'static str {
        match self {
            NodeLabel::Document => "id",
            _ => "name",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeLabel {
    type Err = GraphWriteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeLabel::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| GraphWriteError::Rejected(format!("unknown node label: {}", s)))
    }
}

/// Relationship types, all directed from a `Document`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeType {
    BelongsTo,
    LocatedIn,
    PartOf,
    TaggedAs,
    Mentions,
    PartneredWith,
    Describes,
}

impl EdgeType {
    pub const ALL: [EdgeType; 7] = [
        EdgeType::BelongsTo,
        EdgeType::LocatedIn,
        EdgeType::PartOf,
        EdgeType::TaggedAs,
        EdgeType::Mentions,
        EdgeType::PartneredWith,
        EdgeType::Describes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::BelongsTo => "BELONGS_TO",
            EdgeType::LocatedIn => "LOCATED_IN",
            EdgeType::PartOf => "PART_OF",
            EdgeType::TaggedAs => "TAGGED_AS",
            EdgeType::Mentions => "MENTIONS",
            EdgeType::PartneredWith => "PARTNERED_WITH",
            EdgeType::Describes => "DESCRIBES",
        }
    }

    /// Label of the node this edge points at.
    pub fn target(&self) -> NodeLabel {
        match self {
            EdgeType::BelongsTo => NodeLabel::Client,
            EdgeType::LocatedIn => NodeLabel::Region,
            EdgeType::PartOf => NodeLabel::Domain,
            EdgeType::TaggedAs => NodeLabel::Industry,
            EdgeType::Mentions => NodeLabel::Technology,
            EdgeType::PartneredWith => NodeLabel::Partner,
            EdgeType::Describes => NodeLabel::Product,
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = GraphWriteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeType::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| GraphWriteError::Rejected(format!("unknown edge type: {}", s)))
    }
}

/// One upsert against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOp {
    MergeNode {
        label: NodeLabel,
        key: String,
        properties: Properties,
    },
    MergeEdge {
        edge: EdgeType,
        from_key: String,
        to_key: String,
    },
}

/// Full copy of a graph's nodes and edges, ordered for comparison.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: BTreeMap<(NodeLabel, String), Properties>,
    pub edges: BTreeSet<(EdgeType, String, String)>,
}

impl GraphSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_node(&self, label: NodeLabel, key: &str) -> bool {
        self.nodes.contains_key(&(label, key.to_string()))
    }

    pub fn node(&self, label: NodeLabel, key: &str) -> Option<&Properties> {
        self.nodes.get(&(label, key.to_string()))
    }

    pub fn has_edge(&self, edge: EdgeType, from_key: &str, to_key: &str) -> bool {
        self.edges
            .contains(&(edge, from_key.to_string(), to_key.to_string()))
    }

    /// Keys of all nodes carrying `label`.
    pub fn keys(&self, label: NodeLabel) -> Vec<&str> {
        self.nodes
            .keys()
            .filter(|(l, _)| *l == label)
            .map(|(_, k)| k.as_str())
            .collect()
    }

    /// Edges leaving the Document `from_key`.
    pub fn edges_from(&self, from_key: &str) -> Vec<(EdgeType, &str)> {
        self.edges
            .iter()
            .filter(|(_, from, _)| from == from_key)
            .map(|(e, _, to)| (*e, to.as_str()))
            .collect()
    }

    pub fn count_by_label(&self) -> BTreeMap<NodeLabel, usize> {
        let mut counts = BTreeMap::new();
        for (label, _) in self.nodes.keys() {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_by_edge(&self) -> BTreeMap<EdgeType, usize> {
        let mut counts = BTreeMap::new();
        for (edge, _, _) in &self.edges {
            *counts.entry(*edge).or_insert(0) += 1;
        }
        counts
    }

    /// Apply one merge in place. Node properties are overlaid on the
    /// existing ones; edges are a set.
    pub fn apply(&mut self, op: &GraphOp) {
        match op {
            GraphOp::MergeNode {
                label,
                key,
                properties,
            } => {
                let node = self.nodes.entry((*label, key.clone())).or_default();
                for (k, v) in properties {
                    node.insert(k.clone(), v.clone());
                }
            }
            GraphOp::MergeEdge {
                edge,
                from_key,
                to_key,
            } => {
                self.edges.insert((*edge, from_key.clone(), to_key.clone()));
            }
        }
    }
}

/// One unit of work against a [`GraphStore`].
#[async_trait]
pub trait GraphTransaction: Send {
    async fn merge_node(
        &mut self,
        label: NodeLabel,
        key: &str,
        properties: &Properties,
    ) -> Result<(), GraphWriteError>;

    async fn merge_edge(
        &mut self,
        edge: EdgeType,
        from_key: &str,
        to_key: &str,
    ) -> Result<(), GraphWriteError>;

    async fn commit(self: Box<Self>) -> Result<(), GraphWriteError>;
}

/// A property-graph backend with an explicit open/close lifecycle.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn begin<'a>(&'a self) -> Result<Box<dyn GraphTransaction + 'a>, GraphWriteError>;

    async fn snapshot(&self) -> Result<GraphSnapshot, GraphWriteError>;

    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_and_edges_round_trip_through_strings() {
        for label in NodeLabel::ALL {
            assert_eq!(label.as_str().parse::<NodeLabel>().unwrap(), label);
        }
        for edge in EdgeType::ALL {
            assert_eq!(edge.as_str().parse::<EdgeType>().unwrap(), edge);
        }
        assert!("Person".parse::<NodeLabel>().is_err());
    }

    #[test]
    fn every_edge_targets_a_non_document_label() {
        let targets: BTreeSet<_> = EdgeType::ALL.iter().map(|e| e.target()).collect();
        assert_eq!(targets.len(), 7);
        assert!(!targets.contains(&NodeLabel::Document));
    }

    #[test]
    fn apply_overlays_properties_and_ignores_repeated_edges() {
        let mut snap = GraphSnapshot::default();
        let mut first = Properties::new();
        first.insert("a".into(), 1.into());
        first.insert("b".into(), 1.into());
        let mut second = Properties::new();
        second.insert("b".into(), 2.into());

        for props in [first, second] {
            snap.apply(&GraphOp::MergeNode {
                label: NodeLabel::Client,
                key: "Acme".into(),
                properties: props,
            });
        }
        let edge = GraphOp::MergeEdge {
            edge: EdgeType::BelongsTo,
            from_key: "d1".into(),
            to_key: "Acme".into(),
        };
        snap.apply(&edge);
        snap.apply(&edge);

        let node = snap.node(NodeLabel::Client, "Acme").unwrap();
        assert_eq!(node["a"], 1);
        assert_eq!(node["b"], 2);
        assert_eq!(snap.node_count(), 1);
        assert_eq!(snap.edge_count(), 1);
    }
}
