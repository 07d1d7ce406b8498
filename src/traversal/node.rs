// src/traversal/node.rs

//! Per-traversal collection nodes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::graph::{CollectionAddress, FieldAddress};

/// An activated reference edge: values produced by `source` feed the query
/// for `target`'s collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraversalEdge {
    pub source: FieldAddress,
    pub target: FieldAddress,
}

/// One collection instantiated inside a specific traversal.
///
/// Created during traversal construction and consumed when the execution
/// plan is persisted as tasks.
#[derive(Debug, Clone)]
pub struct TraversalNode {
    pub address: CollectionAddress,
    /// Identity fields of this collection activated by the supplied seeds,
    /// as `(seed key, field address)` pairs.
    pub seed_fields: Vec<(String, FieldAddress)>,
    /// Reference edges feeding this node's query from upstream nodes.
    pub incoming: Vec<TraversalEdge>,
    /// Nodes whose queries consume this node's output.
    pub children: Vec<CollectionAddress>,
    /// Explicit ordering constraints, already restricted to collections
    /// participating in this traversal.
    pub after: BTreeSet<CollectionAddress>,
}

impl TraversalNode {
    /// Effective prerequisites: upstream nodes feeding this one plus the
    /// `after` constraints.
    pub fn prerequisites(&self) -> BTreeSet<CollectionAddress> {
        let mut prerequisites: BTreeSet<CollectionAddress> = self
            .incoming
            .iter()
            .map(|edge| edge.source.collection_address())
            .collect();
        prerequisites.extend(self.after.iter().cloned());
        prerequisites
    }
}
