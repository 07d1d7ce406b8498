// src/traversal/plan.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use serde_json::Value;
use tracing::debug;

use crate::errors::{PrivdagError, Result};
use crate::graph::{CollectionAddress, DatasetGraph};
use crate::traversal::node::{TraversalEdge, TraversalNode};

/// An ordered execution plan over the collections reachable from the
/// supplied identity seeds.
///
/// Construction fails before any connector I/O happens:
/// - [`PrivdagError::TraversalUnreachable`] lists *every* participating
///   collection no upstream value can ever reach.
/// - [`PrivdagError::TraversalCycle`] lists *every* collection taking part
///   in a prerequisite cycle.
///
/// Both failures are recoverable by fixing the schema or `after`
/// configuration and are never retried automatically.
#[derive(Debug, Clone)]
pub struct Traversal {
    nodes: BTreeMap<CollectionAddress, TraversalNode>,
    order: Vec<CollectionAddress>,
}

impl Traversal {
    /// Build a traversal for the given seed values.
    ///
    /// Seed entries with a null value are ignored; different seed sets may
    /// therefore produce different participating node sets, which is
    /// expected. An empty seed set yields an empty plan.
    pub fn new(graph: &DatasetGraph, seeds: &BTreeMap<String, Value>) -> Result<Self> {
        let seed_fields = activated_seed_fields(graph, seeds);
        let seed_collections: BTreeSet<CollectionAddress> = seed_fields
            .iter()
            .map(|(_, address)| address.collection_address())
            .collect();

        if seed_collections.is_empty() {
            debug!("no identity field matches the supplied seeds; empty traversal");
            return Ok(Self {
                nodes: BTreeMap::new(),
                order: Vec::new(),
            });
        }

        // Participation: weakly-connected closure of the seeds. A reference
        // establishes reachability no matter which way its values flow.
        let participating = undirected_closure(graph, &seed_collections);

        // Satisfiability and edge activation: a directed frontier expansion
        // from the seeds. A participating node the frontier never reaches
        // has no upstream value producer.
        let activation = activate_edges(graph, &seed_collections, &participating);
        let unreachable: Vec<CollectionAddress> = participating
            .iter()
            .filter(|address| !activation.reached.contains(*address))
            .cloned()
            .collect();
        if !unreachable.is_empty() {
            return Err(PrivdagError::TraversalUnreachable(unreachable));
        }

        let nodes = build_nodes(graph, &participating, activation.incoming, &seed_fields);
        let order = order_nodes(&nodes)?;

        debug!(
            participating = nodes.len(),
            seeds = seed_collections.len(),
            "traversal constructed"
        );

        Ok(Self { nodes, order })
    }

    pub fn node(&self, address: &CollectionAddress) -> Option<&TraversalNode> {
        self.nodes.get(address)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TraversalNode> {
        self.nodes.values()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Collection addresses in a valid topological order: every node appears
    /// after all of its prerequisites.
    pub fn order(&self) -> &[CollectionAddress] {
        &self.order
    }
}

/// Identity fields whose seed key has a non-null value supplied.
fn activated_seed_fields(
    graph: &DatasetGraph,
    seeds: &BTreeMap<String, Value>,
) -> Vec<(String, crate::graph::FieldAddress)> {
    graph
        .identity_keys()
        .iter()
        .filter(|(_, key)| seeds.get(*key).is_some_and(|v| !v.is_null()))
        .map(|(address, key)| (key.clone(), address.clone()))
        .collect()
}

fn undirected_closure(
    graph: &DatasetGraph,
    seeds: &BTreeSet<CollectionAddress>,
) -> BTreeSet<CollectionAddress> {
    let mut adjacency: BTreeMap<CollectionAddress, BTreeSet<CollectionAddress>> = BTreeMap::new();
    for edge in graph.edges() {
        let source = edge.source.collection_address();
        let target = edge.target.collection_address();
        adjacency
            .entry(source.clone())
            .or_default()
            .insert(target.clone());
        adjacency.entry(target).or_default().insert(source);
    }

    let mut reached: BTreeSet<CollectionAddress> = seeds.clone();
    let mut frontier: VecDeque<CollectionAddress> = seeds.iter().cloned().collect();

    while let Some(address) = frontier.pop_front() {
        if let Some(neighbours) = adjacency.get(&address) {
            for neighbour in neighbours {
                if reached.insert(neighbour.clone()) {
                    frontier.push_back(neighbour.clone());
                }
            }
        }
    }

    reached
}

struct EdgeActivation {
    /// Collections the directed frontier reached, in processing order.
    reached: BTreeSet<CollectionAddress>,
    /// Activated edges per target collection.
    incoming: BTreeMap<CollectionAddress, Vec<TraversalEdge>>,
}

/// Expand a directed frontier from the seeds, activating edges as they are
/// traversed.
///
/// An edge only activates towards a collection the frontier has not finished
/// processing yet: processing order is therefore a valid topological order
/// over activated edges, and an undirected reference pair can never turn
/// into a mutual prerequisite. A node reached on several unfinished paths
/// keeps one incoming edge per upstream field (diamonds join normally).
fn activate_edges(
    graph: &DatasetGraph,
    seeds: &BTreeSet<CollectionAddress>,
    participating: &BTreeSet<CollectionAddress>,
) -> EdgeActivation {
    let mut incoming: BTreeMap<CollectionAddress, Vec<TraversalEdge>> = BTreeMap::new();
    let mut processed: BTreeSet<CollectionAddress> = BTreeSet::new();
    let mut queued: BTreeSet<CollectionAddress> = seeds.clone();
    let mut queue: VecDeque<CollectionAddress> = seeds.iter().cloned().collect();

    while let Some(address) = queue.pop_front() {
        processed.insert(address.clone());

        for edge in graph.edges() {
            if edge.source.collection_address() != address {
                continue;
            }
            let target = edge.target.collection_address();
            if !participating.contains(&target) || processed.contains(&target) {
                continue;
            }

            incoming.entry(target.clone()).or_default().push(TraversalEdge {
                source: edge.source.clone(),
                target: edge.target.clone(),
            });
            if queued.insert(target.clone()) {
                queue.push_back(target);
            }
        }
    }

    EdgeActivation {
        reached: processed,
        incoming,
    }
}

fn build_nodes(
    graph: &DatasetGraph,
    participating: &BTreeSet<CollectionAddress>,
    mut incoming: BTreeMap<CollectionAddress, Vec<TraversalEdge>>,
    seed_fields: &[(String, crate::graph::FieldAddress)],
) -> BTreeMap<CollectionAddress, TraversalNode> {
    let mut nodes: BTreeMap<CollectionAddress, TraversalNode> = BTreeMap::new();

    for address in participating {
        let node_incoming = incoming.remove(address).unwrap_or_default();

        let node_seeds: Vec<_> = seed_fields
            .iter()
            .filter(|(_, field)| field.collection_address() == *address)
            .cloned()
            .collect();

        nodes.insert(
            address.clone(),
            TraversalNode {
                address: address.clone(),
                seed_fields: node_seeds,
                incoming: node_incoming,
                children: Vec::new(),
                after: effective_after(graph, address, participating),
            },
        );
    }

    // Children are the reverse of the prerequisite relation.
    let child_map: Vec<(CollectionAddress, CollectionAddress)> = nodes
        .values()
        .flat_map(|node| {
            node.prerequisites()
                .into_iter()
                .filter(|p| *p != node.address)
                .map(|p| (p, node.address.clone()))
                .collect::<Vec<_>>()
        })
        .collect();
    for (parent, child) in child_map {
        if let Some(node) = nodes.get_mut(&parent) {
            node.children.push(child);
        }
    }
    for node in nodes.values_mut() {
        node.children.sort();
        node.children.dedup();
    }

    nodes
}

/// Collection-level plus distributed dataset-level `after` constraints,
/// restricted to the participating set. A constraint pointing at a
/// collection outside the traversal is only meaningful among nodes actually
/// participating, so it is dropped rather than rejected.
fn effective_after(
    graph: &DatasetGraph,
    address: &CollectionAddress,
    participating: &BTreeSet<CollectionAddress>,
) -> BTreeSet<CollectionAddress> {
    let mut after: BTreeSet<CollectionAddress> = BTreeSet::new();

    if let Some(collection) = graph.collection(address) {
        after.extend(collection.after.iter().cloned());
    }

    if let Some(dataset) = graph.dataset(&address.dataset) {
        for dataset_name in &dataset.after {
            if let Some(upstream) = graph.dataset(dataset_name) {
                after.extend(upstream.collection_addresses());
            }
        }
    }

    after.retain(|a| participating.contains(a) && a != address);
    after
}

/// Topological order over the prerequisite graph; a cycle fails with every
/// participating member listed.
fn order_nodes(
    nodes: &BTreeMap<CollectionAddress, TraversalNode>,
) -> Result<Vec<CollectionAddress>> {
    let addresses: Vec<&CollectionAddress> = nodes.keys().collect();
    let index_of: BTreeMap<&CollectionAddress, usize> = addresses
        .iter()
        .enumerate()
        .map(|(i, a)| (*a, i))
        .collect();

    let mut prerequisite_graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for (i, _) in addresses.iter().enumerate() {
        prerequisite_graph.add_node(i);
    }
    for node in nodes.values() {
        let target = index_of[&node.address];
        for prerequisite in node.prerequisites() {
            if let Some(&source) = index_of.get(&prerequisite) {
                prerequisite_graph.add_edge(source, target, ());
            }
        }
    }

    // Strongly-connected components with more than one member (or a
    // self-edge) are cycles; report every member of every cycle at once.
    let mut cyclic: Vec<CollectionAddress> = Vec::new();
    for component in tarjan_scc(&prerequisite_graph) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| prerequisite_graph.contains_edge(n, n));
        if is_cycle {
            cyclic.extend(component.into_iter().map(|i| addresses[i].clone()));
        }
    }
    if !cyclic.is_empty() {
        cyclic.sort();
        return Err(PrivdagError::TraversalCycle(cyclic));
    }

    let order = toposort(&prerequisite_graph, None)
        .expect("prerequisite graph is acyclic after the SCC check");

    Ok(order.into_iter().map(|i| addresses[i].clone()).collect())
}
