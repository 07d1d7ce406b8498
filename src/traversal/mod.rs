// src/traversal/mod.rs

//! Traversal construction and ordering.
//!
//! - [`node`] holds the per-collection [`TraversalNode`] instantiated for a
//!   single traversal run.
//! - [`plan`] builds a [`Traversal`] from a dataset graph plus seed identity
//!   values: participation, satisfiability, `after` distribution, cycle
//!   detection and topological ordering.

pub mod node;
pub mod plan;

pub use node::{TraversalEdge, TraversalNode};
pub use plan::Traversal;
