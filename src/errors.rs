// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::graph::CollectionAddress;

#[derive(Error, Debug)]
pub enum PrivdagError {
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// One or more references point at fields that do not exist in any
    /// registered dataset. Every dangling address is collected before the
    /// error is raised.
    #[error("Dangling references: {}", .0.join(", "))]
    DanglingReferences(Vec<String>),

    #[error("Cycle detected among collections: {}", format_addresses(.0))]
    TraversalCycle(Vec<CollectionAddress>),

    #[error("Unreachable collections: {}", format_addresses(.0))]
    TraversalUnreachable(Vec<CollectionAddress>),

    #[error("Policy error: {0}")]
    PolicyError(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn format_addresses(addresses: &[CollectionAddress]) -> String {
    addresses
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PrivdagError>;
