// src/graph/dataset_graph.rs

//! Merged view over all active datasets.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::errors::{PrivdagError, Result};
use crate::graph::{Collection, CollectionAddress, Dataset, FieldAddress, RefDirection};

/// A directed field-to-field edge: values flow from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    pub source: FieldAddress,
    pub target: FieldAddress,
}

/// Union of all active datasets.
///
/// Construction validates the merged graph and fails with *every* offending
/// address at once rather than the first:
/// - a collection address may not appear in two datasets
/// - a reference may not point at a field that does not exist
/// - a reference may not link two fields of the same collection
#[derive(Debug, Clone)]
pub struct DatasetGraph {
    datasets: BTreeMap<String, Dataset>,
    collections: BTreeMap<CollectionAddress, Collection>,
    edges: BTreeSet<Edge>,
    /// Which seed key each identity field accepts.
    identity_keys: BTreeMap<FieldAddress, String>,
}

impl DatasetGraph {
    pub fn new(datasets: Vec<Dataset>) -> Result<Self> {
        let mut collections: BTreeMap<CollectionAddress, Collection> = BTreeMap::new();
        let mut identity_keys: BTreeMap<FieldAddress, String> = BTreeMap::new();

        for dataset in &datasets {
            for collection in &dataset.collections {
                let address = CollectionAddress::new(&dataset.name, &collection.name);
                if collections.contains_key(&address) {
                    return Err(PrivdagError::SchemaError(format!(
                        "collection address '{address}' is declared by more than one dataset"
                    )));
                }

                for field in &collection.fields {
                    if let Some(seed_key) = &field.identity {
                        identity_keys.insert(address.field(&field.name), seed_key.clone());
                    }
                }

                collections.insert(address, collection.clone());
            }
        }

        let edges = build_edges(&collections)?;

        debug!(
            datasets = datasets.len(),
            collections = collections.len(),
            edges = edges.len(),
            identity_fields = identity_keys.len(),
            "dataset graph constructed"
        );

        Ok(Self {
            datasets: datasets.into_iter().map(|d| (d.name.clone(), d)).collect(),
            collections,
            edges,
            identity_keys,
        })
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.values()
    }

    pub fn collection(&self, address: &CollectionAddress) -> Option<&Collection> {
        self.collections.get(address)
    }

    pub fn collection_addresses(&self) -> impl Iterator<Item = &CollectionAddress> {
        self.collections.keys()
    }

    /// Deduplicated directed field-to-field edges. A reference declared
    /// without a direction contributes both directions.
    pub fn edges(&self) -> &BTreeSet<Edge> {
        &self.edges
    }

    /// Map of identity field address to the seed key it accepts.
    pub fn identity_keys(&self) -> &BTreeMap<FieldAddress, String> {
        &self.identity_keys
    }

    /// Identity fields accepting the given seed key.
    pub fn fields_for_seed(&self, seed_key: &str) -> Vec<FieldAddress> {
        self.identity_keys
            .iter()
            .filter(|(_, key)| key.as_str() == seed_key)
            .map(|(address, _)| address.clone())
            .collect()
    }

    /// Per-collection map of data category to the field paths carrying it,
    /// used to select masking targets and filter access output by policy
    /// rule.
    pub fn data_category_field_mapping(
        &self,
        address: &CollectionAddress,
    ) -> BTreeMap<String, Vec<Vec<String>>> {
        let mut mapping: BTreeMap<String, Vec<Vec<String>>> = BTreeMap::new();

        if let Some(collection) = self.collections.get(address) {
            for field in &collection.fields {
                for category in &field.data_categories {
                    mapping
                        .entry(category.clone())
                        .or_default()
                        .push(field.field_path());
                }
            }
        }

        mapping
    }
}

/// Build the deduplicated edge set, collecting every invalid reference before
/// failing.
fn build_edges(collections: &BTreeMap<CollectionAddress, Collection>) -> Result<BTreeSet<Edge>> {
    let mut edges: BTreeSet<Edge> = BTreeSet::new();
    let mut dangling: Vec<String> = Vec::new();

    for (address, collection) in collections {
        for field in &collection.fields {
            let source = address.field(&field.name);

            for reference in &field.references {
                let target = &reference.target;

                if target.collection_address() == *address {
                    return Err(PrivdagError::SchemaError(format!(
                        "reference from '{source}' to '{target}' links two fields of the \
                         same collection"
                    )));
                }

                let target_exists = collections
                    .get(&target.collection_address())
                    .and_then(|c| c.field(&target.field))
                    .is_some();
                if !target_exists {
                    dangling.push(target.to_string());
                    continue;
                }

                match reference.direction {
                    Some(RefDirection::To) => {
                        edges.insert(Edge {
                            source: source.clone(),
                            target: target.clone(),
                        });
                    }
                    Some(RefDirection::From) => {
                        edges.insert(Edge {
                            source: target.clone(),
                            target: source.clone(),
                        });
                    }
                    None => {
                        edges.insert(Edge {
                            source: source.clone(),
                            target: target.clone(),
                        });
                        edges.insert(Edge {
                            source: target.clone(),
                            target: source.clone(),
                        });
                    }
                }
            }
        }
    }

    if !dangling.is_empty() {
        dangling.sort();
        dangling.dedup();
        return Err(PrivdagError::DanglingReferences(dangling));
    }

    Ok(edges)
}
