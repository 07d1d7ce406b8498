// src/graph/collection.rs

use std::collections::BTreeSet;

use crate::graph::{CollectionAddress, Field};

/// Group of fields retrieved or written together (a table, an endpoint).
#[derive(Debug, Clone)]
pub struct Collection {
    pub name: String,
    pub fields: Vec<Field>,
    /// Collections that must be processed before this one, in addition to
    /// anything implied by reference edges.
    pub after: BTreeSet<CollectionAddress>,
}

impl Collection {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields that accept an identity seed value.
    pub fn identity_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.identity.is_some())
    }
}

/// Named group of collections retrieved from one connection.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub collections: Vec<Collection>,
    /// Datasets that must be processed before this one. Distributed onto all
    /// of this dataset's collections at traversal time.
    pub after: BTreeSet<String>,
    /// Key of the connection this dataset is queried through.
    pub connection_key: String,
}

impl Dataset {
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.name == name)
    }

    pub fn collection_addresses(&self) -> impl Iterator<Item = CollectionAddress> + '_ {
        self.collections
            .iter()
            .map(|c| CollectionAddress::new(self.name.clone(), c.name.clone()))
    }
}
