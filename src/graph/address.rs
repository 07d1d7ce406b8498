// src/graph/address.rs

//! Typed addresses for collections and fields.
//!
//! The dotted string forms (`dataset.collection` and
//! `dataset.collection.field`) are what operators write in `after` lists and
//! reference declarations. Field names may themselves contain dots to address
//! values nested inside a row, so parsing a field address only splits off the
//! first two segments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PrivdagError;

/// Globally unique pointer to one collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionAddress {
    pub dataset: String,
    pub collection: String,
}

impl CollectionAddress {
    pub fn new(dataset: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            collection: collection.into(),
        }
    }

    /// Address of a field inside this collection.
    pub fn field(&self, field: impl Into<String>) -> FieldAddress {
        FieldAddress {
            dataset: self.dataset.clone(),
            collection: self.collection.clone(),
            field: field.into(),
        }
    }
}

impl fmt::Display for CollectionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.collection)
    }
}

impl FromStr for CollectionAddress {
    type Err = PrivdagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        match parts.as_slice() {
            [dataset, collection] if !dataset.is_empty() && !collection.is_empty() => {
                Ok(Self::new(*dataset, *collection))
            }
            _ => Err(PrivdagError::SchemaError(format!(
                "invalid collection address '{s}' (expected 'dataset.collection')"
            ))),
        }
    }
}

/// Globally unique pointer to one field.
///
/// The `field` component may be a dotted path into nested row data
/// (e.g. `contact.email`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldAddress {
    pub dataset: String,
    pub collection: String,
    pub field: String,
}

impl FieldAddress {
    pub fn new(
        dataset: impl Into<String>,
        collection: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            collection: collection.into(),
            field: field.into(),
        }
    }

    pub fn collection_address(&self) -> CollectionAddress {
        CollectionAddress::new(self.dataset.clone(), self.collection.clone())
    }

    /// The field name split into path segments for nested row data.
    pub fn field_path(&self) -> Vec<String> {
        self.field.split('.').map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for FieldAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.dataset, self.collection, self.field)
    }
}

impl FromStr for FieldAddress {
    type Err = PrivdagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(dataset), Some(collection), Some(field))
                if !dataset.is_empty() && !collection.is_empty() && !field.is_empty() =>
            {
                Ok(Self::new(dataset, collection, field))
            }
            _ => Err(PrivdagError::SchemaError(format!(
                "invalid field address '{s}' (expected 'dataset.collection.field')"
            ))),
        }
    }
}
