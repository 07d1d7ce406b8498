// src/schema/model.rs

use serde::Deserialize;

use crate::graph::{DataType, RefDirection};

/// One dataset document as read from a TOML file.
///
/// ```toml
/// name = "postgres_db"
/// connection_key = "postgres_main"
/// after = ["mongo_db"]
///
/// [[collections]]
/// name = "orders"
/// after = ["postgres_db.users"]
///
/// [[collections.fields]]
/// name = "user_email"
/// identity = "email"
/// data_categories = ["user.contact.email"]
/// data_type = "string"
///
/// [[collections.fields.references]]
/// dataset = "postgres_db"
/// field = "users.id"
/// direction = "from"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDoc {
    /// Dataset name; becomes the first segment of every address in it.
    pub name: String,

    /// Key of the connection this dataset is queried through. Defaults to
    /// the dataset name.
    #[serde(default)]
    pub connection_key: Option<String>,

    /// Names of datasets that must be processed before this one.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub collections: Vec<CollectionDoc>,
}

/// `[[collections]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionDoc {
    pub name: String,

    /// `dataset.collection` addresses that must be processed before this
    /// collection.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub fields: Vec<FieldDoc>,
}

/// `[[collections.fields]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDoc {
    /// Field name; dots address values nested inside a row.
    pub name: String,

    #[serde(default)]
    pub primary_key: bool,

    /// Seed key this field accepts (e.g. `email`). A field with an identity
    /// key is a traversal starting point whenever a value for that key is
    /// supplied.
    #[serde(default)]
    pub identity: Option<String>,

    #[serde(default)]
    pub data_categories: Vec<String>,

    #[serde(default)]
    pub data_type: Option<DataType>,

    #[serde(default)]
    pub length: Option<usize>,

    #[serde(default)]
    pub references: Vec<ReferenceDoc>,
}

/// `[[collections.fields.references]]` entry.
///
/// `field` is a `collection.field` path inside the referenced dataset; the
/// field part may itself be dotted for nested data.
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceDoc {
    pub dataset: String,
    pub field: String,
    #[serde(default)]
    pub direction: Option<RefDirection>,
}
