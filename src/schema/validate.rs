// src/schema/validate.rs

use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{PrivdagError, Result};
use crate::graph::{Collection, CollectionAddress, Dataset, Field, FieldAddress, FieldRef};
use crate::schema::model::{CollectionDoc, DatasetDoc, FieldDoc};

/// Characters allowed in dataset and collection keys. Field names are looser
/// because dots address nested data.
static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static key regex"));

impl TryFrom<DatasetDoc> for Dataset {
    type Error = PrivdagError;

    fn try_from(doc: DatasetDoc) -> std::result::Result<Self, Self::Error> {
        validate_dataset_doc(&doc)?;

        let connection_key = doc.connection_key.clone().unwrap_or_else(|| doc.name.clone());
        let collections = doc
            .collections
            .iter()
            .map(|c| collection_from_doc(&doc.name, c))
            .collect::<Result<Vec<_>>>()?;

        Ok(Dataset {
            name: doc.name,
            collections,
            after: doc.after.into_iter().collect(),
            connection_key,
        })
    }
}

fn validate_dataset_doc(doc: &DatasetDoc) -> Result<()> {
    ensure_valid_key(&doc.name, "dataset name")?;

    if doc.collections.is_empty() {
        return Err(PrivdagError::SchemaError(format!(
            "dataset '{}' must declare at least one collection",
            doc.name
        )));
    }

    // Dataset-level `after` entries are bare dataset names.
    for entry in &doc.after {
        if entry.contains('.') {
            return Err(PrivdagError::SchemaError(format!(
                "dataset '{}' has invalid after entry '{entry}' (expected a dataset name, \
                 not an address)",
                doc.name
            )));
        }
        ensure_valid_key(entry, "dataset after entry")?;
    }

    let mut seen = BTreeSet::new();
    for collection in &doc.collections {
        if !seen.insert(collection.name.as_str()) {
            return Err(PrivdagError::SchemaError(format!(
                "dataset '{}' declares collection '{}' more than once",
                doc.name, collection.name
            )));
        }
    }

    Ok(())
}

fn collection_from_doc(dataset: &str, doc: &CollectionDoc) -> Result<Collection> {
    ensure_valid_key(&doc.name, "collection name")?;

    // Collection-level `after` entries are `dataset.collection` addresses;
    // wrong arity or bad characters fail here, not at traversal time.
    let mut after = BTreeSet::new();
    for entry in &doc.after {
        let address = CollectionAddress::from_str(entry).map_err(|_| {
            PrivdagError::SchemaError(format!(
                "collection '{dataset}.{}' has invalid after entry '{entry}' \
                 (expected 'dataset.collection')",
                doc.name
            ))
        })?;
        ensure_valid_key(&address.dataset, "after dataset key")?;
        ensure_valid_key(&address.collection, "after collection key")?;
        after.insert(address);
    }

    let mut seen = BTreeSet::new();
    let mut fields = Vec::with_capacity(doc.fields.len());
    for field_doc in &doc.fields {
        if !seen.insert(field_doc.name.as_str()) {
            return Err(PrivdagError::SchemaError(format!(
                "collection '{dataset}.{}' declares field '{}' more than once",
                doc.name, field_doc.name
            )));
        }
        fields.push(field_from_doc(dataset, &doc.name, field_doc)?);
    }

    Ok(Collection {
        name: doc.name.clone(),
        fields,
        after,
    })
}

fn field_from_doc(dataset: &str, collection: &str, doc: &FieldDoc) -> Result<Field> {
    if doc.name.is_empty() || doc.name.split('.').any(|seg| seg.is_empty()) {
        return Err(PrivdagError::SchemaError(format!(
            "collection '{dataset}.{collection}' declares a field with invalid name '{}'",
            doc.name
        )));
    }

    let mut references = Vec::with_capacity(doc.references.len());
    for reference in &doc.references {
        ensure_valid_key(&reference.dataset, "reference dataset key")?;

        let mut parts = reference.field.splitn(2, '.');
        let target = match (parts.next(), parts.next()) {
            (Some(target_collection), Some(target_field))
                if !target_collection.is_empty() && !target_field.is_empty() =>
            {
                FieldAddress::new(&reference.dataset, target_collection, target_field)
            }
            _ => {
                return Err(PrivdagError::SchemaError(format!(
                    "field '{dataset}.{collection}.{}' has invalid reference field '{}' \
                     (expected 'collection.field')",
                    doc.name, reference.field
                )));
            }
        };

        references.push(FieldRef {
            target,
            direction: reference.direction,
        });
    }

    Ok(Field {
        name: doc.name.clone(),
        primary_key: doc.primary_key,
        references,
        identity: doc.identity.clone(),
        data_categories: doc.data_categories.clone(),
        data_type: doc.data_type,
        length: doc.length,
    })
}

fn ensure_valid_key(key: &str, what: &str) -> Result<()> {
    if KEY_RE.is_match(key) {
        Ok(())
    } else {
        Err(PrivdagError::SchemaError(format!(
            "invalid {what} '{key}' (allowed characters: letters, digits, '_', '-')"
        )))
    }
}
