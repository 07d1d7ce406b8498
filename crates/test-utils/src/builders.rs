#![allow(dead_code)]

use privdag::graph::{DataType, Dataset, RefDirection};
use privdag::schema::{CollectionDoc, DatasetDoc, FieldDoc, ReferenceDoc};

/// Builder for `Dataset` documents to simplify test setup.
///
/// `build()` runs the same document validation as the loader, so tests
/// exercise real parse-time checks.
pub struct DatasetBuilder {
    doc: DatasetDoc,
}

impl DatasetBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            doc: DatasetDoc {
                name: name.to_string(),
                connection_key: None,
                after: vec![],
                collections: vec![],
            },
        }
    }

    pub fn after(mut self, dataset: &str) -> Self {
        self.doc.after.push(dataset.to_string());
        self
    }

    pub fn connection_key(mut self, key: &str) -> Self {
        self.doc.connection_key = Some(key.to_string());
        self
    }

    pub fn with_collection(mut self, collection: CollectionBuilder) -> Self {
        self.doc.collections.push(collection.doc);
        self
    }

    pub fn build(self) -> Dataset {
        Dataset::try_from(self.doc).expect("Failed to build valid dataset from builder")
    }

    /// The raw document, for tests asserting on validation failures.
    pub fn build_doc(self) -> DatasetDoc {
        self.doc
    }
}

/// Builder for `[[collections]]` entries.
pub struct CollectionBuilder {
    doc: CollectionDoc,
}

impl CollectionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            doc: CollectionDoc {
                name: name.to_string(),
                after: vec![],
                fields: vec![],
            },
        }
    }

    pub fn after(mut self, address: &str) -> Self {
        self.doc.after.push(address.to_string());
        self
    }

    pub fn with_field(mut self, field: FieldBuilder) -> Self {
        self.doc.fields.push(field.doc);
        self
    }

    pub fn build_doc(self) -> CollectionDoc {
        self.doc
    }
}

/// Builder for `[[collections.fields]]` entries.
pub struct FieldBuilder {
    doc: FieldDoc,
}

impl FieldBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            doc: FieldDoc {
                name: name.to_string(),
                primary_key: false,
                identity: None,
                data_categories: vec![],
                data_type: None,
                length: None,
                references: vec![],
            },
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.doc.primary_key = true;
        self
    }

    pub fn identity(mut self, seed_key: &str) -> Self {
        self.doc.identity = Some(seed_key.to_string());
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.doc.data_categories.push(category.to_string());
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.doc.data_type = Some(data_type);
        self
    }

    pub fn length(mut self, length: usize) -> Self {
        self.doc.length = Some(length);
        self
    }

    pub fn references(mut self, dataset: &str, field: &str, direction: Option<RefDirection>) -> Self {
        self.doc.references.push(ReferenceDoc {
            dataset: dataset.to_string(),
            field: field.to_string(),
            direction,
        });
        self
    }
}
