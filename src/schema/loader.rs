// src/schema/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::errors::Result;
use crate::graph::Dataset;
use crate::schema::model::DatasetDoc;

/// Load and validate a single dataset document from a TOML file.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let doc: DatasetDoc = toml::from_str(&contents)?;
    let dataset = Dataset::try_from(doc)?;

    debug!(
        path = %path.display(),
        dataset = %dataset.name,
        collections = dataset.collections.len(),
        "loaded dataset document"
    );

    Ok(dataset)
}

/// Load every `.toml` dataset document in a directory, sorted by file name so
/// the result is deterministic.
pub fn load_datasets(dir: impl AsRef<Path>) -> Result<Vec<Dataset>> {
    let dir = dir.as_ref();
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    paths.into_iter().map(load_dataset).collect()
}
