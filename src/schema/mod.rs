// src/schema/mod.rs

//! Dataset schema loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed document model (`model.rs`).
//! - Load dataset documents from disk (`loader.rs`).
//! - Validate documents and convert them into graph types (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_dataset, load_datasets};
pub use model::{CollectionDoc, DatasetDoc, FieldDoc, ReferenceDoc};
