// src/engine/storage.rs

//! External storage for oversized task payloads.
//!
//! Row payloads above the configured inline threshold are written to a
//! [`PayloadStore`] and only a handle is persisted on the task. Reads
//! rehydrate transparently. Deletion is best-effort: a failed cleanup is
//! logged, a failed write fails the task (it cannot complete without its
//! checkpoint).

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::task::RowPayload;
use crate::errors::{PrivdagError, Result};

pub trait PayloadStore: Send + Sync {
    /// Store a payload and return its handle.
    fn store(&self, bytes: &[u8]) -> Result<String>;

    fn retrieve(&self, handle: &str) -> Result<Vec<u8>>;

    fn delete(&self, handle: &str) -> Result<()>;

    /// Storage type recorded on the task row next to the handle.
    fn storage_type(&self) -> &'static str;
}

/// Serialize rows and decide between inline persistence and an external
/// handle based on the threshold.
pub fn persist_rows(
    payloads: &dyn PayloadStore,
    threshold: usize,
    rows: Vec<Value>,
) -> Result<RowPayload> {
    let bytes = serde_json::to_vec(&rows)?;

    if bytes.len() <= threshold {
        return Ok(RowPayload::Inline { rows });
    }

    let handle = payloads.store(&bytes)?;
    debug!(
        handle = %handle,
        size_bytes = bytes.len(),
        threshold,
        "row payload externalized"
    );

    Ok(RowPayload::External {
        handle,
        storage: payloads.storage_type().to_string(),
        size_bytes: bytes.len() as u64,
    })
}

/// Rehydrate a task's rows, fetching externalized payloads as needed.
pub fn load_rows(payloads: &dyn PayloadStore, payload: &RowPayload) -> Result<Vec<Value>> {
    match payload {
        RowPayload::None => Ok(Vec::new()),
        RowPayload::Inline { rows } => Ok(rows.clone()),
        RowPayload::External { handle, .. } => {
            let bytes = payloads.retrieve(handle)?;
            Ok(serde_json::from_slice(&bytes)?)
        }
    }
}

/// Drop an externalized payload, logging rather than failing on errors.
pub fn discard_rows(payloads: &dyn PayloadStore, payload: &RowPayload) {
    if let RowPayload::External { handle, .. } = payload {
        if let Err(error) = payloads.delete(handle) {
            warn!(handle = %handle, %error, "failed to delete externalized payload");
        }
    }
}

/// Mutex-guarded map, sufficient for tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryPayloadStore {
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    next_handle: AtomicU64,
}

impl InMemoryPayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.payloads.lock().expect("payload store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PayloadStore for InMemoryPayloadStore {
    fn store(&self, bytes: &[u8]) -> Result<String> {
        let handle = format!("payload-{}", self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.payloads
            .lock()
            .expect("payload store lock poisoned")
            .insert(handle.clone(), bytes.to_vec());
        Ok(handle)
    }

    fn retrieve(&self, handle: &str) -> Result<Vec<u8>> {
        self.payloads
            .lock()
            .expect("payload store lock poisoned")
            .get(handle)
            .cloned()
            .ok_or_else(|| PrivdagError::StorageError(format!("unknown payload handle '{handle}'")))
    }

    fn delete(&self, handle: &str) -> Result<()> {
        self.payloads
            .lock()
            .expect("payload store lock poisoned")
            .remove(handle);
        Ok(())
    }

    fn storage_type(&self) -> &'static str {
        "memory"
    }
}
