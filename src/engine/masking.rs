// src/engine/masking.rs

//! Masking strategy contract and erasure application.
//!
//! Strategies overwrite individual values; which values get overwritten is
//! decided here by refining each policy-selected field path against the
//! node's access rows. Writing the masked rows back to the owning store is
//! the connector's concern and out of scope.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::task::ErasureJob;
use crate::refine::{refine, value_at, write_at};

pub trait MaskingStrategy: Send + Sync {
    fn key(&self) -> &'static str;

    /// Produce the replacement for one matched value.
    fn mask(&self, value: &Value) -> Value;
}

/// Default strategy: overwrite with null.
#[derive(Debug, Default)]
pub struct NullRewrite;

impl MaskingStrategy for NullRewrite {
    fn key(&self) -> &'static str {
        "null_rewrite"
    }

    fn mask(&self, _value: &Value) -> Value {
        Value::Null
    }
}

/// Overwrite with a fixed placeholder string.
#[derive(Debug)]
pub struct StringRewrite {
    pub placeholder: String,
}

impl Default for StringRewrite {
    fn default() -> Self {
        Self {
            placeholder: "MASKED".to_string(),
        }
    }
}

impl MaskingStrategy for StringRewrite {
    fn key(&self) -> &'static str {
        "string_rewrite"
    }

    fn mask(&self, _value: &Value) -> Value {
        Value::String(self.placeholder.clone())
    }
}

/// Resolve a policy rule's strategy key; unknown keys fall back to
/// [`NullRewrite`] with a warning.
pub fn strategy_for(key: Option<&str>) -> Arc<dyn MaskingStrategy> {
    match key {
        None | Some("null_rewrite") => Arc::new(NullRewrite),
        Some("string_rewrite") => Arc::new(StringRewrite::default()),
        Some(other) => {
            warn!(strategy = other, "unknown masking strategy; using null_rewrite");
            Arc::new(NullRewrite)
        }
    }
}

/// Apply the strategy to every refined target path of every row.
///
/// Returns the number of rows in which at least one value was overwritten.
pub fn mask_rows(job: &ErasureJob, strategy: &dyn MaskingStrategy) -> u64 {
    let mut rows_masked = 0;

    for row in &job.rows {
        let mut row = row.clone();
        let mut touched = false;

        for target in &job.targets {
            for path in refine(&row, &target.path, None) {
                let already_null = value_at(&row, &path).is_none_or(Value::is_null);
                if already_null {
                    continue;
                }
                let replacement = match value_at(&row, &path) {
                    Some(current) => strategy.mask(current),
                    None => continue,
                };
                touched |= write_at(&mut row, &path, replacement);
            }
        }

        if touched {
            rows_masked += 1;
        }
    }

    debug!(
        task = %job.task_id,
        node = %job.node,
        rows = job.rows.len(),
        rows_masked,
        strategy = strategy.key(),
        "erasure applied"
    );

    rows_masked
}
