// src/engine/task.rs

//! Persisted task model and the dispatch views handed to workers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::TaskId;
use crate::graph::{CollectionAddress, FieldAddress};
use crate::traversal::TraversalEdge;

/// What a privacy request does to the data it reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Access,
    Erasure,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Access => "access",
            ActionType::Erasure => "erasure",
        }
    }
}

/// Persisted status of one task.
///
/// `Pending → InProcessing → {Complete | Error | RequiresInput |
/// AwaitingAsyncCallback | Paused}`. `Error` (attempts remaining) and
/// `RequiresInput` re-enter `InProcessing` via `Pending`; `Paused` waits for
/// an explicit resume; `Complete`, exhausted `Error` and `Canceled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProcessing,
    Complete,
    Error,
    RequiresInput,
    AwaitingAsyncCallback,
    Paused,
    Canceled,
}

/// Collected rows of a task: absent, persisted inline, or externalized to a
/// payload store when too large for the task table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RowPayload {
    None,
    Inline {
        rows: Vec<Value>,
    },
    External {
        handle: String,
        storage: String,
        size_bytes: u64,
    },
}

/// Persisted execution unit for one traversal node within one privacy
/// request. Retained after completion for audit and resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTask {
    pub id: TaskId,
    pub request_id: String,
    pub address: CollectionAddress,
    pub action: ActionType,
    pub status: TaskStatus,
    /// Tasks that must all reach `Complete` before this one may start.
    pub upstream_tasks: Vec<TaskId>,
    /// Tasks whose readiness is re-checked when this one completes.
    pub downstream_tasks: Vec<TaskId>,
    /// Transitive closure of `downstream_tasks`, computed once at plan time
    /// and never recomputed mid-execution.
    pub all_descendant_tasks: Vec<TaskId>,
    /// Reference edges feeding this node's query.
    pub incoming: Vec<TraversalEdge>,
    /// Identity fields of this node activated by the request's seeds.
    pub seed_fields: Vec<(String, FieldAddress)>,
    pub rows: RowPayload,
    pub rows_masked: Option<u64>,
    pub attempts: u32,
}

impl RequestTask {
    /// Deterministic task id, stable across resumptions of the same request.
    pub fn task_id(request_id: &str, action: ActionType, address: &CollectionAddress) -> TaskId {
        format!("{request_id}:{}:{address}", action.as_str())
    }
}

/// One identity seed value supplied to an access query.
#[derive(Debug, Clone)]
pub struct SeedValue {
    pub seed_key: String,
    pub field: String,
    pub value: Value,
}

/// Values extracted from one upstream task's rows for one reference edge,
/// already cast to the target field's declared type.
#[derive(Debug, Clone)]
pub struct EdgeValues {
    pub source: FieldAddress,
    pub target_field: String,
    pub values: Vec<Value>,
}

/// Connector-facing view of a runnable access task.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub task_id: TaskId,
    pub node: CollectionAddress,
    pub seeds: Vec<SeedValue>,
    pub inputs: Vec<EdgeValues>,
}

/// One field selected for masking by the active policy.
#[derive(Debug, Clone)]
pub struct MaskTarget {
    pub category: String,
    pub path: Vec<String>,
}

/// Masking-worker view of a runnable erasure task: the node's access rows
/// plus the policy-selected targets.
#[derive(Debug, Clone)]
pub struct ErasureJob {
    pub task_id: TaskId,
    pub node: CollectionAddress,
    pub rows: Vec<Value>,
    pub targets: Vec<MaskTarget>,
    pub strategy: Option<String>,
}

/// Work the scheduler hands to the runtime shell after claiming a task.
#[derive(Debug, Clone)]
pub enum DispatchedWork {
    Access(AccessRequest),
    Erasure(ErasureJob),
}

/// A claimed task plus the work derived for it.
#[derive(Debug, Clone)]
pub struct DispatchedTask {
    pub task_id: TaskId,
    pub address: CollectionAddress,
    pub action: ActionType,
    pub work: DispatchedWork,
}
