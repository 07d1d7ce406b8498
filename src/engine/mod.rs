// src/engine/mod.rs

//! Task execution engine for privacy requests.
//!
//! This module ties together:
//! - the request planner that persists one task per traversal node
//! - the store-backed scheduler (the task table is the single source of
//!   truth; workers claim tasks with compare-and-set status updates)
//! - the synchronous core that consumes [`EngineEvent`]s and produces
//!   commands
//! - the async runtime shell that reacts to:
//!   - connector completions, failures and deferrals
//!   - out-of-band callback deliveries
//!   - pause / resume / cancel signals
//!
//! The deterministic core lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use serde_json::Value;

/// Canonical task id type used throughout the engine.
pub type TaskId = String;

/// Events flowing into the engine from connectors, webhooks and operators.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// An access task's connector query produced rows.
    TaskCompleted { task_id: TaskId, rows: Vec<Value> },
    /// A task's connector query failed.
    TaskFailed { task_id: TaskId, error: String },
    /// A connector issued its request and will receive results out of band.
    TaskDeferred { task_id: TaskId },
    /// A connector needs operator-supplied input before it can proceed.
    TaskRequiresInput { task_id: TaskId },
    /// An erasure task finished masking.
    TaskMasked { task_id: TaskId, rows_masked: u64 },
    /// An out-of-band webhook delivered the rows for a deferred task.
    CallbackReceived { task_id: TaskId, rows: Vec<Value> },
    /// Operator input arrived for a task in `RequiresInput`.
    InputProvided { task_id: TaskId },
    /// A policy webhook halted the named task and everything depending on
    /// it. Sibling branches keep running.
    PauseRequested { task_id: TaskId },
    /// Explicit external resume for the whole request.
    ResumeRequested,
    /// Explicit external cancel for the whole request.
    CancelRequested,
    /// Graceful shutdown of the runtime loop.
    ShutdownRequested,
}

/// Aggregate, user-visible status of one privacy request, derived entirely
/// from the persisted task statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    InProcessing,
    Paused,
    AwaitingAsyncCallback,
    RequiresInput,
    Complete,
    CompleteWithErrors,
    Canceled,
}

impl RequestStatus {
    /// Settled requests cannot make further progress, with or without
    /// external events.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            RequestStatus::Complete | RequestStatus::CompleteWithErrors | RequestStatus::Canceled
        )
    }
}

/// Engine tuning knobs shared by the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Total attempts allowed per task before `Error` becomes terminal.
    pub max_attempts: u32,
    /// Row payloads serialized larger than this are stored externally and a
    /// handle is persisted instead.
    pub inline_storage_threshold: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            inline_storage_threshold: 64 * 1024,
        }
    }
}

pub mod connector;
pub mod core;
pub mod handlers;
pub mod masking;
pub mod planner;
pub mod policy;
pub mod runtime;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod task;

pub use self::core::EngineCore;
pub use connector::{Connector, ConnectorBackend, ConnectorResponse, QueuedConnectorBackend};
pub use handlers::{CoreCommand, CoreStep};
pub use masking::{MaskingStrategy, NullRewrite, StringRewrite};
pub use policy::{Policy, Rule};
pub use runtime::Runtime;
pub use scheduler::TaskScheduler;
pub use storage::{InMemoryPayloadStore, PayloadStore};
pub use store::{InMemoryTaskStore, TaskStore};
pub use task::{
    AccessRequest, ActionType, DispatchedTask, DispatchedWork, EdgeValues, ErasureJob, MaskTarget,
    RequestTask, RowPayload, SeedValue, TaskStatus,
};
