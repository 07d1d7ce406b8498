// src/engine/scheduler.rs

//! Store-backed task scheduling.
//!
//! The scheduler holds no run state of its own: every decision is derived
//! from the persisted task table, and every transition goes through a
//! compare-and-set on the task's status. That makes the engine horizontally
//! scalable (any worker can claim work) and crash-tolerant (the frontier is
//! re-derived from statuses alone).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::planner::plan_tasks;
use crate::engine::policy::Policy;
use crate::engine::storage::{self, PayloadStore};
use crate::engine::store::TaskStore;
use crate::engine::task::{
    AccessRequest, ActionType, DispatchedTask, DispatchedWork, EdgeValues, ErasureJob, MaskTarget,
    RequestTask, RowPayload, SeedValue, TaskStatus,
};
use crate::engine::{EngineOptions, RequestStatus};
use crate::errors::Result;
use crate::graph::DatasetGraph;
use crate::refine::{refine, value_at};
use crate::traversal::{Traversal, TraversalEdge};

/// Scheduler for the tasks of one privacy request.
pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    payloads: Arc<dyn PayloadStore>,
    graph: Arc<DatasetGraph>,
    policy: Policy,
    seeds: BTreeMap<String, Value>,
    request_id: String,
    action: ActionType,
    options: EngineOptions,
}

impl TaskScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TaskStore>,
        payloads: Arc<dyn PayloadStore>,
        graph: Arc<DatasetGraph>,
        policy: Policy,
        seeds: BTreeMap<String, Value>,
        request_id: impl Into<String>,
        action: ActionType,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            payloads,
            graph,
            policy,
            seeds,
            request_id: request_id.into(),
            action,
            options,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn action(&self) -> ActionType {
        self.action
    }

    /// Persist the execution plan, or adopt the existing one on resumption.
    ///
    /// A misconfigured policy is fatal here, before any task starts.
    pub fn plan(&self, traversal: &Traversal) -> Result<()> {
        self.policy.validate_for(self.action)?;

        let existing = self.store.for_request(&self.request_id)?;
        if !existing.is_empty() {
            info!(
                request_id = %self.request_id,
                tasks = existing.len(),
                "resuming request from persisted tasks"
            );
            return Ok(());
        }

        for task in plan_tasks(&self.request_id, self.action, traversal) {
            self.store.insert(task)?;
        }
        Ok(())
    }

    /// Re-enqueue tasks left `InProcessing` by a dead worker, and tasks that
    /// exhausted their attempts in a previous run (failed work may be
    /// retried without limit across restarts). Called once on startup;
    /// already-`Complete` tasks are never touched, preserving at-most-once
    /// completion of successful work.
    pub fn recover_orphans(&self) -> Result<()> {
        for task in self.store.for_request(&self.request_id)? {
            match task.status {
                TaskStatus::InProcessing => {
                    if self
                        .store
                        .cas_status(&task.id, TaskStatus::InProcessing, TaskStatus::Pending)?
                    {
                        info!(task = %task.id, "re-enqueued task orphaned by a previous run");
                    }
                }
                TaskStatus::Error => {
                    if self
                        .store
                        .cas_status(&task.id, TaskStatus::Error, TaskStatus::Pending)?
                    {
                        self.store.reset_attempts(&task.id)?;
                        info!(task = %task.id, "re-enqueued failed task for a fresh round of attempts");
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Claim every runnable task (`Pending` with all upstream tasks
    /// `Complete`) and derive the work to dispatch for it.
    ///
    /// The claim is a CAS `Pending → InProcessing`; losing the race to
    /// another worker just drops the task from this worker's batch.
    pub fn claim_runnable(&self) -> Result<Vec<DispatchedTask>> {
        let snapshot = self.store.for_request(&self.request_id)?;
        let by_id: BTreeMap<&str, &RequestTask> =
            snapshot.iter().map(|t| (t.id.as_str(), t)).collect();

        let mut dispatched = Vec::new();
        for task in &snapshot {
            if task.status != TaskStatus::Pending || !upstreams_complete(task, &by_id) {
                continue;
            }
            if !self
                .store
                .cas_status(&task.id, TaskStatus::Pending, TaskStatus::InProcessing)?
            {
                continue;
            }

            debug!(
                task = %task.id,
                attempts = task.attempts,
                "upstream tasks complete; claimed task"
            );

            let work = match task.action {
                ActionType::Access => DispatchedWork::Access(self.access_request(task)?),
                ActionType::Erasure => DispatchedWork::Erasure(self.erasure_job(task)?),
            };
            dispatched.push(DispatchedTask {
                task_id: task.id.clone(),
                address: task.address.clone(),
                action: task.action,
                work,
            });
        }

        Ok(dispatched)
    }

    /// Checkpoint rows, then mark the task `Complete`. The rows are
    /// persisted *before* the status flip so a crash in between leaves a
    /// re-runnable task rather than a completed one without its output.
    ///
    /// Returns `false` when the CAS loses (e.g. the task was canceled or
    /// paused meanwhile); the late result is discarded.
    pub fn complete_with_rows(
        &self,
        task_id: &str,
        rows: Vec<Value>,
        from: TaskStatus,
    ) -> Result<bool> {
        let payload = storage::persist_rows(
            self.payloads.as_ref(),
            self.options.inline_storage_threshold,
            rows,
        )?;
        self.store.record_rows(task_id, payload.clone())?;

        if self.store.cas_status(task_id, from, TaskStatus::Complete)? {
            return Ok(true);
        }

        warn!(task = %task_id, "discarding late result for a task no longer in flight");
        storage::discard_rows(self.payloads.as_ref(), &payload);
        self.store.record_rows(task_id, RowPayload::None)?;
        Ok(false)
    }

    /// Record the masked-row count and mark the erasure task `Complete`.
    pub fn complete_masked(&self, task_id: &str, rows_masked: u64) -> Result<bool> {
        self.store.record_rows_masked(task_id, rows_masked)?;
        Ok(self
            .store
            .cas_status(task_id, TaskStatus::InProcessing, TaskStatus::Complete)?)
    }

    /// Apply the bounded retry policy to a failed task. Downstream tasks are
    /// left `Pending` (blocked), never auto-skipped.
    pub fn fail_task(&self, task_id: &str, error: &str) -> Result<TaskStatus> {
        let attempts = self.store.bump_attempts(task_id)?;

        if attempts < self.options.max_attempts {
            if self
                .store
                .cas_status(task_id, TaskStatus::InProcessing, TaskStatus::Pending)?
            {
                warn!(
                    task = %task_id,
                    attempts,
                    max_attempts = self.options.max_attempts,
                    error,
                    "task failed; scheduling retry"
                );
                return Ok(TaskStatus::Pending);
            }
        } else if self
            .store
            .cas_status(task_id, TaskStatus::InProcessing, TaskStatus::Error)?
        {
            warn!(
                task = %task_id,
                attempts,
                error,
                "task failed; attempts exhausted, marking Error"
            );
            return Ok(TaskStatus::Error);
        }

        Ok(self.status_of(task_id)?)
    }

    /// The connector issued its request and released its worker; results
    /// arrive later via [`Self::callback_received`].
    pub fn defer_task(&self, task_id: &str) -> Result<bool> {
        Ok(self.store.cas_status(
            task_id,
            TaskStatus::InProcessing,
            TaskStatus::AwaitingAsyncCallback,
        )?)
    }

    pub fn require_input(&self, task_id: &str) -> Result<bool> {
        Ok(self
            .store
            .cas_status(task_id, TaskStatus::InProcessing, TaskStatus::RequiresInput)?)
    }

    pub fn input_provided(&self, task_id: &str) -> Result<bool> {
        Ok(self
            .store
            .cas_status(task_id, TaskStatus::RequiresInput, TaskStatus::Pending)?)
    }

    /// Out-of-band delivery of a deferred task's rows.
    pub fn callback_received(&self, task_id: &str, rows: Vec<Value>) -> Result<bool> {
        self.complete_with_rows(task_id, rows, TaskStatus::AwaitingAsyncCallback)
    }

    /// Halt the named task and everything depending on it. Sibling branches
    /// of the DAG keep running; paused tasks wait for an explicit resume.
    pub fn pause(&self, task_id: &str) -> Result<()> {
        let Some(task) = self.store.get(task_id)? else {
            warn!(task = %task_id, "pause requested for unknown task; ignoring");
            return Ok(());
        };

        let paused_root = self
            .store
            .cas_status(task_id, TaskStatus::InProcessing, TaskStatus::Paused)?
            || self
                .store
                .cas_status(task_id, TaskStatus::Pending, TaskStatus::Paused)?;
        if paused_root {
            info!(task = %task_id, "task paused by policy webhook");
        }

        for descendant in &task.all_descendant_tasks {
            if self
                .store
                .cas_status(descendant, TaskStatus::Pending, TaskStatus::Paused)?
            {
                debug!(task = %descendant, "descendant paused");
            }
        }

        Ok(())
    }

    /// Explicit external resume: paused tasks re-enter `Pending` and the
    /// frontier is re-derived exactly as in crash recovery.
    pub fn resume(&self) -> Result<()> {
        for task in self.store.for_request(&self.request_id)? {
            if task.status == TaskStatus::Paused
                && self
                    .store
                    .cas_status(&task.id, TaskStatus::Paused, TaskStatus::Pending)?
            {
                debug!(task = %task.id, "task resumed");
            }
        }
        Ok(())
    }

    /// Cancel every non-terminal task. Completed branches keep their
    /// results; in-flight connector calls are interrupted best-effort and a
    /// late result loses its CAS and is discarded.
    pub fn cancel(&self) -> Result<()> {
        const CANCELABLE: [TaskStatus; 5] = [
            TaskStatus::Pending,
            TaskStatus::InProcessing,
            TaskStatus::RequiresInput,
            TaskStatus::AwaitingAsyncCallback,
            TaskStatus::Paused,
        ];

        for task in self.store.for_request(&self.request_id)? {
            for status in CANCELABLE {
                if task.status == status
                    && self.store.cas_status(&task.id, status, TaskStatus::Canceled)?
                {
                    debug!(task = %task.id, "task canceled");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Aggregate request status derived from the task table.
    pub fn request_status(&self) -> Result<RequestStatus> {
        let snapshot = self.store.for_request(&self.request_id)?;
        let by_id: BTreeMap<&str, &RequestTask> =
            snapshot.iter().map(|t| (t.id.as_str(), t)).collect();

        let any = |status: TaskStatus| snapshot.iter().any(|t| t.status == status);
        let runnable = snapshot
            .iter()
            .any(|t| t.status == TaskStatus::Pending && upstreams_complete(t, &by_id));

        let status = if any(TaskStatus::InProcessing) || runnable {
            RequestStatus::InProcessing
        } else if any(TaskStatus::Paused) {
            RequestStatus::Paused
        } else if any(TaskStatus::AwaitingAsyncCallback) {
            RequestStatus::AwaitingAsyncCallback
        } else if any(TaskStatus::RequiresInput) {
            RequestStatus::RequiresInput
        } else if any(TaskStatus::Canceled) {
            RequestStatus::Canceled
        } else if any(TaskStatus::Error) || any(TaskStatus::Pending) {
            // Blocked Pending tasks sit behind an exhausted failure.
            RequestStatus::CompleteWithErrors
        } else {
            RequestStatus::Complete
        };

        Ok(status)
    }

    /// Rehydrated access rows per collection, for assembling the
    /// user-visible access package.
    pub fn collected_rows(&self) -> Result<BTreeMap<String, Vec<Value>>> {
        let mut collected = BTreeMap::new();
        for task in self.store.for_request(&self.request_id)? {
            if task.action == ActionType::Access && task.status == TaskStatus::Complete {
                let rows = storage::load_rows(self.payloads.as_ref(), &task.rows)?;
                collected.insert(task.address.to_string(), rows);
            }
        }
        Ok(collected)
    }

    fn status_of(&self, task_id: &str) -> Result<TaskStatus> {
        Ok(self
            .store
            .get(task_id)?
            .map(|t| t.status)
            .unwrap_or(TaskStatus::Error))
    }

    /// Connector-facing view of a claimed access task: its activated seed
    /// values plus the values each incoming edge currently carries.
    fn access_request(&self, task: &RequestTask) -> Result<AccessRequest> {
        let seeds = task
            .seed_fields
            .iter()
            .filter_map(|(seed_key, field)| {
                self.seeds.get(seed_key).map(|value| SeedValue {
                    seed_key: seed_key.clone(),
                    field: field.field.clone(),
                    value: value.clone(),
                })
            })
            .collect();

        let mut inputs = Vec::new();
        for edge in &task.incoming {
            let values = self.edge_input_values(task, edge)?;
            // An edge whose source carries no value is inactive for this
            // invocation.
            if !values.is_empty() {
                inputs.push(EdgeValues {
                    source: edge.source.clone(),
                    target_field: edge.target.field.clone(),
                    values,
                });
            }
        }

        Ok(AccessRequest {
            task_id: task.id.clone(),
            node: task.address.clone(),
            seeds,
            inputs,
        })
    }

    fn edge_input_values(&self, task: &RequestTask, edge: &TraversalEdge) -> Result<Vec<Value>> {
        let upstream_id = RequestTask::task_id(
            &self.request_id,
            ActionType::Access,
            &edge.source.collection_address(),
        );
        let Some(upstream) = self.store.get(&upstream_id)? else {
            return Ok(Vec::new());
        };

        let rows = storage::load_rows(self.payloads.as_ref(), &upstream.rows)?;
        let source_path = edge.source.field_path();
        let target_field = self
            .graph
            .collection(&task.address)
            .and_then(|collection| collection.field(&edge.target.field))
            .cloned();

        let mut values: Vec<Value> = Vec::new();
        for row in &rows {
            for path in refine(row, &source_path, None) {
                let Some(value) = value_at(row, &path) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                let value = match &target_field {
                    Some(field) => field.cast(value.clone()),
                    None => value.clone(),
                };
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }

        Ok(values)
    }

    /// Masking-worker view of a claimed erasure task: the node's collected
    /// access rows plus the field paths selected by the policy's erasure
    /// rules.
    fn erasure_job(&self, task: &RequestTask) -> Result<ErasureJob> {
        let access_id =
            RequestTask::task_id(&self.request_id, ActionType::Access, &task.address);
        let rows = match self.store.get(&access_id)? {
            Some(access_task) => storage::load_rows(self.payloads.as_ref(), &access_task.rows)?,
            None => Vec::new(),
        };

        let mapping = self.graph.data_category_field_mapping(&task.address);
        let mut targets: Vec<MaskTarget> = Vec::new();
        let mut strategy = None;

        for rule in self.policy.rules_for(ActionType::Erasure) {
            if strategy.is_none() {
                strategy = rule.masking_strategy.clone();
            }
            for rule_category in &rule.data_categories {
                for (category, paths) in &mapping {
                    if !Policy::category_matches(rule_category, category) {
                        continue;
                    }
                    for path in paths {
                        let target = MaskTarget {
                            category: category.clone(),
                            path: path.clone(),
                        };
                        if !targets
                            .iter()
                            .any(|t| t.category == target.category && t.path == target.path)
                        {
                            targets.push(target);
                        }
                    }
                }
            }
        }

        Ok(ErasureJob {
            task_id: task.id.clone(),
            node: task.address.clone(),
            rows,
            targets,
            strategy,
        })
    }
}

/// AND-join: a task may start only when every upstream task is `Complete`.
fn upstreams_complete(task: &RequestTask, by_id: &BTreeMap<&str, &RequestTask>) -> bool {
    task.upstream_tasks.iter().all(|upstream| {
        by_id
            .get(upstream.as_str())
            .is_some_and(|t| t.status == TaskStatus::Complete)
    })
}
