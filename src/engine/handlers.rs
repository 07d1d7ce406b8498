// src/engine/handlers.rs

//! Event handling logic for the engine core.

use serde_json::Value;

use crate::engine::scheduler::TaskScheduler;
use crate::engine::task::{DispatchedTask, TaskStatus};
use crate::engine::{RequestStatus, TaskId};
use crate::errors::Result;

/// Command produced by the core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these claimed tasks to their workers.
    DispatchTasks(Vec<DispatchedTask>),
    /// Interrupt in-flight connector calls (best-effort, used on cancel).
    CancelWorkers,
    /// The request settled; the shell should wind down with this status.
    FinishRequest(RequestStatus),
}

/// Decision returned by the core after handling a single [`EngineEvent`].
///
/// [`EngineEvent`]: crate::engine::EngineEvent
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

pub fn handle_task_completed(
    scheduler: &TaskScheduler,
    task_id: TaskId,
    rows: Vec<Value>,
) -> Result<CoreStep> {
    scheduler.complete_with_rows(&task_id, rows, TaskStatus::InProcessing)?;
    advance(scheduler)
}

pub fn handle_task_masked(
    scheduler: &TaskScheduler,
    task_id: TaskId,
    rows_masked: u64,
) -> Result<CoreStep> {
    scheduler.complete_masked(&task_id, rows_masked)?;
    advance(scheduler)
}

pub fn handle_task_failed(
    scheduler: &TaskScheduler,
    task_id: TaskId,
    error: &str,
) -> Result<CoreStep> {
    scheduler.fail_task(&task_id, error)?;
    advance(scheduler)
}

pub fn handle_task_deferred(scheduler: &TaskScheduler, task_id: TaskId) -> Result<CoreStep> {
    scheduler.defer_task(&task_id)?;
    advance(scheduler)
}

pub fn handle_task_requires_input(scheduler: &TaskScheduler, task_id: TaskId) -> Result<CoreStep> {
    scheduler.require_input(&task_id)?;
    advance(scheduler)
}

pub fn handle_callback_received(
    scheduler: &TaskScheduler,
    task_id: TaskId,
    rows: Vec<Value>,
) -> Result<CoreStep> {
    scheduler.callback_received(&task_id, rows)?;
    advance(scheduler)
}

pub fn handle_input_provided(scheduler: &TaskScheduler, task_id: TaskId) -> Result<CoreStep> {
    scheduler.input_provided(&task_id)?;
    advance(scheduler)
}

pub fn handle_pause_requested(scheduler: &TaskScheduler, task_id: TaskId) -> Result<CoreStep> {
    scheduler.pause(&task_id)?;
    advance(scheduler)
}

pub fn handle_resume_requested(scheduler: &TaskScheduler) -> Result<CoreStep> {
    scheduler.resume()?;
    advance(scheduler)
}

pub fn handle_cancel_requested(scheduler: &TaskScheduler) -> Result<CoreStep> {
    scheduler.cancel()?;

    let mut step = advance(scheduler)?;
    step.commands.insert(0, CoreCommand::CancelWorkers);
    Ok(step)
}

/// Claim whatever became runnable and decide whether the request settled.
///
/// Every handler funnels through this, so the frontier expands the same way
/// no matter which event moved it.
pub fn advance(scheduler: &TaskScheduler) -> Result<CoreStep> {
    let mut commands = Vec::new();

    let ready = scheduler.claim_runnable()?;
    if !ready.is_empty() {
        commands.push(CoreCommand::DispatchTasks(ready));
    }

    let status = scheduler.request_status()?;
    let keep_running = !status.is_settled();
    if !keep_running {
        commands.push(CoreCommand::FinishRequest(status));
    }

    Ok(CoreStep {
        commands,
        keep_running,
    })
}
