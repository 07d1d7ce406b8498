// src/engine/core.rs

//! Deterministic engine core.
//!
//! The core consumes [`EngineEvent`]s and produces [`CoreStep`]s describing
//! what the IO shell should do next. It performs no channel or process IO of
//! its own; all state lives in the task table, so the core can be driven
//! synchronously in tests without Tokio.

use crate::engine::handlers::{
    CoreStep, advance, handle_callback_received, handle_cancel_requested, handle_input_provided,
    handle_pause_requested, handle_resume_requested, handle_task_completed, handle_task_deferred,
    handle_task_failed, handle_task_masked, handle_task_requires_input,
};
use crate::engine::scheduler::TaskScheduler;
use crate::engine::EngineEvent;
use crate::errors::Result;
use crate::traversal::Traversal;

pub struct EngineCore {
    scheduler: TaskScheduler,
    traversal: Traversal,
}

impl EngineCore {
    pub fn new(scheduler: TaskScheduler, traversal: Traversal) -> Self {
        Self {
            scheduler,
            traversal,
        }
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Persist (or adopt) the plan, recover orphaned tasks and claim the
    /// initial frontier.
    pub fn start(&self) -> Result<CoreStep> {
        self.scheduler.plan(&self.traversal)?;
        self.scheduler.recover_orphans()?;
        advance(&self.scheduler)
    }

    /// Handle a single engine event, returning the resulting commands for
    /// the IO shell.
    pub fn step(&self, event: EngineEvent) -> Result<CoreStep> {
        match event {
            EngineEvent::TaskCompleted { task_id, rows } => {
                handle_task_completed(&self.scheduler, task_id, rows)
            }
            EngineEvent::TaskFailed { task_id, error } => {
                handle_task_failed(&self.scheduler, task_id, &error)
            }
            EngineEvent::TaskDeferred { task_id } => {
                handle_task_deferred(&self.scheduler, task_id)
            }
            EngineEvent::TaskRequiresInput { task_id } => {
                handle_task_requires_input(&self.scheduler, task_id)
            }
            EngineEvent::TaskMasked {
                task_id,
                rows_masked,
            } => handle_task_masked(&self.scheduler, task_id, rows_masked),
            EngineEvent::CallbackReceived { task_id, rows } => {
                handle_callback_received(&self.scheduler, task_id, rows)
            }
            EngineEvent::InputProvided { task_id } => {
                handle_input_provided(&self.scheduler, task_id)
            }
            EngineEvent::PauseRequested { task_id } => {
                handle_pause_requested(&self.scheduler, task_id)
            }
            EngineEvent::ResumeRequested => handle_resume_requested(&self.scheduler),
            EngineEvent::CancelRequested => handle_cancel_requested(&self.scheduler),
            EngineEvent::ShutdownRequested => Ok(CoreStep {
                commands: Vec::new(),
                keep_running: false,
            }),
        }
    }
}
