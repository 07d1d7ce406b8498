// src/engine/store.rs

//! Task table repository.
//!
//! The task table is the single source of truth for scheduling: workers
//! mutate only the rows of tasks they own, and status transitions go through
//! `cas_status` so two workers can never double-execute one task. Production
//! deployments back this with a database table; tests and local runs use
//! [`InMemoryTaskStore`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::engine::task::{RequestTask, RowPayload, TaskStatus};
use crate::errors::{PrivdagError, Result};

pub trait TaskStore: Send + Sync {
    /// Insert a new task. Inserting an id that already exists is an error;
    /// resumption reuses existing rows instead of re-inserting.
    fn insert(&self, task: RequestTask) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<RequestTask>>;

    /// All tasks belonging to one privacy request, in id order.
    fn for_request(&self, request_id: &str) -> Result<Vec<RequestTask>>;

    /// Compare-and-set the status: the transition happens only if the
    /// current status equals `expected`. Returns whether it did.
    fn cas_status(&self, id: &str, expected: TaskStatus, next: TaskStatus) -> Result<bool>;

    /// Persist the task's collected rows (checkpoint before completion).
    fn record_rows(&self, id: &str, rows: RowPayload) -> Result<()>;

    fn record_rows_masked(&self, id: &str, rows_masked: u64) -> Result<()>;

    /// Increment and return the task's attempt counter.
    fn bump_attempts(&self, id: &str) -> Result<u32>;

    /// Reset the attempt counter, used when a restart re-enqueues a failed
    /// task.
    fn reset_attempts(&self, id: &str) -> Result<()>;
}

/// Mutex-guarded map, sufficient for tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<BTreeMap<String, RequestTask>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_task<T>(&self, id: &str, f: impl FnOnce(&mut RequestTask) -> T) -> Result<T> {
        let mut tasks = self.tasks.lock().expect("task store lock poisoned");
        match tasks.get_mut(id) {
            Some(task) => Ok(f(task)),
            None => Err(PrivdagError::TaskNotFound(id.to_string())),
        }
    }
}

impl TaskStore for InMemoryTaskStore {
    fn insert(&self, task: RequestTask) -> Result<()> {
        let mut tasks = self.tasks.lock().expect("task store lock poisoned");
        if tasks.contains_key(&task.id) {
            return Err(PrivdagError::StorageError(format!(
                "task '{}' already exists",
                task.id
            )));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<RequestTask>> {
        let tasks = self.tasks.lock().expect("task store lock poisoned");
        Ok(tasks.get(id).cloned())
    }

    fn for_request(&self, request_id: &str) -> Result<Vec<RequestTask>> {
        let tasks = self.tasks.lock().expect("task store lock poisoned");
        Ok(tasks
            .values()
            .filter(|task| task.request_id == request_id)
            .cloned()
            .collect())
    }

    fn cas_status(&self, id: &str, expected: TaskStatus, next: TaskStatus) -> Result<bool> {
        self.with_task(id, |task| {
            if task.status == expected {
                task.status = next;
                true
            } else {
                false
            }
        })
    }

    fn record_rows(&self, id: &str, rows: RowPayload) -> Result<()> {
        self.with_task(id, |task| task.rows = rows)
    }

    fn record_rows_masked(&self, id: &str, rows_masked: u64) -> Result<()> {
        self.with_task(id, |task| task.rows_masked = Some(rows_masked))
    }

    fn bump_attempts(&self, id: &str) -> Result<u32> {
        self.with_task(id, |task| {
            task.attempts += 1;
            task.attempts
        })
    }

    fn reset_attempts(&self, id: &str) -> Result<()> {
        self.with_task(id, |task| task.attempts = 0)
    }
}
