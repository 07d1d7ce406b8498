// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::connector::ConnectorBackend;
use crate::engine::core::EngineCore;
use crate::engine::handlers::CoreCommand;
use crate::engine::masking::{self, strategy_for};
use crate::engine::task::{DispatchedTask, DispatchedWork, ErasureJob};
use crate::engine::{EngineEvent, RequestStatus};
use crate::errors::Result;

/// Drives one privacy request in response to [`EngineEvent`]s, delegating
/// access queries to a [`ConnectorBackend`] and erasure masking to spawned
/// workers.
///
/// This is a pure IO shell around [`EngineCore`], which contains all the
/// scheduling semantics. The shell reads events from the channel, feeds them
/// to the core and executes the commands it returns.
pub struct Runtime<C: ConnectorBackend> {
    core: EngineCore,
    event_rx: mpsc::Receiver<EngineEvent>,
    /// Cloned into spawned erasure workers so they can report back.
    event_tx: mpsc::Sender<EngineEvent>,
    connector: C,
}

impl<C: ConnectorBackend> fmt::Debug for Runtime<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

impl<C: ConnectorBackend> Runtime<C> {
    pub fn new(
        core: EngineCore,
        event_rx: mpsc::Receiver<EngineEvent>,
        event_tx: mpsc::Sender<EngineEvent>,
        connector: C,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            connector,
        }
    }

    /// Main event loop. Runs until the request settles, a shutdown is
    /// requested, or the event channel closes.
    pub async fn run(mut self) -> Result<RequestStatus> {
        info!(
            request_id = %self.core.scheduler().request_id(),
            "privacy request runtime started"
        );

        let step = self.core.start()?;
        let mut keep_running = step.keep_running;
        for command in step.commands {
            self.execute_command(command).await?;
        }

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(event) => event,
                None => {
                    info!("engine event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event)?;
            for command in step.commands {
                self.execute_command(command).await?;
            }
            keep_running = step.keep_running;
        }

        let status = self.core.scheduler().request_status()?;
        info!(?status, "runtime exiting");
        Ok(status)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.dispatch(tasks).await?,
            CoreCommand::CancelWorkers => self.connector.cancel_all().await,
            CoreCommand::FinishRequest(status) => {
                info!(?status, "request settled");
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, tasks: Vec<DispatchedTask>) -> Result<()> {
        let mut access = Vec::new();
        for task in tasks {
            match task.work {
                DispatchedWork::Access(request) => access.push(request),
                DispatchedWork::Erasure(job) => self.spawn_masking_worker(job),
            }
        }

        if !access.is_empty() {
            let names: Vec<_> = access.iter().map(|r| r.node.to_string()).collect();
            debug!(?names, "dispatching access tasks to connector");
            self.connector.dispatch(access).await?;
        }

        Ok(())
    }

    /// Masking runs off the event loop so a large row set never blocks
    /// scheduling; the worker reports back like any other task.
    fn spawn_masking_worker(&self, job: ErasureJob) {
        let event_tx = self.event_tx.clone();
        let strategy = strategy_for(job.strategy.as_deref());

        tokio::spawn(async move {
            let task_id = job.task_id.clone();
            let rows_masked = masking::mask_rows(&job, strategy.as_ref());
            let _ = event_tx
                .send(EngineEvent::TaskMasked {
                    task_id,
                    rows_masked,
                })
                .await;
        });
    }
}
