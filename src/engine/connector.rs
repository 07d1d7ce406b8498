// src/engine/connector.rs

//! Pluggable connector backend abstraction.
//!
//! The runtime talks to a [`ConnectorBackend`] instead of a raw mpsc sender.
//! This makes it easy to swap in a fake backend in tests while keeping the
//! production worker loop here.
//!
//! - [`QueuedConnectorBackend`] is the default implementation: it forwards
//!   claimed access tasks to a background worker loop that executes the
//!   [`Connector`] query per task and reports back via [`EngineEvent`]s.
//! - Tests can provide their own backend that records dispatched tasks and
//!   directly emits completion events.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::engine::task::AccessRequest;
use crate::engine::{EngineEvent, TaskId};
use crate::errors::{Error, Result};

/// What a connector query produced.
#[derive(Debug, Clone)]
pub enum ConnectorResponse {
    Rows(Vec<Value>),
    /// The request was issued; results arrive out of band via webhook.
    AwaitCallback,
    /// Operator input is needed before the query can run.
    RequiresInput,
}

/// Narrow query interface to one data store. Per-connector implementations
/// (SQL, SaaS, document stores) live behind this seam.
pub trait Connector: Send + Sync + 'static {
    fn execute(
        &self,
        request: AccessRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ConnectorResponse>> + Send>>;
}

/// Trait abstracting how claimed access tasks are executed.
pub trait ConnectorBackend: Send {
    /// Dispatch the given access tasks for execution. The implementation is
    /// free to run real queries (production) or simulate completion and emit
    /// [`EngineEvent`]s (tests).
    fn dispatch(
        &mut self,
        requests: Vec<AccessRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Best-effort interruption of everything in flight. A task that slips
    /// through and reports late is discarded by its failed status CAS.
    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

enum WorkerMessage {
    Run(AccessRequest),
    CancelAll,
}

/// Default backend: one background loop, one spawned worker per dispatched
/// task, cancellation via per-task oneshot channels.
pub struct QueuedConnectorBackend {
    tx: mpsc::Sender<WorkerMessage>,
}

impl QueuedConnectorBackend {
    /// Spawn the background worker loop immediately.
    pub fn new(connector: Arc<dyn Connector>, event_tx: mpsc::Sender<EngineEvent>) -> Self {
        let tx = spawn_worker_loop(connector, event_tx);
        Self { tx }
    }
}

impl ConnectorBackend for QueuedConnectorBackend {
    fn dispatch(
        &mut self,
        requests: Vec<AccessRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();
        Box::pin(async move {
            for request in requests {
                tx.send(WorkerMessage::Run(request))
                    .await
                    .map_err(|e| Error::msg(e.to_string()))?;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let tx = self.tx.clone();
        Box::pin(async move {
            let _ = tx.send(WorkerMessage::CancelAll).await;
        })
    }
}

fn spawn_worker_loop(
    connector: Arc<dyn Connector>,
    event_tx: mpsc::Sender<EngineEvent>,
) -> mpsc::Sender<WorkerMessage> {
    let (tx, mut rx) = mpsc::channel::<WorkerMessage>(32);

    tokio::spawn(async move {
        info!("connector worker loop started");

        let mut active: HashMap<TaskId, oneshot::Sender<()>> = HashMap::new();

        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::Run(request) => {
                    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
                    let task_id = request.task_id.clone();
                    let connector = Arc::clone(&connector);
                    let event_tx = event_tx.clone();

                    tokio::spawn(async move {
                        run_one(connector, request, event_tx, cancel_rx).await;
                    });

                    active.insert(task_id, cancel_tx);
                }
                WorkerMessage::CancelAll => {
                    debug!(in_flight = active.len(), "interrupting in-flight connector calls");
                    for (_, cancel) in active.drain() {
                        let _ = cancel.send(());
                    }
                }
            }
        }

        info!("connector worker loop finished (channel closed)");
    });

    tx
}

async fn run_one(
    connector: Arc<dyn Connector>,
    request: AccessRequest,
    event_tx: mpsc::Sender<EngineEvent>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let task_id = request.task_id.clone();
    let node = request.node.clone();

    tokio::select! {
        result = connector.execute(request) => {
            let event = match result {
                Ok(ConnectorResponse::Rows(rows)) => {
                    debug!(task = %task_id, node = %node, rows = rows.len(), "connector query finished");
                    EngineEvent::TaskCompleted { task_id, rows }
                }
                Ok(ConnectorResponse::AwaitCallback) => {
                    debug!(task = %task_id, node = %node, "connector awaiting out-of-band callback");
                    EngineEvent::TaskDeferred { task_id }
                }
                Ok(ConnectorResponse::RequiresInput) => {
                    EngineEvent::TaskRequiresInput { task_id }
                }
                Err(error) => EngineEvent::TaskFailed {
                    task_id,
                    error: error.to_string(),
                },
            };
            let _ = event_tx.send(event).await;
        }
        _ = cancel_rx => {
            // Interrupted; send nothing. Whatever the query would have
            // produced is unwanted now.
            debug!(task = %task_id, node = %node, "connector call interrupted");
        }
    }
}
