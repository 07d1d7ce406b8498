use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use privdag::engine::{
    AccessRequest, Connector, ConnectorBackend, ConnectorResponse, EngineEvent,
};
use privdag::errors::Result;

/// A fake connector backend that:
/// - records which nodes were dispatched (in order)
/// - immediately reports a canned outcome per collection address:
///   canned rows (default empty), a failure, or a deferral.
pub struct FakeBackend {
    event_tx: mpsc::Sender<EngineEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    rows: HashMap<String, Vec<Value>>,
    failing: HashSet<String>,
    deferring: HashSet<String>,
}

impl FakeBackend {
    pub fn new(
        event_tx: mpsc::Sender<EngineEvent>,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            event_tx,
            executed,
            rows: HashMap::new(),
            failing: HashSet::new(),
            deferring: HashSet::new(),
        }
    }

    /// Canned rows returned for an address (e.g. `"db.users"`).
    pub fn with_rows(mut self, address: &str, rows: Vec<Value>) -> Self {
        self.rows.insert(address.to_string(), rows);
        self
    }

    /// Make every dispatch of this address fail.
    pub fn failing(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }

    /// Make this address defer to an out-of-band callback.
    pub fn deferring(mut self, address: &str) -> Self {
        self.deferring.insert(address.to_string());
        self
    }
}

impl ConnectorBackend for FakeBackend {
    fn dispatch(
        &mut self,
        requests: Vec<AccessRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.event_tx.clone();
        let executed = Arc::clone(&self.executed);
        let rows = self.rows.clone();
        let failing = self.failing.clone();
        let deferring = self.deferring.clone();

        Box::pin(async move {
            for request in requests {
                let address = request.node.to_string();
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(address.clone());
                }

                let event = if failing.contains(&address) {
                    EngineEvent::TaskFailed {
                        task_id: request.task_id.clone(),
                        error: format!("fake failure for {address}"),
                    }
                } else if deferring.contains(&address) {
                    EngineEvent::TaskDeferred {
                        task_id: request.task_id.clone(),
                    }
                } else {
                    EngineEvent::TaskCompleted {
                        task_id: request.task_id.clone(),
                        rows: rows.get(&address).cloned().unwrap_or_default(),
                    }
                };

                tx.send(event).await.map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}

/// A `Connector` implementation serving canned rows per collection address,
/// for tests that exercise the real queued backend.
pub struct StaticConnector {
    rows: HashMap<String, Vec<Value>>,
}

impl StaticConnector {
    pub fn new() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    pub fn with_rows(mut self, address: &str, rows: Vec<Value>) -> Self {
        self.rows.insert(address.to_string(), rows);
        self
    }
}

impl Default for StaticConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for StaticConnector {
    fn execute(
        &self,
        request: AccessRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ConnectorResponse>> + Send>> {
        let rows = self
            .rows
            .get(&request.node.to_string())
            .cloned()
            .unwrap_or_default();
        Box::pin(async move { Ok(ConnectorResponse::Rows(rows)) })
    }
}
