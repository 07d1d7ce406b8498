// src/lib.rs

pub mod cli;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod refine;
pub mod schema;
pub mod traversal;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cli::CliArgs;
use crate::engine::{
    ActionType, Connector, EngineCore, EngineEvent, EngineOptions, PayloadStore, Policy,
    QueuedConnectorBackend, RequestStatus, Runtime, TaskScheduler, TaskStore,
};
use crate::graph::DatasetGraph;
use crate::traversal::Traversal;

/// High-level entry point used by `main.rs`.
///
/// Loads every dataset document in the schema directory, merges them into a
/// graph, builds the traversal for the supplied identity seeds and prints
/// the resulting execution plan. Executing the plan against real data
/// stores is the job of a deployment that wires in its connectors via
/// [`start_request`].
pub async fn run(args: CliArgs) -> Result<()> {
    let datasets = schema::load_datasets(&args.schemas)?;
    let graph = DatasetGraph::new(datasets)?;
    let seeds = parse_seeds(&args.seed)?;

    info!(
        datasets = graph.datasets().count(),
        seeds = seeds.len(),
        "building traversal plan"
    );

    let traversal = Traversal::new(&graph, &seeds)?;
    print_plan(&traversal);
    Ok(())
}

/// Everything that identifies one privacy request.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub request_id: String,
    pub action: ActionType,
    pub policy: Policy,
    pub seeds: BTreeMap<String, Value>,
}

/// A running privacy request: a sender for external events (callbacks,
/// pause/resume/cancel) and the join handle resolving to the final status.
pub struct RunningRequest {
    pub events: mpsc::Sender<EngineEvent>,
    pub handle: JoinHandle<errors::Result<RequestStatus>>,
}

/// Wire up and launch the runtime for one privacy request.
///
/// This mirrors what a service deployment does per request: build the
/// traversal, persist the plan, spawn the connector worker loop and run the
/// event loop until the request settles. Resuming an interrupted request is
/// the same call with the same `request_id` against the same task store.
pub fn start_request(
    graph: Arc<DatasetGraph>,
    spec: RequestSpec,
    connector: Arc<dyn Connector>,
    store: Arc<dyn TaskStore>,
    payloads: Arc<dyn PayloadStore>,
    options: EngineOptions,
) -> errors::Result<RunningRequest> {
    let traversal = Traversal::new(&graph, &spec.seeds)?;

    let (event_tx, event_rx) = mpsc::channel::<EngineEvent>(64);

    let scheduler = TaskScheduler::new(
        store,
        payloads,
        graph,
        spec.policy,
        spec.seeds,
        spec.request_id,
        spec.action,
        options,
    );
    let core = EngineCore::new(scheduler, traversal);

    let backend = QueuedConnectorBackend::new(connector, event_tx.clone());
    let runtime = Runtime::new(core, event_rx, event_tx.clone(), backend);
    let handle = tokio::spawn(runtime.run());

    Ok(RunningRequest {
        events: event_tx,
        handle,
    })
}

/// Parse repeated `key=value` seed arguments.
fn parse_seeds(pairs: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut seeds = BTreeMap::new();
    for pair in pairs {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() && !value.is_empty() => {
                seeds.insert(key.to_string(), Value::String(value.to_string()));
            }
            _ => anyhow::bail!("invalid seed '{pair}' (expected KEY=VALUE)"),
        }
    }
    Ok(seeds)
}

/// Simple plan output: ordered nodes with their wiring.
fn print_plan(traversal: &Traversal) {
    println!("privdag traversal plan");
    println!("  participating collections: {}", traversal.order().len());
    println!();

    for address in traversal.order() {
        let Some(node) = traversal.node(address) else {
            continue;
        };
        println!("  - {address}");
        for (seed_key, field) in &node.seed_fields {
            println!("      seed: {seed_key} -> {field}");
        }
        for edge in &node.incoming {
            println!("      in: {} -> {}", edge.source, edge.target);
        }
        if !node.after.is_empty() {
            let after: Vec<String> = node.after.iter().map(|a| a.to_string()).collect();
            println!("      after: {after:?}");
        }
    }
}
