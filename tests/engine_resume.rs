// tests/engine_resume.rs

//! Crash-resumption semantics: the frontier is re-derived purely from
//! persisted task statuses, completed work is never re-executed, and failed
//! work gets a fresh round of attempts.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use serde_json::{Value, json};

use privdag::engine::masking::{NullRewrite, mask_rows};
use privdag::engine::{
    ActionType, CoreCommand, DispatchedTask, DispatchedWork, EngineCore, EngineEvent,
    EngineOptions, InMemoryPayloadStore, InMemoryTaskStore, Policy, RequestStatus, Rule,
    TaskScheduler, TaskStatus, TaskStore,
};
use privdag::graph::{DataType, DatasetGraph, RefDirection};
use privdag::traversal::Traversal;
use privdag_test_utils::builders::{CollectionBuilder, DatasetBuilder, FieldBuilder};
use privdag_test_utils::init_tracing;

fn email_seed() -> BTreeMap<String, Value> {
    [("email".to_string(), json!("user@example.com"))].into()
}

fn policy() -> Policy {
    Policy {
        key: "default".to_string(),
        rules: vec![
            Rule {
                action: ActionType::Access,
                data_categories: vec!["user".to_string()],
                masking_strategy: None,
            },
            Rule {
                action: ActionType::Erasure,
                data_categories: vec!["user.contact".to_string()],
                masking_strategy: Some("null_rewrite".to_string()),
            },
        ],
    }
}

fn chain_graph() -> DatasetGraph {
    let dataset = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users")
                .with_field(
                    FieldBuilder::new("id")
                        .primary_key()
                        .data_type(DataType::Integer),
                )
                .with_field(
                    FieldBuilder::new("email")
                        .identity("email")
                        .category("user.contact.email"),
                ),
        )
        .with_collection(
            CollectionBuilder::new("orders")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(
                    FieldBuilder::new("user_id")
                        .data_type(DataType::Integer)
                        .references("db", "users.id", Some(RefDirection::From)),
                )
                .with_field(
                    FieldBuilder::new("shipping_address").category("user.contact.address"),
                ),
        )
        .build();

    DatasetGraph::new(vec![dataset]).unwrap()
}

fn core_on(
    store: Arc<InMemoryTaskStore>,
    payloads: Arc<InMemoryPayloadStore>,
    action: ActionType,
    options: EngineOptions,
) -> EngineCore {
    let graph = Arc::new(chain_graph());
    let traversal = Traversal::new(&graph, &email_seed()).unwrap();
    let scheduler = TaskScheduler::new(
        store,
        payloads,
        graph,
        policy(),
        email_seed(),
        "req-1",
        action,
        options,
    );
    EngineCore::new(scheduler, traversal)
}

fn canned_rows(address: &str) -> Vec<Value> {
    match address {
        "db.users" => vec![json!({"id": 1, "email": "user@example.com"})],
        "db.orders" => vec![
            json!({"id": 10, "user_id": 1, "shipping_address": "1 Main St"}),
            json!({"id": 11, "user_id": 1, "shipping_address": "2 Side St"}),
        ],
        _ => vec![],
    }
}

/// Drive the core synchronously until no more work is dispatched, applying
/// canned outcomes. Returns the addresses executed, suffixed by action.
fn drive(core: &EngineCore, failing: &HashSet<&str>) -> (Vec<String>, RequestStatus) {
    let mut executed = Vec::new();
    let mut queue: VecDeque<DispatchedTask> = VecDeque::new();

    let step = core.start().unwrap();
    for command in step.commands {
        if let CoreCommand::DispatchTasks(tasks) = command {
            queue.extend(tasks);
        }
    }

    while let Some(task) = queue.pop_front() {
        let address = task.address.to_string();
        executed.push(format!("{address}:{}", task.action.as_str()));

        let event = match &task.work {
            DispatchedWork::Access(_) if failing.contains(address.as_str()) => {
                EngineEvent::TaskFailed {
                    task_id: task.task_id.clone(),
                    error: "simulated outage".to_string(),
                }
            }
            DispatchedWork::Access(_) => EngineEvent::TaskCompleted {
                task_id: task.task_id.clone(),
                rows: canned_rows(&address),
            },
            DispatchedWork::Erasure(job) => EngineEvent::TaskMasked {
                task_id: task.task_id.clone(),
                rows_masked: mask_rows(job, &NullRewrite),
            },
        };

        let step = core.step(event).unwrap();
        for command in step.commands {
            if let CoreCommand::DispatchTasks(tasks) = command {
                queue.extend(tasks);
            }
        }
    }

    (executed, core.scheduler().request_status().unwrap())
}

#[test]
fn resume_reexecutes_only_incomplete_tasks() {
    init_tracing();

    let store = Arc::new(InMemoryTaskStore::new());
    let payloads = Arc::new(InMemoryPayloadStore::new());
    let options = EngineOptions {
        max_attempts: 1,
        ..EngineOptions::default()
    };

    // First run: orders fails and exhausts its single attempt.
    let core = core_on(store.clone(), payloads.clone(), ActionType::Access, options);
    let (executed, status) = drive(&core, &HashSet::from(["db.orders"]));
    assert_eq!(executed, vec!["db.users:access", "db.orders:access"]);
    assert_eq!(status, RequestStatus::CompleteWithErrors);

    // Second run against the same store: users is already Complete and is
    // not re-executed; orders gets a fresh round of attempts.
    let core = core_on(store.clone(), payloads.clone(), ActionType::Access, options);
    let (executed, status) = drive(&core, &HashSet::new());
    assert_eq!(executed, vec!["db.orders:access"]);
    assert_eq!(status, RequestStatus::Complete);

    let collected = core.scheduler().collected_rows().unwrap();
    assert_eq!(collected.get("db.users"), Some(&canned_rows("db.users")));
    assert_eq!(collected.get("db.orders"), Some(&canned_rows("db.orders")));
}

#[test]
fn resumed_run_matches_uninterrupted_run() {
    init_tracing();

    let options = EngineOptions::default();

    // Uninterrupted reference run.
    let reference_store = Arc::new(InMemoryTaskStore::new());
    let core = core_on(
        reference_store.clone(),
        Arc::new(InMemoryPayloadStore::new()),
        ActionType::Access,
        options,
    );
    let (_, status) = drive(&core, &HashSet::new());
    assert_eq!(status, RequestStatus::Complete);
    let expected = core.scheduler().collected_rows().unwrap();

    // Interrupted run: the process dies while users is in flight.
    let store = Arc::new(InMemoryTaskStore::new());
    let payloads = Arc::new(InMemoryPayloadStore::new());
    let core = core_on(store.clone(), payloads.clone(), ActionType::Access, options);
    let step = core.start().unwrap();
    assert!(matches!(step.commands[0], CoreCommand::DispatchTasks(_)));
    assert_eq!(
        store.get("req-1:access:db.users").unwrap().unwrap().status,
        TaskStatus::InProcessing
    );
    drop(core); // simulated process death; the claim is orphaned

    // Restart: the orphan is re-enqueued and the run finishes with the same
    // row set.
    let core = core_on(store.clone(), payloads.clone(), ActionType::Access, options);
    let (executed, status) = drive(&core, &HashSet::new());
    assert_eq!(executed, vec!["db.users:access", "db.orders:access"]);
    assert_eq!(status, RequestStatus::Complete);
    assert_eq!(core.scheduler().collected_rows().unwrap(), expected);
}

#[test]
fn erasure_runs_masking_after_access_and_persists_counts() {
    init_tracing();

    let store = Arc::new(InMemoryTaskStore::new());
    let core = core_on(
        store.clone(),
        Arc::new(InMemoryPayloadStore::new()),
        ActionType::Erasure,
        EngineOptions::default(),
    );
    let (executed, status) = drive(&core, &HashSet::new());

    assert_eq!(status, RequestStatus::Complete);
    // Each node's erasure task runs after its access task.
    let position = |needle: &str| executed.iter().position(|e| e == needle).unwrap();
    assert!(position("db.users:access") < position("db.users:erasure"));
    assert!(position("db.orders:access") < position("db.orders:erasure"));

    let users_erasure = store.get("req-1:erasure:db.users").unwrap().unwrap();
    assert_eq!(users_erasure.rows_masked, Some(1));
    let orders_erasure = store.get("req-1:erasure:db.orders").unwrap().unwrap();
    assert_eq!(orders_erasure.rows_masked, Some(2));
}

#[test]
fn oversized_payloads_are_externalized_and_rehydrated() {
    init_tracing();

    let store = Arc::new(InMemoryTaskStore::new());
    let payloads = Arc::new(InMemoryPayloadStore::new());
    let options = EngineOptions {
        inline_storage_threshold: 64,
        ..EngineOptions::default()
    };

    let core = core_on(store.clone(), payloads.clone(), ActionType::Access, options);
    let (_, status) = drive(&core, &HashSet::new());
    assert_eq!(status, RequestStatus::Complete);

    // The orders rows serialize past the threshold and live in the payload
    // store; the task row only carries a handle.
    let orders = store.get("req-1:access:db.orders").unwrap().unwrap();
    match &orders.rows {
        privdag::engine::RowPayload::External {
            storage,
            size_bytes,
            ..
        } => {
            assert_eq!(storage, "memory");
            assert!(*size_bytes > 64);
        }
        other => panic!("expected external payload, got {other:?}"),
    }
    assert!(!payloads.is_empty());

    // Reads rehydrate transparently.
    let collected = core.scheduler().collected_rows().unwrap();
    assert_eq!(collected.get("db.orders"), Some(&canned_rows("db.orders")));
}
