// tests/start_request.rs

//! End-to-end wiring through `start_request`: real queued connector backend,
//! spawned workers, settle-and-join.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::time::{Duration, timeout};

use privdag::engine::{
    ActionType, EngineOptions, InMemoryPayloadStore, InMemoryTaskStore, Policy, RequestStatus,
    Rule, TaskStore,
};
use privdag::graph::{DataType, DatasetGraph, RefDirection};
use privdag::{RequestSpec, start_request};
use privdag_test_utils::builders::{CollectionBuilder, DatasetBuilder, FieldBuilder};
use privdag_test_utils::fake_connector::StaticConnector;
use privdag_test_utils::init_tracing;

fn email_seed() -> BTreeMap<String, Value> {
    [("email".to_string(), json!("user@example.com"))].into()
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
                .with_field(FieldBuilder::new("email").identity("email")),
        )
        .with_collection(
            CollectionBuilder::new("orders")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(
                    FieldBuilder::new("user_id")
                        .references("db", "users.id", Some(RefDirection::From)),
                ),
        )
        .build();

    DatasetGraph::new(vec![dataset]).unwrap()
}

#[tokio::test]
async fn start_request_runs_to_completion_over_the_queued_backend() {
    init_tracing();

    let store = Arc::new(InMemoryTaskStore::new());
    let connector = Arc::new(
        StaticConnector::new()
            .with_rows("db.users", vec![json!({"id": 1, "email": "user@example.com"})])
            .with_rows("db.orders", vec![json!({"id": 10, "user_id": 1})]),
    );

    let running = start_request(
        Arc::new(chain_graph()),
        RequestSpec {
            request_id: "req-e2e".to_string(),
            action: ActionType::Access,
            policy: Policy {
                key: "default".to_string(),
                rules: vec![Rule {
                    action: ActionType::Access,
                    data_categories: vec!["user".to_string()],
                    masking_strategy: None,
                }],
            },
            seeds: email_seed(),
        },
        connector,
        store.clone(),
        Arc::new(InMemoryPayloadStore::new()),
        EngineOptions::default(),
    )
    .unwrap();

    let status = timeout(Duration::from_secs(3), running.handle)
        .await
        .expect("request did not settle within 3 seconds")
        .expect("runtime task panicked")
        .expect("runtime returned an error");

    assert_eq!(status, RequestStatus::Complete);

    let tasks = store.for_request("req-e2e").unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks
        .iter()
        .all(|t| t.status == privdag::engine::TaskStatus::Complete));
}
