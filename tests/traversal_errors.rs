// tests/traversal_errors.rs

use std::collections::BTreeMap;

use serde_json::{Value, json};

use privdag::errors::PrivdagError;
use privdag::graph::{Dataset, DatasetGraph, RefDirection};
use privdag::traversal::Traversal;
use privdag_test_utils::builders::{CollectionBuilder, DatasetBuilder, FieldBuilder};
use privdag_test_utils::init_tracing;

fn email_seed() -> BTreeMap<String, Value> {
    [("email".to_string(), json!("user@example.com"))].into()
}

#[test]
fn cyclic_after_lists_every_member() {
    init_tracing();

    // a -> b -> c -> a via `after`, all reachable through references from
    // the seeded collection.
    let dataset = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("a")
                .after("db.c")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(FieldBuilder::new("email").identity("email")),
        )
        .with_collection(
            CollectionBuilder::new("b")
                .after("db.a")
                .with_field(FieldBuilder::new("a_id").references("db", "a.id", Some(RefDirection::From))),
        )
        .with_collection(
            CollectionBuilder::new("c")
                .after("db.b")
                .with_field(FieldBuilder::new("a_id").references("db", "a.id", Some(RefDirection::From))),
        )
        .build();

    let graph = DatasetGraph::new(vec![dataset]).unwrap();
    let error = Traversal::new(&graph, &email_seed()).unwrap_err();

    match error {
        PrivdagError::TraversalCycle(members) => {
            let names: Vec<String> = members.iter().map(|a| a.to_string()).collect();
            assert!(names.contains(&"db.a".to_string()));
            assert!(names.contains(&"db.b".to_string()));
            assert!(names.contains(&"db.c".to_string()));
        }
        other => panic!("expected TraversalCycle, got {other:?}"),
    }
}

#[test]
fn unreachable_nodes_are_all_reported() {
    init_tracing();

    // users is seeded. archived and legacy both declare `to` references
    // INTO users, so they are weakly connected (participating) but no
    // directed edge ever reaches them.
    let dataset = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(FieldBuilder::new("email").identity("email")),
        )
        .with_collection(
            CollectionBuilder::new("archived")
                .with_field(FieldBuilder::new("user_id").references("db", "users.id", Some(RefDirection::To))),
        )
        .with_collection(
            CollectionBuilder::new("legacy")
                .with_field(FieldBuilder::new("user_id").references("db", "users.id", Some(RefDirection::To))),
        )
        .build();

    let graph = DatasetGraph::new(vec![dataset]).unwrap();
    let error = Traversal::new(&graph, &email_seed()).unwrap_err();

    match error {
        PrivdagError::TraversalUnreachable(addresses) => {
            let names: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
            assert_eq!(names, vec!["db.archived".to_string(), "db.legacy".to_string()]);
        }
        other => panic!("expected TraversalUnreachable, got {other:?}"),
    }
}

#[test]
fn dangling_references_are_collected_not_first_only() {
    init_tracing();

    let dataset = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(
                    FieldBuilder::new("email")
                        .identity("email")
                        .references("db", "ghosts.email", None),
                )
                .with_field(FieldBuilder::new("team").references("db", "teams.wrong_field", None)),
        )
        .with_collection(
            CollectionBuilder::new("teams").with_field(FieldBuilder::new("id").primary_key()),
        )
        .build();

    let error = DatasetGraph::new(vec![dataset]).unwrap_err();
    match error {
        PrivdagError::DanglingReferences(addresses) => {
            assert_eq!(
                addresses,
                vec![
                    "db.ghosts.email".to_string(),
                    "db.teams.wrong_field".to_string()
                ]
            );
        }
        other => panic!("expected DanglingReferences, got {other:?}"),
    }
}

#[test]
fn duplicate_collection_address_is_rejected() {
    init_tracing();

    let first = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users").with_field(FieldBuilder::new("id").primary_key()),
        )
        .build();
    let second = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users").with_field(FieldBuilder::new("id").primary_key()),
        )
        .build();

    let error = DatasetGraph::new(vec![first, second]).unwrap_err();
    assert!(matches!(error, PrivdagError::SchemaError(_)));
}

#[test]
fn reference_within_one_collection_is_rejected() {
    init_tracing();

    let dataset = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(FieldBuilder::new("manager_id").references("db", "users.id", None)),
        )
        .build();

    let error = DatasetGraph::new(vec![dataset]).unwrap_err();
    assert!(matches!(error, PrivdagError::SchemaError(_)));
}

#[test]
fn malformed_after_fails_at_parse_time() {
    init_tracing();

    // Wrong arity: three segments instead of `dataset.collection`.
    let doc = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users")
                .after("db.users.id")
                .with_field(FieldBuilder::new("id").primary_key()),
        )
        .build_doc();
    assert!(matches!(
        Dataset::try_from(doc),
        Err(PrivdagError::SchemaError(_))
    ));

    // Invalid key characters.
    let doc = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users")
                .after("d b.users")
                .with_field(FieldBuilder::new("id").primary_key()),
        )
        .build_doc();
    assert!(matches!(
        Dataset::try_from(doc),
        Err(PrivdagError::SchemaError(_))
    ));
}

#[test]
fn self_cycle_via_after_is_detected() {
    init_tracing();

    let dataset = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users")
                .after("db.orders")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(FieldBuilder::new("email").identity("email")),
        )
        .with_collection(
            CollectionBuilder::new("orders")
                .with_field(
                    FieldBuilder::new("user_id")
                        .references("db", "users.id", Some(RefDirection::From)),
                ),
        )
        .build();

    // users waits for orders (after) while orders waits for users
    // (reference): a two-node cycle.
    let graph = DatasetGraph::new(vec![dataset]).unwrap();
    let error = Traversal::new(&graph, &email_seed()).unwrap_err();
    assert!(matches!(error, PrivdagError::TraversalCycle(members) if members.len() == 2));
}
