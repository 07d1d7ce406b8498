// tests/traversal_plan.rs

use std::collections::BTreeMap;

use serde_json::{Value, json};

use privdag::graph::{CollectionAddress, DataType, DatasetGraph, RefDirection};
use privdag::traversal::Traversal;
use privdag_test_utils::builders::{CollectionBuilder, DatasetBuilder, FieldBuilder};
use privdag_test_utils::init_tracing;

fn seeds(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn addr(s: &str) -> CollectionAddress {
    s.parse().unwrap()
}

/// users (identity) -> orders -> shipments, linked by references.
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
                ),
        )
        .with_collection(
            CollectionBuilder::new("shipments")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(
                    FieldBuilder::new("order_id")
                        .references("db", "orders.id", Some(RefDirection::From)),
                )
                .with_field(FieldBuilder::new("address").category("user.contact.address")),
        )
        .build();

    DatasetGraph::new(vec![dataset]).unwrap()
}

#[test]
fn chain_produces_topological_order() {
    init_tracing();

    let graph = chain_graph();
    let traversal =
        Traversal::new(&graph, &seeds(&[("email", json!("user@example.com"))])).unwrap();

    let order = traversal.order();
    assert_eq!(order.len(), 3);

    let position = |address: &str| {
        order
            .iter()
            .position(|a| *a == addr(address))
            .unwrap_or_else(|| panic!("{address} missing from order"))
    };
    assert!(position("db.users") < position("db.orders"));
    assert!(position("db.orders") < position("db.shipments"));
}

#[test]
fn every_node_appears_after_its_prerequisites() {
    init_tracing();

    let graph = chain_graph();
    let traversal =
        Traversal::new(&graph, &seeds(&[("email", json!("user@example.com"))])).unwrap();

    let order = traversal.order();
    for (index, address) in order.iter().enumerate() {
        let node = traversal.node(address).unwrap();
        for prerequisite in node.prerequisites() {
            let upstream_index = order.iter().position(|a| *a == prerequisite).unwrap();
            assert!(
                upstream_index < index,
                "{prerequisite} must come before {address}"
            );
        }
    }
}

#[test]
fn incoming_edges_record_upstream_fields() {
    init_tracing();

    let graph = chain_graph();
    let traversal =
        Traversal::new(&graph, &seeds(&[("email", json!("user@example.com"))])).unwrap();

    let orders = traversal.node(&addr("db.orders")).unwrap();
    assert_eq!(orders.incoming.len(), 1);
    assert_eq!(orders.incoming[0].source.to_string(), "db.users.id");
    assert_eq!(orders.incoming[0].target.to_string(), "db.orders.user_id");

    let users = traversal.node(&addr("db.users")).unwrap();
    assert!(users.incoming.is_empty());
    assert_eq!(users.seed_fields.len(), 1);
    assert_eq!(users.children, vec![addr("db.orders")]);
}

#[test]
fn after_constraint_to_unreached_collection_is_vacuous() {
    init_tracing();

    // reports is only connected via `after`; it has no reference edges, so
    // it never participates -- and the constraint on users is then vacuous.
    let connected = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users")
                .after("warehouse.reports")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(FieldBuilder::new("email").identity("email")),
        )
        .build();
    let isolated = DatasetBuilder::new("warehouse")
        .with_collection(
            CollectionBuilder::new("reports").with_field(FieldBuilder::new("id").primary_key()),
        )
        .build();

    let graph = DatasetGraph::new(vec![connected, isolated]).unwrap();
    let traversal =
        Traversal::new(&graph, &seeds(&[("email", json!("user@example.com"))])).unwrap();

    assert_eq!(traversal.order(), &[addr("db.users")]);
    let users = traversal.node(&addr("db.users")).unwrap();
    assert!(users.after.is_empty());
}

#[test]
fn dataset_level_after_is_distributed_to_collections() {
    init_tracing();

    // Both datasets are seeded independently; analytics.events must still
    // wait for every db collection because of the dataset-level constraint.
    let db = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(FieldBuilder::new("email").identity("email")),
        )
        .build();
    let analytics = DatasetBuilder::new("analytics")
        .after("db")
        .with_collection(
            CollectionBuilder::new("events")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(FieldBuilder::new("visitor_email").identity("email")),
        )
        .build();

    let graph = DatasetGraph::new(vec![db, analytics]).unwrap();
    let traversal =
        Traversal::new(&graph, &seeds(&[("email", json!("user@example.com"))])).unwrap();

    let events = traversal.node(&addr("analytics.events")).unwrap();
    assert!(events.after.contains(&addr("db.users")));

    let order = traversal.order();
    let users_index = order.iter().position(|a| *a == addr("db.users")).unwrap();
    let events_index = order.iter().position(|a| *a == addr("analytics.events")).unwrap();
    assert!(users_index < events_index);
}

#[test]
fn unmatched_seed_keys_shrink_the_participating_set() {
    init_tracing();

    let graph = chain_graph();

    // No seed for "email": nothing participates.
    let empty = Traversal::new(&graph, &seeds(&[("phone", json!("555-0100"))])).unwrap();
    assert!(empty.is_empty());

    // Null seeds count as absent.
    let null_seed = Traversal::new(&graph, &seeds(&[("email", Value::Null)])).unwrap();
    assert!(null_seed.is_empty());
}

#[test]
fn undirected_reference_links_both_ways() {
    init_tracing();

    // No direction on the reference: profiles can be discovered from users
    // even though the reference is declared on profiles.
    let dataset = DatasetBuilder::new("db")
        .with_collection(
            CollectionBuilder::new("users")
                .with_field(FieldBuilder::new("id").primary_key())
                .with_field(FieldBuilder::new("email").identity("email")),
        )
        .with_collection(
            CollectionBuilder::new("profiles")
                .with_field(FieldBuilder::new("user_id").references("db", "users.id", None)),
        )
        .build();

    let graph = DatasetGraph::new(vec![dataset]).unwrap();
    let traversal =
        Traversal::new(&graph, &seeds(&[("email", json!("user@example.com"))])).unwrap();

    assert_eq!(traversal.order().len(), 2);
    let profiles = traversal.node(&addr("db.profiles")).unwrap();
    assert_eq!(profiles.incoming.len(), 1);
    assert_eq!(profiles.incoming[0].source.to_string(), "db.users.id");
}
