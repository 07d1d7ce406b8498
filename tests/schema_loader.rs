// tests/schema_loader.rs

use std::fs;

use serde_json::json;
use tempfile::tempdir;

use privdag::errors::PrivdagError;
use privdag::graph::{DataType, DatasetGraph};
use privdag::schema::{load_dataset, load_datasets};
use privdag_test_utils::init_tracing;

const USERS_DATASET: &str = r#"
name = "postgres_db"
connection_key = "postgres_main"

[[collections]]
name = "users"

[[collections.fields]]
name = "id"
primary_key = true
data_type = "integer"

[[collections.fields]]
name = "email"
identity = "email"
data_categories = ["user.contact.email"]
data_type = "string"

[[collections]]
name = "orders"
after = ["postgres_db.users"]

[[collections.fields]]
name = "id"
primary_key = true

[[collections.fields]]
name = "user_id"
data_type = "integer"

[[collections.fields.references]]
dataset = "postgres_db"
field = "users.id"
direction = "from"
"#;

#[test]
fn loads_and_validates_a_dataset_document() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = dir.path().join("postgres_db.toml");
    fs::write(&path, USERS_DATASET).unwrap();

    let dataset = load_dataset(&path).unwrap();
    assert_eq!(dataset.name, "postgres_db");
    assert_eq!(dataset.connection_key, "postgres_main");
    assert_eq!(dataset.collections.len(), 2);

    let users = dataset.collection("users").unwrap();
    let email = users.field("email").unwrap();
    assert_eq!(email.identity.as_deref(), Some("email"));
    assert_eq!(email.data_categories, vec!["user.contact.email".to_string()]);

    let orders = dataset.collection("orders").unwrap();
    assert_eq!(orders.after.len(), 1);
    let user_id = orders.field("user_id").unwrap();
    assert_eq!(user_id.references.len(), 1);
    assert_eq!(user_id.references[0].target.to_string(), "postgres_db.users.id");

    // The merged graph accepts the document wholesale.
    DatasetGraph::new(vec![dataset]).unwrap();
}

#[test]
fn loads_every_document_in_a_directory() {
    init_tracing();

    let dir = tempdir().unwrap();
    fs::write(dir.path().join("postgres_db.toml"), USERS_DATASET).unwrap();
    fs::write(
        dir.path().join("mongo_db.toml"),
        r#"
name = "mongo_db"

[[collections]]
name = "sessions"

[[collections.fields]]
name = "visitor_email"
identity = "email"
"#,
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a dataset").unwrap();

    let datasets = load_datasets(dir.path()).unwrap();
    let names: Vec<&str> = datasets.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["mongo_db", "postgres_db"]);
}

#[test]
fn connection_key_defaults_to_dataset_name() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = dir.path().join("d.toml");
    fs::write(
        &path,
        r#"
name = "warehouse"

[[collections]]
name = "facts"

[[collections.fields]]
name = "id"
"#,
    )
    .unwrap();

    let dataset = load_dataset(&path).unwrap();
    assert_eq!(dataset.connection_key, "warehouse");
}

#[test]
fn malformed_after_in_document_fails_to_load() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(
        &path,
        r#"
name = "db"

[[collections]]
name = "users"
after = ["users"]

[[collections.fields]]
name = "id"
"#,
    )
    .unwrap();

    assert!(matches!(
        load_dataset(&path),
        Err(PrivdagError::SchemaError(_))
    ));
}

#[test]
fn malformed_reference_field_fails_to_load() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(
        &path,
        r#"
name = "db"

[[collections]]
name = "users"

[[collections.fields]]
name = "team_id"

[[collections.fields.references]]
dataset = "db"
field = "teams"
"#,
    )
    .unwrap();

    assert!(matches!(
        load_dataset(&path),
        Err(PrivdagError::SchemaError(_))
    ));
}

#[test]
fn field_cast_converts_declared_types_and_passes_through_otherwise() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = dir.path().join("postgres_db.toml");
    fs::write(&path, USERS_DATASET).unwrap();
    let dataset = load_dataset(&path).unwrap();

    let user_id = dataset.collection("orders").unwrap().field("user_id").unwrap();
    assert_eq!(user_id.data_type, Some(DataType::Integer));
    assert_eq!(user_id.cast(json!("42")), json!(42));
    assert_eq!(user_id.cast(json!(42)), json!(42));
    // Unconvertible values pass through for the connector to compare as-is.
    assert_eq!(user_id.cast(json!("not-a-number")), json!("not-a-number"));

    let order_id = dataset.collection("orders").unwrap().field("id").unwrap();
    assert_eq!(order_id.data_type, None);
    assert_eq!(order_id.cast(json!("anything")), json!("anything"));
}
