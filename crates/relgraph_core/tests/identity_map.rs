use relgraph_core::{
    EntityPayload, LifecycleState, ModelDef, RecordKey, RelationshipDef, Schema, Store, StoreError,
};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

fn store() -> Store {
    let schema = Schema::build(
        vec![
            ModelDef::new("user")
                .attribute("name")
                .relationship("accounts", RelationshipDef::has_many("account")),
            ModelDef::new("account").relationship("user", RelationshipDef::belongs_to("user")),
            ModelDef::new("message")
                .relationship("author", RelationshipDef::belongs_to("user").no_inverse()),
        ],
        false,
    )
    .unwrap();
    Store::new(schema)
}

fn user(id: &str) -> RecordKey {
    RecordKey::new("user", id)
}

#[test]
fn record_for_returns_the_same_record() {
    let mut store = store();
    let first = store.record_for("user", "1").unwrap();
    let second = store.record_for("user", "1").unwrap();
    assert_eq!(first, second);
    assert_eq!(store.len(), 1);
    assert_eq!(store.state(&first).unwrap(), LifecycleState::Empty);
}

#[test]
fn push_fills_existing_stub_in_place() {
    let mut store = store();
    let stub = store.record_for("user", "1").unwrap();
    let pushed = store
        .push(EntityPayload::from_value(json!({"type": "user", "id": 1, "attributes": {"name": "Ada"}})).unwrap())
        .unwrap();

    assert_eq!(stub, pushed);
    assert_eq!(store.len(), 1);
    let record = store.peek_record(&stub).unwrap();
    assert_eq!(record.state(), LifecycleState::LoadedSaved);
    assert_eq!(record.attribute("name"), Some(&json!("Ada")));
}

#[test]
fn peek_never_creates_records() {
    let mut store = store();
    assert!(store.peek_record(&user("1")).is_none());
    assert!(store.is_empty());

    store.push(EntityPayload::new("user", "2")).unwrap();
    store.push(EntityPayload::new("user", "1")).unwrap();
    store.push(EntityPayload::new("account", "1")).unwrap();
    let ids: Vec<&str> = store
        .peek_all("user")
        .iter()
        .map(|record| record.key().id.as_str())
        .collect();
    assert_eq!(ids, vec!["2", "1"]);
}

#[test]
fn create_record_generates_uuid_ids() {
    let mut store = store();
    let key = store.create_record("user", BTreeMap::new()).unwrap();
    assert!(Uuid::parse_str(&key.id).is_ok());
    assert_eq!(store.state(&key).unwrap(), LifecycleState::LoadedCreated);

    let err = store
        .create_record("user", BTreeMap::from([("age".to_string(), json!(3))]))
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownField { .. }));
    assert!(matches!(
        store.create_record("ghost", BTreeMap::new()),
        Err(StoreError::UnknownModel(_))
    ));
}

#[test]
fn unload_cleans_inverse_relationships() {
    let mut store = store();
    store
        .push(EntityPayload::new("user", "1").has_many("accounts", vec![RecordKey::new("account", "1")]))
        .unwrap();
    store.push(EntityPayload::new("account", "1")).unwrap();

    store.unload_record(&RecordKey::new("account", "1")).unwrap();
    assert!(!store.has_record(&RecordKey::new("account", "1")));
    assert!(store.has_many(&user("1"), "accounts").unwrap().is_empty());

    let fresh = store.record_for("account", "1").unwrap();
    assert_eq!(store.state(&fresh).unwrap(), LifecycleState::Empty);
    assert_eq!(store.belongs_to(&fresh, "user").unwrap(), None);
}

#[test]
fn unload_cleans_inverse_less_references() {
    let mut store = store();
    store
        .push(EntityPayload::new("message", "1").belongs_to("author", Some(user("1"))))
        .unwrap();
    let message = RecordKey::new("message", "1");
    assert_eq!(store.belongs_to(&message, "author").unwrap(), Some(user("1")));
    assert!(store.has_many(&user("1"), "accounts").unwrap().is_empty());

    store.unload_record(&user("1")).unwrap();
    assert_eq!(store.belongs_to(&message, "author").unwrap(), None);
    assert!(matches!(
        store.unload_record(&user("1")),
        Err(StoreError::RecordNotFound(_))
    ));
}
