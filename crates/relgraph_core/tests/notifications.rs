use relgraph_core::{
    ChangedProperty, EntityPayload, ModelDef, Notification, RecordKey, RelationshipDef, Schema,
    Store,
};
use serde_json::json;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

fn store() -> Store {
    let schema = Schema::build(
        vec![
            ModelDef::new("user")
                .attribute("name")
                .relationship("accounts", RelationshipDef::has_many("account")),
            ModelDef::new("account").relationship("user", RelationshipDef::belongs_to("user")),
        ],
        false,
    )
    .unwrap();
    Store::new(schema)
}

fn user(id: &str) -> RecordKey {
    RecordKey::new("user", id)
}

fn account(id: &str) -> RecordKey {
    RecordKey::new("account", id)
}

fn record_notifications(store: &mut Store) -> Rc<RefCell<Vec<Notification>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    store.subscribe(move |notification| sink.borrow_mut().push(notification.clone()));
    seen
}

fn notification(key: RecordKey, property: ChangedProperty) -> Notification {
    Notification { key, property }
}

#[test]
fn attribute_edit_notifies_attribute_state_and_dirty_flag() {
    let mut store = store();
    store
        .push(EntityPayload::new("user", "1").attribute("name", json!("Ada")))
        .unwrap();
    let seen = record_notifications(&mut store);

    store.set_attribute(&user("1"), "name", json!("Grace")).unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![
            notification(user("1"), ChangedProperty::Attribute("name".to_string())),
            notification(user("1"), ChangedProperty::State),
            notification(user("1"), ChangedProperty::IsDirty),
        ]
    );
}

#[test]
fn push_coalesces_relationship_notifications() {
    let mut store = store();
    let seen = record_notifications(&mut store);

    store
        .push(
            EntityPayload::new("user", "1")
                .has_many("accounts", vec![account("1"), account("2")]),
        )
        .unwrap();

    let seen = seen.borrow();
    let unique: HashSet<&Notification> = seen.iter().collect();
    assert_eq!(unique.len(), seen.len());
    let accounts_changes = seen
        .iter()
        .filter(|n| **n == notification(user("1"), ChangedProperty::Relationship("accounts".to_string())))
        .count();
    assert_eq!(accounts_changes, 1);
    assert!(seen.contains(&notification(
        account("2"),
        ChangedProperty::Relationship("user".to_string())
    )));
}

#[test]
fn inverse_side_is_notified_on_local_edit() {
    let mut store = store();
    store
        .push(EntityPayload::new("user", "1").has_many("accounts", vec![account("1")]))
        .unwrap();
    store.push(EntityPayload::new("user", "2")).unwrap();
    store.push(EntityPayload::new("account", "1")).unwrap();
    let seen = record_notifications(&mut store);

    store
        .set_belongs_to(&account("1"), "user", Some(user("2")))
        .unwrap();

    let seen = seen.borrow();
    for expected in [
        notification(account("1"), ChangedProperty::Relationship("user".to_string())),
        notification(user("1"), ChangedProperty::Relationship("accounts".to_string())),
        notification(user("2"), ChangedProperty::Relationship("accounts".to_string())),
        notification(user("1"), ChangedProperty::IsDirty),
        notification(user("2"), ChangedProperty::IsDirty),
    ] {
        assert!(seen.contains(&expected), "missing {expected:?}");
    }
}

#[test]
fn net_zero_edit_reports_clean_again() {
    let mut store = store();
    store
        .push(EntityPayload::new("user", "1").attribute("name", json!("Ada")))
        .unwrap();
    store.set_attribute(&user("1"), "name", json!("Grace")).unwrap();
    let seen = record_notifications(&mut store);

    store.set_attribute(&user("1"), "name", json!("Ada")).unwrap();
    assert!(seen
        .borrow()
        .contains(&notification(user("1"), ChangedProperty::IsDirty)));
    assert!(!store.is_dirty(&user("1")).unwrap());
}

#[test]
fn rejected_edit_and_unsubscribed_observer_see_nothing() {
    let mut store = store();
    store.push(EntityPayload::new("user", "1")).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let id = store.subscribe(move |notification: &Notification| {
        sink.borrow_mut().push(notification.clone())
    });

    assert!(store.set_attribute(&user("1"), "missing", json!(1)).is_err());
    assert!(seen.borrow().is_empty());

    assert!(store.unsubscribe(id));
    store.set_attribute(&user("1"), "name", json!("Ada")).unwrap();
    assert!(seen.borrow().is_empty());
    assert!(!store.unsubscribe(id));
}
