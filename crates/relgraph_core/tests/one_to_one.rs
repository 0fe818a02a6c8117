use relgraph_core::{EntityPayload, LifecycleState, ModelDef, RecordKey, RelationshipDef, Schema, Store};

fn store() -> Store {
    let schema = Schema::build(
        vec![
            ModelDef::new("person").relationship("passport", RelationshipDef::belongs_to("passport")),
            ModelDef::new("passport").relationship("holder", RelationshipDef::belongs_to("person")),
        ],
        false,
    )
    .unwrap();
    Store::new(schema)
}

fn person(id: &str) -> RecordKey {
    RecordKey::new("person", id)
}

fn passport(id: &str) -> RecordKey {
    RecordKey::new("passport", id)
}

/// person:1 holds passport:1; person:2 holds passport:2.
fn paired_store() -> Store {
    let mut store = store();
    for id in ["1", "2"] {
        store
            .push(EntityPayload::new("person", id).belongs_to("passport", Some(passport(id))))
            .unwrap();
        store.push(EntityPayload::new("passport", id)).unwrap();
    }
    store
}

fn assert_original_pairs(store: &Store) {
    for id in ["1", "2"] {
        assert_eq!(store.belongs_to(&person(id), "passport").unwrap(), Some(passport(id)));
        assert_eq!(store.belongs_to(&passport(id), "holder").unwrap(), Some(person(id)));
    }
}

#[test]
fn canonical_pair_is_visible_from_both_sides() {
    let store = paired_store();
    assert_original_pairs(&store);
    assert_eq!(store.state(&passport("1")).unwrap(), LifecycleState::LoadedSaved);
}

#[test]
fn setting_one_side_nulls_displaced_partners() {
    let mut store = paired_store();
    store
        .set_belongs_to(&person("1"), "passport", Some(passport("2")))
        .unwrap();

    assert_eq!(store.belongs_to(&person("1"), "passport").unwrap(), Some(passport("2")));
    assert_eq!(store.belongs_to(&passport("2"), "holder").unwrap(), Some(person("1")));
    assert_eq!(store.belongs_to(&person("2"), "passport").unwrap(), None);
    assert_eq!(store.belongs_to(&passport("1"), "holder").unwrap(), None);
    assert!(store.is_dirty(&person("1")).unwrap());
}

#[test]
fn rollback_restores_all_four_sides() {
    let mut store = paired_store();
    store
        .set_belongs_to(&person("1"), "passport", Some(passport("2")))
        .unwrap();

    store.rollback(&person("1")).unwrap();
    assert_original_pairs(&store);
    for key in [person("1"), person("2"), passport("1"), passport("2")] {
        assert!(!store.is_dirty(&key).unwrap(), "{key} still dirty");
        assert_eq!(store.state(&key).unwrap(), LifecycleState::LoadedSaved);
    }
}
