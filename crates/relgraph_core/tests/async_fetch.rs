use futures::executor::block_on;
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use relgraph_core::{
    Adapter, AdapterError, AdapterResult, EntityPayload, FetchError, LifecycleState, LinkPayload,
    ModelDef, RecordKey, RelationshipDef, Schema, Store, StoreError,
};
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;

/// Adapter that counts calls and can be switched offline.
#[derive(Clone, Default)]
struct CountingAdapter {
    calls: Rc<Cell<usize>>,
    offline: Rc<Cell<bool>>,
}

impl CountingAdapter {
    fn respond<T: 'static>(&self, value: T) -> LocalBoxFuture<'static, AdapterResult<T>> {
        self.calls.set(self.calls.get() + 1);
        let result = if self.offline.get() {
            Err(AdapterError::new("offline"))
        } else {
            Ok(value)
        };
        future::ready(result).boxed_local()
    }
}

impl Adapter for CountingAdapter {
    fn fetch_related_record(
        &self,
        owner: &RecordKey,
        _field: &str,
    ) -> LocalBoxFuture<'static, AdapterResult<Option<EntityPayload>>> {
        let owner_id = owner.id.clone();
        self.respond(Some(
            EntityPayload::new("user", "9").attribute("name", json!(format!("owner of {owner_id}"))),
        ))
    }

    fn fetch_related_records(
        &self,
        owner: &RecordKey,
        _field: &str,
    ) -> LocalBoxFuture<'static, AdapterResult<Vec<EntityPayload>>> {
        self.respond(vec![EntityPayload::new("account", "1")
            .attribute("number", json!(1))
            .belongs_to("user", Some(owner.clone()))])
    }

    fn fetch_by_link(&self, link: &str) -> LocalBoxFuture<'static, AdapterResult<LinkPayload>> {
        let payload = match link {
            "/users/1/accounts" => LinkPayload::Many(vec![
                EntityPayload::new("account", "1").attribute("number", json!(1)),
                EntityPayload::new("account", "2").attribute("number", json!(2)),
            ]),
            _ => LinkPayload::One(Some(EntityPayload::new("topic", "1"))),
        };
        self.respond(payload)
    }
}

fn schema(default_async: bool) -> Schema {
    Schema::build(
        vec![
            ModelDef::new("user")
                .attribute("name")
                .relationship("accounts", RelationshipDef::has_many("account")),
            ModelDef::new("account")
                .attribute("number")
                .relationship("user", RelationshipDef::belongs_to("user")),
            ModelDef::new("topic"),
        ],
        default_async,
    )
    .unwrap()
}

fn user(id: &str) -> RecordKey {
    RecordKey::new("user", id)
}

fn account(id: &str) -> RecordKey {
    RecordKey::new("account", id)
}

fn store_with_linked_user() -> (Store, CountingAdapter) {
    let adapter = CountingAdapter::default();
    let mut store = Store::with_adapter(schema(true), adapter.clone());
    store
        .push(EntityPayload::new("user", "1").link("accounts", "/users/1/accounts"))
        .unwrap();
    (store, adapter)
}

#[test]
fn concurrent_reads_share_one_fetch() {
    let (mut store, adapter) = store_with_linked_user();

    let first = store.request_has_many(&user("1"), "accounts").unwrap();
    let second = store.request_has_many(&user("1"), "accounts").unwrap();
    assert!(first.is_pending());
    assert!(second.is_pending());
    assert_eq!(adapter.calls.get(), 1);
    assert_eq!(store.pending_fetches(), 1);

    assert_eq!(block_on(store.settle()), 1);
    assert_eq!(block_on(first).unwrap(), vec![account("1"), account("2")]);
    assert_eq!(block_on(second).unwrap(), vec![account("1"), account("2")]);
    assert_eq!(store.belongs_to(&account("2"), "user").unwrap(), Some(user("1")));
    assert_eq!(store.state(&account("1")).unwrap(), LifecycleState::LoadedSaved);

    let third = store.request_has_many(&user("1"), "accounts").unwrap();
    assert!(!third.is_pending());
    assert_eq!(block_on(third).unwrap().len(), 2);
    assert_eq!(adapter.calls.get(), 1);
}

#[test]
fn failed_fetch_leaves_graph_unchanged_and_retries() {
    let (mut store, adapter) = store_with_linked_user();
    adapter.offline.set(true);

    let handle = store.request_has_many(&user("1"), "accounts").unwrap();
    block_on(store.settle());
    assert_eq!(
        block_on(handle).unwrap_err(),
        FetchError::Adapter("offline".to_string())
    );
    assert!(store.has_many(&user("1"), "accounts").unwrap().is_empty());
    assert!(!store.has_record(&account("1")));

    adapter.offline.set(false);
    let accounts = block_on(store.load_has_many(&user("1"), "accounts")).unwrap();
    assert_eq!(accounts, vec![account("1"), account("2")]);
    assert_eq!(adapter.calls.get(), 2);
}

#[test]
fn empty_members_are_fetched_by_owner_and_field() {
    let adapter = CountingAdapter::default();
    let mut store = Store::with_adapter(schema(true), adapter.clone());
    store
        .push(EntityPayload::new("account", "3").belongs_to("user", Some(user("9"))))
        .unwrap();
    assert_eq!(store.state(&user("9")).unwrap(), LifecycleState::Empty);

    let handle = store.request_belongs_to(&account("3"), "user").unwrap();
    assert!(handle.is_pending());
    assert_eq!(store.state(&user("9")).unwrap(), LifecycleState::Loading);

    block_on(store.settle());
    assert_eq!(block_on(handle).unwrap(), Some(user("9")));
    assert_eq!(store.state(&user("9")).unwrap(), LifecycleState::LoadedSaved);
    assert_eq!(
        store.attribute(&user("9"), "name").unwrap(),
        Some(json!("owner of 3"))
    );
    assert_eq!(store.has_many(&user("9"), "accounts").unwrap(), vec![account("3")]);
}

#[test]
fn failed_member_fetch_returns_stubs_to_empty() {
    let adapter = CountingAdapter::default();
    adapter.offline.set(true);
    let mut store = Store::with_adapter(schema(true), adapter.clone());
    store
        .push(EntityPayload::new("account", "3").belongs_to("user", Some(user("9"))))
        .unwrap();

    let result = block_on(store.load_belongs_to(&account("3"), "user"));
    assert!(matches!(result, Err(StoreError::Fetch(FetchError::Adapter(_)))));
    assert_eq!(store.state(&user("9")).unwrap(), LifecycleState::Empty);
    assert_eq!(store.belongs_to(&account("3"), "user").unwrap(), Some(user("9")));
}

#[test]
fn sync_and_locally_edited_relationships_never_fetch() {
    let adapter = CountingAdapter::default();
    let mut store = Store::with_adapter(schema(false), adapter.clone());
    store
        .push(EntityPayload::new("user", "1").link("accounts", "/users/1/accounts"))
        .unwrap();
    let handle = store.request_has_many(&user("1"), "accounts").unwrap();
    assert!(!handle.is_pending());
    assert_eq!(adapter.calls.get(), 0);

    let (mut store, adapter) = store_with_linked_user();
    store.push(EntityPayload::new("account", "5")).unwrap();
    store
        .add_to_has_many(&user("1"), "accounts", &account("5"))
        .unwrap();
    let handle = store.request_has_many(&user("1"), "accounts").unwrap();
    assert!(!handle.is_pending());
    assert_eq!(block_on(handle).unwrap(), vec![account("5")]);
    assert_eq!(adapter.calls.get(), 0);
}

#[test]
fn missing_adapter_rejects_pending_reads() {
    let mut store = Store::new(schema(true));
    store
        .push(EntityPayload::new("user", "1").link("accounts", "/users/1/accounts"))
        .unwrap();
    let result = block_on(store.load_has_many(&user("1"), "accounts"));
    assert!(matches!(result, Err(StoreError::Fetch(FetchError::Adapter(_)))));
}

#[test]
fn mismatched_fetch_payload_is_rejected() {
    let adapter = CountingAdapter::default();
    let mut store = Store::with_adapter(schema(true), adapter);
    store
        .push(EntityPayload::new("account", "1").link("user", "/accounts/1/user"))
        .unwrap();

    let result = block_on(store.load_belongs_to(&account("1"), "user"));
    assert!(matches!(
        result,
        Err(StoreError::Fetch(FetchError::InvalidPayload(_)))
    ));
    assert!(!store.has_record(&RecordKey::new("topic", "1")));
}

#[test]
fn unloading_owner_cancels_waiters() {
    let (mut store, _adapter) = store_with_linked_user();
    let handle = store.request_has_many(&user("1"), "accounts").unwrap();

    store.unload_record(&user("1")).unwrap();
    assert_eq!(block_on(handle).unwrap_err(), FetchError::Cancelled);
    assert_eq!(block_on(store.settle()), 1);
    assert!(!store.has_record(&account("1")));
}

#[test]
fn late_result_skips_record_pushed_again_after_unload() {
    let (mut store, adapter) = store_with_linked_user();
    let handle = store.request_has_many(&user("1"), "accounts").unwrap();
    store.unload_record(&user("1")).unwrap();
    assert_eq!(block_on(handle).unwrap_err(), FetchError::Cancelled);

    store
        .push(EntityPayload::new("user", "1").has_many("accounts", vec![]))
        .unwrap();
    assert_eq!(block_on(store.settle()), 1);

    assert!(store.has_many(&user("1"), "accounts").unwrap().is_empty());
    assert!(!store.has_record(&account("1")));
    let relationship = store
        .peek_record(&user("1"))
        .unwrap()
        .relationship("accounts")
        .unwrap();
    assert!(!relationship.meta().has_loaded());
    assert!(!relationship.meta().is_fetch_pending());
    assert_eq!(adapter.calls.get(), 1);
}

#[test]
fn related_record_fetch_keeps_canonical_membership() {
    let adapter = CountingAdapter::default();
    let mut store = Store::with_adapter(schema(true), adapter.clone());
    store
        .push(EntityPayload::new("user", "1").has_many("accounts", vec![account("1"), account("4")]))
        .unwrap();
    assert_eq!(store.state(&account("4")).unwrap(), LifecycleState::Empty);

    let accounts = block_on(store.load_has_many(&user("1"), "accounts")).unwrap();
    assert_eq!(accounts, vec![account("1"), account("4")]);
    assert_eq!(adapter.calls.get(), 1);
    assert_eq!(store.state(&account("1")).unwrap(), LifecycleState::LoadedSaved);
    assert_eq!(store.state(&account("4")).unwrap(), LifecycleState::Empty);
    assert_eq!(
        store.has_many(&user("1"), "accounts").unwrap(),
        vec![account("1"), account("4")]
    );
    assert!(!store.is_dirty(&user("1")).unwrap());
}
