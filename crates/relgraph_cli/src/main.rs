//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire `relgraph_core` end to end: schema, push, local edit, rollback.
//! - Keep output deterministic `key=value` lines for quick sanity checks.

use relgraph_core::{
    EntityPayload, ModelDef, RecordKey, RelationshipDef, Store, StoreConfig, StoreResult,
};
use serde_json::json;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("relgraph_core version={}", relgraph_core::core_version());
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("relgraph_cli error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = StoreConfig {
        default_async: false,
        ..StoreConfig::default()
    };
    let mut store = Store::from_config(
        &config,
        vec![
            ModelDef::new("user")
                .attribute("name")
                .relationship("accounts", RelationshipDef::has_many("account")),
            ModelDef::new("account").relationship("user", RelationshipDef::belongs_to("user")),
        ],
    )?;
    scenario(&mut store)?;
    Ok(())
}

fn scenario(store: &mut Store) -> StoreResult<()> {
    let ada = RecordKey::new("user", "1");
    let grace = RecordKey::new("user", "2");
    let account = RecordKey::new("account", "1");

    store.push(
        EntityPayload::new("user", "1")
            .attribute("name", json!("Ada"))
            .has_many("accounts", vec![account.clone()]),
    )?;
    store.push(EntityPayload::new("user", "2").attribute("name", json!("Grace")))?;
    store.push(EntityPayload::new("account", "1"))?;
    print_owner(store, &account, "pushed")?;

    store.set_belongs_to(&account, "user", Some(grace.clone()))?;
    print_owner(store, &account, "edited")?;
    println!(
        "stage=edited user:1.accounts={} user:2.accounts={} dirty={}",
        store.has_many(&ada, "accounts")?.len(),
        store.has_many(&grace, "accounts")?.len(),
        store.is_dirty(&account)?
    );

    store.rollback(&account)?;
    print_owner(store, &account, "rolled_back")?;
    println!(
        "stage=rolled_back state={} dirty={}",
        store.state(&account)?,
        store.is_dirty(&account)?
    );
    Ok(())
}

fn print_owner(store: &Store, account: &RecordKey, stage: &str) -> StoreResult<()> {
    let owner = store
        .belongs_to(account, "user")?
        .map_or_else(|| "null".to_string(), |key| key.to_string());
    println!("stage={stage} {account}.user={owner}");
    Ok(())
}
