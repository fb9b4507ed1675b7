use std::{sync::Arc, time::Duration};

use api_types::{
    expense::{Billing, ExpenseFields},
    income::IncomeFields,
    settings::{SettingsFields, Theme},
};
use chrono::NaiveDate;
use engine::{
    Collection, HttpRemote, MemoryCache, RemoteError, RemoteStore, Row, SaveOrchestrator,
    StateStore, SyncOptions, SyncStatus, Table,
};
use migration::MigratorTrait;
use sea_orm::Database;

async fn spawn_server() -> String {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    server::owner::create(&db, "alice", "secret").await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = server::spawn_with_listener(db, listener).unwrap();
    format!("http://{addr}")
}

fn remote(base_url: &str, password: &str) -> Arc<HttpRemote> {
    Arc::new(HttpRemote::new(base_url, "alice", password, Duration::from_secs(5)).unwrap())
}

fn options() -> SyncOptions {
    SyncOptions {
        debounce_ms: 5,
        retry_backoff_ms: 5,
        ..SyncOptions::default()
    }
}

#[tokio::test]
async fn rows_round_trip_through_the_server() {
    let base_url = spawn_server().await;
    let remote = remote(&base_url, "secret");
    let owner = remote.owner();

    remote.ping().await.unwrap();

    let gym = Row::Expense(ExpenseFields::new("Gym", 40.0, Billing::Monthly));
    let id = remote.insert(Table::Personal, &gym).await.unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 4, 2).unwrap();
    let invoice = Row::Income(IncomeFields::new("Invoice 3", date, 800.0));
    let income_id = remote.insert(Table::Income, &invoice).await.unwrap();
    assert!(income_id > id);

    let rows = remote.list(Table::Personal, &owner).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
    assert_eq!(rows[0].fields, gym);
    assert!(remote.list(Table::Business, &owner).await.unwrap().is_empty());

    let income = remote.list(Table::Income, &owner).await.unwrap();
    assert_eq!(income[0].fields, invoice);

    let edited = Row::Expense(ExpenseFields::new("Gym", 45.0, Billing::Monthly));
    remote.update(Table::Personal, id, &edited).await.unwrap();
    let rows = remote.list(Table::Personal, &owner).await.unwrap();
    assert_eq!(rows[0].fields, edited);

    remote.delete(Table::Personal, id).await.unwrap();
    let err = remote.delete(Table::Personal, id).await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound(_)));
    let err = remote.update(Table::Personal, id, &edited).await.unwrap_err();
    assert!(matches!(err, RemoteError::NotFound(_)));
}

#[tokio::test]
async fn settings_are_fetched_after_upsert() {
    let base_url = spawn_server().await;
    let remote = remote(&base_url, "secret");
    let owner = remote.owner();

    assert_eq!(remote.fetch_settings(&owner).await.unwrap(), None);

    let settings = SettingsFields {
        theme: Theme::Light,
        column_order: vec!["name".to_string(), "cost".to_string()],
        ..SettingsFields::default()
    };
    remote.upsert_by_owner(&owner, &settings).await.unwrap();
    assert_eq!(remote.fetch_settings(&owner).await.unwrap(), Some(settings));
}

#[tokio::test]
async fn server_side_validation_is_reported() {
    let base_url = spawn_server().await;
    let remote = remote(&base_url, "secret");

    let blank = Row::Expense(ExpenseFields::new(" ", 10.0, Billing::Monthly));
    let err = remote.insert(Table::Business, &blank).await.unwrap_err();
    assert!(matches!(err, RemoteError::Validation(_)));
}

#[tokio::test]
async fn wrong_password_is_an_auth_failure() {
    let base_url = spawn_server().await;
    let remote = remote(&base_url, "wrong");

    let err = remote.ping().await.unwrap_err();
    assert!(matches!(err, RemoteError::Auth(_)));
    assert!(remote.is_reachable());

    remote.set_credentials("alice", "secret");
    remote.ping().await.unwrap();
}

#[tokio::test]
async fn unreachable_server_is_a_network_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let remote = remote(&format!("http://{addr}"), "secret");
    let err = remote.ping().await.unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)));
    assert!(!remote.is_reachable());
}

#[tokio::test]
async fn orchestrator_syncs_against_the_server() {
    let base_url = spawn_server().await;
    let remote = remote(&base_url, "secret");
    let orchestrator = SaveOrchestrator::new(
        StateStore::default(),
        Arc::new(MemoryCache::new()),
        remote.clone(),
        options(),
    );
    let state = orchestrator.state();

    let target = state
        .add_expense(
            Collection::Business,
            ExpenseFields::new("Hosting", 20.0, Billing::Monthly),
        )
        .unwrap();
    orchestrator.save_all("test");
    orchestrator.settled().await;

    assert_eq!(*orchestrator.status().borrow(), SyncStatus::Success);
    let id = state.identity(target).unwrap().unwrap();
    let rows = remote.list(Table::Business, &remote.owner()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
    assert!(remote.fetch_settings(&remote.owner()).await.unwrap().is_some());

    orchestrator.request_delete(target).await.unwrap();
    assert!(remote.list(Table::Business, &remote.owner()).await.unwrap().is_empty());
}
