use std::{sync::Arc, time::Duration};

use api_types::{
    expense::{Billing, ExpenseFields},
    income::IncomeFields,
};
use chrono::NaiveDate;
use engine::{
    Collection, EngineError, FailureKind, LocalCache, MemoryCache, RemoteError, Row,
    SaveOrchestrator, StateStore, SyncEvent, SyncStatus, Table, TriggerPhase,
};

mod common;

use common::{Call, MockRemote, options, orchestrator};

fn gym() -> ExpenseFields {
    ExpenseFields::new("Gym", 40.0, Billing::Monthly)
}

fn inserted_cost(call: &Call) -> Option<f64> {
    match call {
        Call::Insert(_, Row::Expense(fields)) => Some(fields.cost),
        _ => None,
    }
}

#[tokio::test(start_paused = true)]
async fn offline_edits_collapse_into_one_insert_after_reconnect() {
    let remote = MockRemote::new("alice");
    remote.set_reachable(false);
    let (orchestrator, cache) = orchestrator(&remote);
    let state = orchestrator.state();

    let target = state.add_expense(Collection::Personal, gym()).unwrap();
    orchestrator.request_save(target, "create");
    for cost in [45.0, 42.0] {
        state.update_expense(target, |fields| fields.cost = cost).unwrap();
        orchestrator.request_save(target, "edit");
    }
    orchestrator.settled().await;

    assert!(remote.calls().is_empty());
    assert_eq!(*orchestrator.status().borrow(), SyncStatus::Offline);
    assert!(orchestrator.is_pending(target));
    assert_eq!(cache.load().personal[0].fields.cost, 42.0);

    remote.set_reachable(true);
    orchestrator.reconnect().await.unwrap();
    orchestrator.settled().await;

    let inserts: Vec<_> = remote.calls().iter().filter_map(inserted_cost).collect();
    assert_eq!(inserts, vec![42.0]);
    assert_eq!(remote.upserts(), 1);
    assert!(!orchestrator.is_pending(target));
    assert_eq!(*orchestrator.status().borrow(), SyncStatus::Success);

    let id = state.identity(target).unwrap().unwrap();
    assert_eq!(cache.load().personal[0].identity(), Some(id));

    state.update_expense(target, |fields| fields.cost = 43.0).unwrap();
    orchestrator.request_save(target, "edit");
    orchestrator.settled().await;

    assert_eq!(remote.inserts(), 1);
    assert_eq!(remote.updates(), 1);
    assert_eq!(remote.rows(Table::Personal).len(), 1);
    assert_eq!(
        remote.rows(Table::Personal)[0].fields,
        Row::Expense(ExpenseFields {
            cost: 43.0,
            ..gym()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn edit_during_insert_becomes_an_update() {
    let remote = MockRemote::new("alice");
    remote.set_latency(Duration::from_millis(100));
    let (orchestrator, _cache) = orchestrator(&remote);
    let state = orchestrator.state();

    let target = state
        .add_expense(
            Collection::Business,
            ExpenseFields::new("Hosting", 20.0, Billing::Monthly),
        )
        .unwrap();
    orchestrator.request_save(target, "create");

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(orchestrator.trigger_phase(target), TriggerPhase::InFlight);

    state.update_expense(target, |fields| fields.cost = 25.0).unwrap();
    orchestrator.request_save(target, "edit");
    orchestrator.settled().await;

    assert_eq!(remote.inserts(), 1);
    assert_eq!(remote.updates(), 1);
    let rows = remote.rows(Table::Business);
    assert_eq!(rows.len(), 1);
    assert_eq!(state.identity(target).unwrap(), Some(rows[0].id));
    let Row::Expense(fields) = &rows[0].fields else {
        panic!("expected an expense row");
    };
    assert_eq!(fields.cost, 25.0);
    assert_eq!(orchestrator.trigger_phase(target), TriggerPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn lock_mode_keeps_writes_local_until_unlock() {
    let remote = MockRemote::new("alice");
    let (orchestrator, cache) = orchestrator(&remote);
    let state = orchestrator.state();

    orchestrator.set_lock(true);
    let target = state
        .add_expense(
            Collection::Personal,
            ExpenseFields::new("Phone", 15.0, Billing::Monthly),
        )
        .unwrap();
    orchestrator.request_save(target, "create");
    orchestrator.settled().await;

    assert!(remote.calls().is_empty());
    assert_eq!(*orchestrator.status().borrow(), SyncStatus::Success);
    assert!(cache.load().settings.lock_flag);
    assert_eq!(cache.load().personal.len(), 1);

    orchestrator.set_lock(false);
    orchestrator.settled().await;

    assert_eq!(remote.inserts(), 1);
    assert_eq!(remote.upserts(), 1);
    assert!(!remote.stored_settings().unwrap().lock_flag);
    assert!(state.identity(target).unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn locked_ledger_refuses_remote_delete() {
    let remote = MockRemote::new("alice");
    let (orchestrator, _cache) = orchestrator(&remote);
    let state = orchestrator.state();

    let target = state.add_expense(Collection::Personal, gym()).unwrap();
    orchestrator.request_save(target, "create");
    orchestrator.settled().await;

    orchestrator.set_lock(true);
    let err = orchestrator.request_delete(target).await.unwrap_err();

    assert!(matches!(err, EngineError::Locked));
    assert!(state.expense(target).is_some());
    assert_eq!(remote.deletes(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_remote_delete_keeps_the_row() {
    let remote = MockRemote::new("alice");
    let (orchestrator, cache) = orchestrator(&remote);
    let state = orchestrator.state();

    let target = state.add_expense(Collection::Personal, gym()).unwrap();
    orchestrator.request_save(target, "create");
    orchestrator.settled().await;
    let id = state.identity(target).unwrap().unwrap();

    remote.set_failure(Some(RemoteError::Network("reset".to_string())));
    let err = orchestrator.request_delete(target).await.unwrap_err();

    assert!(matches!(err, EngineError::Remote(RemoteError::Network(_))));
    assert_eq!(remote.deletes(), 1 + options().max_retries as usize);
    assert_eq!(state.identity(target).unwrap(), Some(id));
    assert_eq!(cache.load().personal.len(), 1);
    assert_eq!(*orchestrator.status().borrow(), SyncStatus::Error);

    remote.set_failure(None);
    orchestrator.request_delete(target).await.unwrap();
    assert!(state.expense(target).is_none());
    assert!(remote.rows(Table::Personal).is_empty());
    assert!(cache.load().personal.is_empty());
}

#[tokio::test(start_paused = true)]
async fn deleting_an_unbound_row_stays_local() {
    let remote = MockRemote::new("alice");
    let (orchestrator, cache) = orchestrator(&remote);
    let state = orchestrator.state();
    let mut events = orchestrator.events();

    let target = state.add_expense(Collection::Personal, gym()).unwrap();
    orchestrator.request_save(target, "create");
    orchestrator.request_delete(target).await.unwrap();
    orchestrator.settled().await;

    assert!(remote.calls().is_empty());
    assert!(state.expense(target).is_none());
    assert!(cache.load().personal.is_empty());
    assert!(!orchestrator.is_pending(target));

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&SyncEvent::Deleted { target, id: None }));
    assert!(seen.contains(&SyncEvent::Superseded { target }));
}

#[tokio::test(start_paused = true)]
async fn deleting_a_row_already_gone_remotely_succeeds() {
    let remote = MockRemote::new("alice");
    let (orchestrator, _cache) = orchestrator(&remote);
    let state = orchestrator.state();

    let target = state.add_expense(Collection::Personal, gym()).unwrap();
    orchestrator.request_save(target, "create");
    orchestrator.settled().await;
    let id = state.identity(target).unwrap().unwrap();

    let remote_store: &dyn engine::RemoteStore = remote.as_ref();
    remote_store.delete(Table::Personal, id).await.unwrap();

    orchestrator.request_delete(target).await.unwrap();
    assert!(state.expense(target).is_none());
}

#[tokio::test(start_paused = true)]
async fn auth_failure_suspends_remote_writes_until_reauthenticated() {
    let remote = MockRemote::new("alice");
    remote.set_failure(Some(RemoteError::Auth("expired".to_string())));
    let (orchestrator, _cache) = orchestrator(&remote);
    let state = orchestrator.state();

    let target = state.add_expense(Collection::Personal, gym()).unwrap();
    orchestrator.request_save(target, "create");
    orchestrator.settled().await;

    assert_eq!(remote.inserts(), 1);
    assert!(orchestrator.is_auth_suspended());
    assert_eq!(*orchestrator.status().borrow(), SyncStatus::Error);

    remote.set_failure(None);
    state.update_expense(target, |fields| fields.cost = 41.0).unwrap();
    orchestrator.request_save(target, "edit");
    orchestrator.settled().await;

    assert_eq!(remote.inserts(), 1);
    assert_eq!(*orchestrator.status().borrow(), SyncStatus::Offline);
    let err = orchestrator.request_delete(target).await;
    assert!(err.is_ok(), "unbound rows are deleted locally even while suspended");

    let other = state
        .add_expense(
            Collection::Personal,
            ExpenseFields::new("Rent", 900.0, Billing::Monthly),
        )
        .unwrap();
    orchestrator.reauthenticated().await.unwrap();
    orchestrator.settled().await;

    assert!(!orchestrator.is_auth_suspended());
    assert_eq!(remote.inserts(), 2);
    assert!(state.identity(other).unwrap().is_some());
    assert_eq!(remote.rows(Table::Personal).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn validation_failure_is_not_retried_and_stays_pending() {
    let remote = MockRemote::new("alice");
    remote.set_failure(Some(RemoteError::Validation("name".to_string())));
    let (orchestrator, cache) = orchestrator(&remote);
    let mut events = orchestrator.events();

    let target = orchestrator
        .state()
        .add_expense(
            Collection::Personal,
            ExpenseFields::new("", 10.0, Billing::Monthly),
        )
        .unwrap();
    orchestrator.request_save(target, "create");
    orchestrator.settled().await;

    assert_eq!(remote.inserts(), 1);
    assert!(orchestrator.is_pending(target));
    assert_eq!(cache.load().personal.len(), 1);
    assert_eq!(*orchestrator.status().borrow(), SyncStatus::Error);
    assert!(!orchestrator.is_auth_suspended());

    let failed = std::iter::from_fn(|| events.try_recv().ok()).find_map(|event| match event {
        SyncEvent::Failed { target, kind, .. } => Some((target, kind)),
        _ => None,
    });
    assert_eq!(failed, Some((Some(target), FailureKind::Validation)));
}

#[tokio::test(start_paused = true)]
async fn remote_calls_respect_the_permit_pool() {
    let remote = MockRemote::new("alice");
    remote.set_latency(Duration::from_millis(50));
    let (orchestrator, _cache) = orchestrator(&remote);

    for index in 0..6 {
        let target = orchestrator
            .state()
            .add_expense(
                Collection::Personal,
                ExpenseFields::new(format!("Row {index}"), 10.0, Billing::Monthly),
            )
            .unwrap();
        orchestrator.request_save(target, "create");
    }
    orchestrator.settled().await;

    assert_eq!(remote.inserts(), 6);
    assert!(remote.max_in_flight() <= options().max_concurrency);
    assert_eq!(orchestrator.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn income_year_change_updates_the_bound_row() {
    let remote = MockRemote::new("alice");
    let (orchestrator, _cache) = orchestrator(&remote);
    let state = orchestrator.state();

    let date = NaiveDate::from_ymd_opt(2023, 11, 20).unwrap();
    let target = state.add_income(IncomeFields::new("Invoice 9", date, 1200.0));
    orchestrator.request_save(target, "create");
    orchestrator.settled().await;

    state
        .update_income(target, |fields| {
            fields.date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
            fields.year = 2024;
        })
        .unwrap();
    orchestrator.request_save(target, "edit");
    orchestrator.settled().await;

    assert_eq!(remote.inserts(), 1);
    assert_eq!(remote.updates(), 1);
    let rows = remote.rows(Table::Income);
    let Row::Income(fields) = &rows[0].fields else {
        panic!("expected an income row");
    };
    assert_eq!(fields.year, 2024);
    assert_eq!(state.income_for_year(2024).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn restore_picks_up_bound_rows_from_the_cache() {
    let remote = MockRemote::new("alice");
    let (orchestrator, cache) = orchestrator(&remote);
    let state = orchestrator.state();

    let synced = state.add_expense(Collection::Personal, gym()).unwrap();
    orchestrator.request_save(synced, "create");
    orchestrator.settled().await;

    remote.set_reachable(false);
    let local = state
        .add_expense(
            Collection::Business,
            ExpenseFields::new("Laptop", 1500.0, Billing::Annually),
        )
        .unwrap();
    orchestrator.request_save(local, "create");
    orchestrator.settled().await;

    let restored = SaveOrchestrator::restore(cache.clone(), remote.clone(), options());
    assert_eq!(restored.state().snapshot(), state.snapshot());
    assert_eq!(restored.pending_count(), 1);
    assert!(restored.is_pending(local));
    assert!(!restored.is_pending(synced));
}

#[test]
fn save_without_runtime_still_persists() {
    let remote = MockRemote::new("alice");
    let cache = Arc::new(MemoryCache::new());
    let orchestrator =
        SaveOrchestrator::new(StateStore::default(), cache.clone(), remote.clone(), options());

    let target = orchestrator
        .state()
        .add_expense(Collection::Personal, gym())
        .unwrap();
    orchestrator.request_save(target, "create");

    assert_eq!(cache.writes(), 1);
    assert_eq!(cache.load().personal.len(), 1);
    assert!(orchestrator.is_pending(target));
    assert!(remote.calls().is_empty());
}
