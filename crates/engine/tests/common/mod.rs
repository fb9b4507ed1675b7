#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use api_types::settings::SettingsFields;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use engine::{
    MemoryCache, OwnerId, RemoteError, RemoteId, RemoteResult, RemoteRow, RemoteStore, Row,
    SaveOrchestrator, StateStore, SyncOptions, Table,
};
use parking_lot::Mutex;

/// Remote calls in the order they reached the mock.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Ping,
    Insert(Table, Row),
    Update(Table, RemoteId, Row),
    Delete(Table, RemoteId),
    List(Table),
    Upsert(SettingsFields),
    FetchSettings,
}

/// In-memory remote store with switchable reachability and failures.
pub struct MockRemote {
    owner: OwnerId,
    reachable: AtomicBool,
    next_id: AtomicI64,
    clock: AtomicI64,
    tables: Mutex<HashMap<Table, Vec<RemoteRow<Row>>>>,
    settings: Mutex<Option<SettingsFields>>,
    calls: Mutex<Vec<Call>>,
    failure: Mutex<Option<RemoteError>>,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockRemote {
    pub fn new(owner: &str) -> Arc<Self> {
        Arc::new(Self {
            owner: OwnerId::new(owner),
            reachable: AtomicBool::new(true),
            next_id: AtomicI64::new(1),
            clock: AtomicI64::new(0),
            tables: Mutex::new(HashMap::new()),
            settings: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner.clone()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Every following call fails with `failure` until it is cleared.
    pub fn set_failure(&self, failure: Option<RemoteError>) {
        *self.failure.lock() = failure;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Store a row directly, as if another client had inserted it.
    pub fn seed(&self, table: Table, row: Row) -> RemoteId {
        self.store(table, row)
    }

    pub fn seed_settings(&self, settings: SettingsFields) {
        *self.settings.lock() = Some(settings);
    }

    pub fn rows(&self, table: Table) -> Vec<RemoteRow<Row>> {
        self.tables.lock().get(&table).cloned().unwrap_or_default()
    }

    pub fn stored_settings(&self) -> Option<SettingsFields> {
        self.settings.lock().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn inserts(&self) -> usize {
        self.count(|call| matches!(call, Call::Insert(..)))
    }

    pub fn updates(&self) -> usize {
        self.count(|call| matches!(call, Call::Update(..)))
    }

    pub fn deletes(&self) -> usize {
        self.count(|call| matches!(call, Call::Delete(..)))
    }

    pub fn upserts(&self) -> usize {
        self.count(|call| matches!(call, Call::Upsert(..)))
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn count(&self, filter: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| filter(call)).count()
    }

    fn created_at(&self) -> DateTime<Utc> {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst);
        Utc.timestamp_opt(1_700_000_000 + tick, 0).unwrap()
    }

    fn store(&self, table: Table, row: Row) -> RemoteId {
        let id = RemoteId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let created_at = self.created_at();
        self.tables.lock().entry(table).or_default().push(RemoteRow {
            id,
            owner_id: self.owner.clone(),
            created_at,
            fields: row,
        });
        id
    }

    /// Record the call, wait the configured latency and apply the failure mode.
    async fn enter(&self, call: Call) -> RemoteResult<()> {
        self.calls.lock().push(call);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("connection refused".to_string()));
        }
        match self.failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    fn owner(&self) -> OwnerId {
        self.owner.clone()
    }

    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn ping(&self) -> RemoteResult<()> {
        self.enter(Call::Ping).await
    }

    async fn insert(&self, table: Table, row: &Row) -> RemoteResult<RemoteId> {
        self.enter(Call::Insert(table, row.clone())).await?;
        Ok(self.store(table, row.clone()))
    }

    async fn update(&self, table: Table, id: RemoteId, row: &Row) -> RemoteResult<()> {
        self.enter(Call::Update(table, id, row.clone())).await?;
        let mut tables = self.tables.lock();
        let stored = tables
            .get_mut(&table)
            .and_then(|rows| rows.iter_mut().find(|stored| stored.id == id))
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        stored.fields = row.clone();
        Ok(())
    }

    async fn delete(&self, table: Table, id: RemoteId) -> RemoteResult<()> {
        self.enter(Call::Delete(table, id)).await?;
        let mut tables = self.tables.lock();
        let rows = tables.entry(table).or_default();
        let before = rows.len();
        rows.retain(|stored| stored.id != id);
        if rows.len() == before {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list(&self, table: Table, owner: &OwnerId) -> RemoteResult<Vec<RemoteRow<Row>>> {
        self.enter(Call::List(table)).await?;
        Ok(self
            .rows(table)
            .into_iter()
            .filter(|row| &row.owner_id == owner)
            .collect())
    }

    async fn upsert_by_owner(
        &self,
        _owner: &OwnerId,
        settings: &SettingsFields,
    ) -> RemoteResult<()> {
        self.enter(Call::Upsert(settings.clone())).await?;
        *self.settings.lock() = Some(settings.clone());
        Ok(())
    }

    async fn fetch_settings(&self, _owner: &OwnerId) -> RemoteResult<Option<SettingsFields>> {
        self.enter(Call::FetchSettings).await?;
        Ok(self.settings.lock().clone())
    }
}

pub fn options() -> SyncOptions {
    SyncOptions {
        debounce_ms: 40,
        max_concurrency: 2,
        max_retries: 2,
        retry_backoff_ms: 10,
        remote_timeout_ms: 1_000,
    }
}

pub fn orchestrator(remote: &Arc<MockRemote>) -> (SaveOrchestrator, Arc<MemoryCache>) {
    let cache = Arc::new(MemoryCache::new());
    let orchestrator = SaveOrchestrator::new(
        StateStore::default(),
        cache.clone(),
        remote.clone(),
        options(),
    );
    (orchestrator, cache)
}
