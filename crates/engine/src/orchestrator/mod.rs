//! The save orchestrator routes every mutation of the state store to the
//! local cache and, when allowed, to the remote store.
//!
//! Requests are debounced per entity, flushed one at a time per entity and
//! concurrently across entities under a small permit pool. The local cache is
//! written on every flush whatever the remote outcome.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use api_types::RemoteId;
use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::{Semaphore, broadcast, watch},
};

use crate::{
    EngineError, RemoteError, ResultEngine, SyncOptions,
    binder::{BindOutcome, IdentityBinder},
    cache::LocalCache,
    entity::EntityRef,
    remote::{RemoteResult, RemoteStore},
    state::StateStore,
    status::{LocalReason, Route, SyncEvent, SyncStatus, TriggerPhase},
};

mod retry;
mod trigger;

pub(crate) use retry::with_retry;
use trigger::Trigger;

const EVENT_CAPACITY: usize = 256;

/// How one unit of work ended, folded into the aggregate status.
#[derive(Clone, Copy, Debug)]
enum Outcome {
    Settled(Route),
    Failed,
    Dropped,
}

/// Bookkeeping of the current burst of work.
#[derive(Debug, Default)]
struct Progress {
    outstanding: usize,
    failed: bool,
    offline: bool,
}

struct Inner {
    state: StateStore,
    cache: Arc<dyn LocalCache>,
    remote: Arc<dyn RemoteStore>,
    binder: IdentityBinder,
    options: SyncOptions,
    triggers: Mutex<HashMap<EntityRef, Arc<Trigger>>>,
    permits: Semaphore,
    auth_suspended: AtomicBool,
    /// Entities whose latest change has not reached the remote store yet.
    unsynced: Mutex<HashSet<EntityRef>>,
    /// Serializes snapshot + store so the newest snapshot is written last.
    cache_lock: Mutex<()>,
    progress: Mutex<Progress>,
    status: watch::Sender<SyncStatus>,
    outstanding: watch::Sender<usize>,
    events: broadcast::Sender<SyncEvent>,
}

/// Cheap to clone; every clone drives the same orchestrator.
#[derive(Clone)]
pub struct SaveOrchestrator {
    inner: Arc<Inner>,
}

impl SaveOrchestrator {
    pub fn new(
        state: StateStore,
        cache: Arc<dyn LocalCache>,
        remote: Arc<dyn RemoteStore>,
        options: SyncOptions,
    ) -> Self {
        let unsynced = state
            .bound_flags()
            .into_iter()
            .filter_map(|(target, bound)| (!bound).then_some(target))
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                binder: IdentityBinder::new(state.clone()),
                state,
                cache,
                remote,
                permits: Semaphore::new(options.max_concurrency.max(1)),
                options,
                triggers: Mutex::new(HashMap::new()),
                auth_suspended: AtomicBool::new(false),
                unsynced: Mutex::new(unsynced),
                cache_lock: Mutex::new(()),
                progress: Mutex::new(Progress::default()),
                status: watch::Sender::new(SyncStatus::Idle),
                outstanding: watch::Sender::new(0),
                events,
            }),
        }
    }

    /// Build the state store from whatever the cache holds.
    pub fn restore(
        cache: Arc<dyn LocalCache>,
        remote: Arc<dyn RemoteStore>,
        options: SyncOptions,
    ) -> Self {
        let state = StateStore::new(cache.load());
        Self::new(state, cache, remote, options)
    }

    pub fn state(&self) -> &StateStore {
        &self.inner.state
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.inner.remote
    }

    pub fn options(&self) -> &SyncOptions {
        &self.inner.options
    }

    /// Schedule a save of `target`. Never fails; outcomes are reported
    /// through [`status`](Self::status) and [`events`](Self::events).
    ///
    /// `reason` is only logged. Rows renumbered by the change are saved
    /// along with it.
    pub fn request_save(&self, target: EntityRef, reason: &str) {
        self.schedule(target, reason);
        self.save_reordered(reason);
    }

    /// Request a save for every row whose `order` changed as a side effect
    /// of another mutation (a delete, a year move, a reorder, a dedup).
    ///
    /// Returns the number of requests issued.
    pub fn save_reordered(&self, reason: &str) -> usize {
        let targets = self.inner.state.take_reordered();
        if !targets.is_empty() {
            tracing::debug!(reason, count = targets.len(), "saving renumbered rows");
        }
        for target in &targets {
            self.schedule(*target, reason);
        }
        targets.len()
    }

    fn schedule(&self, target: EntityRef, reason: &str) {
        self.inner.unsynced.lock().insert(target);

        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!(%target, reason, "no runtime, saving locally only");
            self.inner.persist_logged();
            return;
        };

        let trigger = self.inner.trigger(target);
        let generation = trigger.enqueue(reason);
        tracing::trace!(%target, reason, generation, "save requested");
        self.inner.begin();

        let inner = Arc::clone(&self.inner);
        runtime.spawn(async move {
            let outcome = inner.run_ticket(target, &trigger, generation).await;
            trigger.finish();
            inner.finish(outcome);
        });
    }

    /// Request a save for every row and for the settings singleton.
    ///
    /// Returns the number of requests issued.
    pub fn save_all(&self, reason: &str) -> usize {
        let mut targets = self.inner.state.refs();
        targets.push(EntityRef::Settings);
        tracing::info!(reason, count = targets.len(), "saving every entity");
        // Every renumbered row is part of this flush already.
        self.inner.state.take_reordered();
        for target in &targets {
            self.schedule(*target, reason);
        }
        targets.len()
    }

    /// Delete a row, remotely first when it is bound.
    ///
    /// The local row is kept when the remote delete cannot happen.
    pub async fn request_delete(&self, target: EntityRef) -> ResultEngine<()> {
        if target == EntityRef::Settings {
            return Err(EngineError::InvalidTarget(
                "settings cannot be deleted".to_string(),
            ));
        }

        let trigger = self.inner.trigger(target);
        trigger.supersede();
        self.inner.begin();
        let result = self.inner.delete(target, &trigger).await;
        if result.is_ok() {
            self.save_reordered("delete");
        }
        let outcome = match &result {
            Ok(()) => Outcome::Settled(Route::Remote),
            Err(EngineError::Remote(_)) => Outcome::Failed,
            Err(_) => Outcome::Dropped,
        };
        self.inner.finish(outcome);
        result
    }

    /// Toggle lock mode. Unlocking flushes everything edited meanwhile.
    pub fn set_lock(&self, locked: bool) {
        self.inner.state.update_settings(|settings| settings.lock_flag = locked);
        if locked {
            tracing::info!("ledger locked, remote writes suspended");
            self.inner.persist_logged();
        } else {
            tracing::info!("ledger unlocked");
            self.save_all("unlock");
        }
    }

    /// Probe the remote store and flush everything once it answers.
    pub async fn reconnect(&self) -> ResultEngine<usize> {
        self.inner.probe().await?;
        Ok(self.save_all("reconnect"))
    }

    /// Lift the auth suspension after the user signed in again.
    pub async fn reauthenticated(&self) -> ResultEngine<usize> {
        self.inner.probe().await?;
        if self.inner.auth_suspended.swap(false, Ordering::SeqCst) {
            tracing::info!("remote writes resumed");
        }
        Ok(self.save_all("reauthenticated"))
    }

    pub fn is_auth_suspended(&self) -> bool {
        self.inner.auth_suspended.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until nothing is queued or in flight.
    pub async fn settled(&self) {
        let mut outstanding = self.inner.outstanding.subscribe();
        // The sender lives in `inner`, which we hold, so this cannot close.
        let _ = outstanding.wait_for(|count| *count == 0).await;
    }

    pub fn trigger_phase(&self, target: EntityRef) -> TriggerPhase {
        self.inner
            .triggers
            .lock()
            .get(&target)
            .map_or(TriggerPhase::Idle, |trigger| trigger.phase())
    }

    /// Whether the latest change of `target` still has to reach the remote.
    pub fn is_pending(&self, target: EntityRef) -> bool {
        self.inner.unsynced.lock().contains(&target)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.unsynced.lock().len()
    }

    /// Request a save for every entity not yet synced.
    pub fn save_pending(&self, reason: &str) -> usize {
        let targets: Vec<_> = self.inner.unsynced.lock().iter().copied().collect();
        for target in &targets {
            self.schedule(*target, reason);
        }
        targets.len() + self.save_reordered(reason)
    }

    /// Write the current snapshot to the local cache.
    pub fn persist(&self) -> ResultEngine<()> {
        self.inner.persist()
    }

    /// Forget per-entity bookkeeping after the state was replaced wholesale.
    pub(crate) fn reset_tracking(&self) {
        self.inner.triggers.lock().clear();
        let unbound = self
            .inner
            .state
            .bound_flags()
            .into_iter()
            .filter_map(|(target, bound)| (!bound).then_some(target))
            .collect();
        *self.inner.unsynced.lock() = unbound;
    }
}

impl Inner {
    fn trigger(&self, target: EntityRef) -> Arc<Trigger> {
        let mut triggers = self.triggers.lock();
        Arc::clone(triggers.entry(target).or_default())
    }

    fn begin(&self) {
        let mut progress = self.progress.lock();
        if progress.outstanding == 0 {
            progress.failed = false;
            progress.offline = false;
            self.status.send_replace(SyncStatus::Syncing);
        }
        progress.outstanding += 1;
        self.outstanding.send_replace(progress.outstanding);
    }

    fn finish(&self, outcome: Outcome) {
        let mut progress = self.progress.lock();
        match outcome {
            Outcome::Failed => progress.failed = true,
            Outcome::Settled(Route::Local(LocalReason::Offline | LocalReason::AuthSuspended)) => {
                progress.offline = true;
            }
            Outcome::Settled(_) | Outcome::Dropped => {}
        }
        progress.outstanding = progress.outstanding.saturating_sub(1);

        if progress.outstanding == 0 {
            let status = if progress.failed {
                SyncStatus::Error
            } else if progress.offline {
                SyncStatus::Offline
            } else {
                SyncStatus::Success
            };
            self.status.send_replace(status);
        }
        self.outstanding.send_replace(progress.outstanding);
    }

    fn emit(&self, event: SyncEvent) {
        // No subscriber is fine.
        let _ = self.events.send(event);
    }

    fn route(&self) -> Route {
        if self.state.is_locked() {
            Route::Local(LocalReason::Locked)
        } else if self.auth_suspended.load(Ordering::SeqCst) {
            Route::Local(LocalReason::AuthSuspended)
        } else if !self.remote.is_reachable() {
            Route::Local(LocalReason::Offline)
        } else {
            Route::Remote
        }
    }

    fn persist(&self) -> ResultEngine<()> {
        let _guard = self.cache_lock.lock();
        let snapshot = self.state.snapshot();
        self.cache.store(&snapshot)
    }

    fn persist_logged(&self) {
        if let Err(err) = self.persist() {
            tracing::error!("cannot write local cache: {err}");
        }
    }

    fn record_failure(&self, target: Option<EntityRef>, err: &RemoteError) {
        if matches!(err, RemoteError::Auth(_)) && !self.auth_suspended.swap(true, Ordering::SeqCst)
        {
            tracing::warn!("remote writes suspended until re-authentication");
        }
        match target {
            Some(target) => tracing::warn!(%target, "remote write failed: {err}"),
            None => tracing::warn!("remote call failed: {err}"),
        }
        self.emit(SyncEvent::Failed {
            target,
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    async fn run_ticket(&self, target: EntityRef, trigger: &Trigger, generation: u64) -> Outcome {
        tokio::time::sleep(self.options.debounce()).await;
        if !trigger.is_current(generation) {
            self.emit(SyncEvent::Superseded { target });
            return Outcome::Dropped;
        }

        let _lane = trigger.lane().await;
        if !trigger.is_current(generation) {
            self.emit(SyncEvent::Superseded { target });
            return Outcome::Dropped;
        }

        trigger.set_in_flight(true);
        let outcome = self.flush(target, trigger, generation).await;
        trigger.set_in_flight(false);
        outcome
    }

    /// Write the entity as it is now, then refresh the cache.
    async fn flush(&self, target: EntityRef, trigger: &Trigger, generation: u64) -> Outcome {
        let reason = trigger.reason();
        let route = self.route();
        let outcome = match route {
            Route::Local(local) => {
                tracing::debug!(%target, reason, ?local, "saved locally only");
                Outcome::Settled(route)
            }
            Route::Remote => match self.write_remote(target).await {
                Ok(()) => {
                    if trigger.is_current(generation) {
                        self.unsynced.lock().remove(&target);
                    }
                    tracing::debug!(%target, reason, "saved remotely");
                    Outcome::Settled(route)
                }
                Err(err) => {
                    self.record_failure(Some(target), &err);
                    Outcome::Failed
                }
            },
        };

        self.persist_logged();
        if let Outcome::Settled(route) = outcome {
            self.emit(SyncEvent::Saved { target, route });
        }
        outcome
    }

    async fn write_remote(&self, target: EntityRef) -> RemoteResult<()> {
        let Ok(_permit) = self.permits.acquire().await else {
            return Err(RemoteError::Network("orchestrator shut down".to_string()));
        };
        let remote = self.remote.as_ref();
        let options = &self.options;
        let table = target.table();

        if target == EntityRef::Settings {
            let owner = remote.owner();
            let settings = self.state.settings();
            let (owner, settings) = (&owner, &settings);
            return with_retry(options, "upsert", move || {
                remote.upsert_by_owner(owner, settings)
            })
            .await;
        }

        let Some((identity, row)) = self.state.row_payload(target) else {
            tracing::debug!(%target, "row deleted before flush");
            return Ok(());
        };
        let row = &row;

        match identity {
            Some(id) => with_retry(options, "update", move || remote.update(table, id, row)).await,
            None => {
                let id = with_retry(options, "insert", move || remote.insert(table, row)).await?;
                self.bind(target, id);
                Ok(())
            }
        }
    }

    fn bind(&self, target: EntityRef, id: RemoteId) {
        if self.binder.bind(target, id) == BindOutcome::Bound {
            self.emit(SyncEvent::Bound { target, id });
        }
    }

    async fn delete(&self, target: EntityRef, trigger: &Trigger) -> ResultEngine<()> {
        // Waits for an in-flight insert, so its identity is known below.
        let _lane = trigger.lane().await;
        let identity = self.state.identity(target)?;

        if let Some(id) = identity {
            match self.route() {
                Route::Local(LocalReason::Locked) => return Err(EngineError::Locked),
                Route::Local(LocalReason::AuthSuspended) => {
                    return Err(EngineError::RemoteSuspended);
                }
                Route::Local(LocalReason::Offline) => {
                    let err = RemoteError::Network("remote store unreachable".to_string());
                    self.record_failure(Some(target), &err);
                    return Err(err.into());
                }
                Route::Remote => {}
            }

            let Ok(_permit) = self.permits.acquire().await else {
                return Err(RemoteError::Network("orchestrator shut down".to_string()).into());
            };
            let remote = self.remote.as_ref();
            let table = target.table();
            match with_retry(&self.options, "delete", move || remote.delete(table, id)).await {
                Ok(()) => {}
                Err(RemoteError::NotFound(_)) => {
                    tracing::debug!(%target, %id, "remote row already gone");
                }
                Err(err) => {
                    self.record_failure(Some(target), &err);
                    return Err(err.into());
                }
            }
        }

        self.state.remove(target)?;
        self.unsynced.lock().remove(&target);
        self.triggers.lock().remove(&target);
        self.persist_logged();
        tracing::debug!(%target, ?identity, "row deleted");
        self.emit(SyncEvent::Deleted {
            target,
            id: identity,
        });
        Ok(())
    }

    async fn probe(&self) -> ResultEngine<()> {
        let remote = self.remote.as_ref();
        match with_retry(&self.options, "ping", move || remote.ping()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.record_failure(None, &err);
                Err(err.into())
            }
        }
    }
}
