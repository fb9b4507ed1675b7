//! Synchronization engine of tally.
//!
//! The [`StateStore`] holds the ledger the UI edits. Every mutation is handed
//! to the [`SaveOrchestrator`], which mirrors the ledger into a
//! [`LocalCache`] and, when allowed, into a [`RemoteStore`]. New rows receive
//! their remote identity through the [`IdentityBinder`]; the [`Reconciler`]
//! removes duplicate remote rows after reloads and imports.

pub use api_types::{OwnerId, RemoteId, RemoteRow, Table};
pub use binder::{BindOutcome, IdentityBinder};
pub use cache::{DEFAULT_NAMESPACE, FileCache, LocalCache, MemoryCache};
pub use entity::{Collection, Entity, EntityKey, EntityRef, ExpenseRow, IncomeRow, Row};
pub use error::{EngineError, FailureKind, RemoteError};
pub use loader::{ImportReport, Loader, ReloadReport};
pub use options::SyncOptions;
pub use orchestrator::SaveOrchestrator;
pub use reconcile::{DedupReport, Reconciler};
pub use remote::{HttpRemote, RemoteResult, RemoteStore};
pub use state::{Snapshot, StateStore};
pub use status::{LocalReason, Route, SyncEvent, SyncStatus, TriggerPhase};

mod binder;
mod cache;
mod entity;
mod error;
mod loader;
mod options;
mod orchestrator;
mod reconcile;
mod remote;
mod state;
mod status;

pub type ResultEngine<T> = Result<T, EngineError>;
