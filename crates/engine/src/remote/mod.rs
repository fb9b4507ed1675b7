//! Remote store client capability.
//!
//! Every operation is scoped to the owner the client is authenticated as.
//! Implementations must be safe to call again after a failure; preventing a
//! second insert for a bound row is the orchestrator's job.

use api_types::{OwnerId, RemoteId, RemoteRow, Table, settings::SettingsFields};
use async_trait::async_trait;

use crate::{RemoteError, entity::Row};

mod http;

pub use http::HttpRemote;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// A multi-table remote database reachable over the network.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Account every call is scoped to.
    fn owner(&self) -> OwnerId;

    /// Cheap local guess of whether the remote can be reached right now.
    fn is_reachable(&self) -> bool;

    /// Probe connectivity and credentials.
    async fn ping(&self) -> RemoteResult<()>;

    /// Insert a row and return the identity the server assigned.
    async fn insert(&self, table: Table, row: &Row) -> RemoteResult<RemoteId>;

    async fn update(&self, table: Table, id: RemoteId, row: &Row) -> RemoteResult<()>;

    async fn delete(&self, table: Table, id: RemoteId) -> RemoteResult<()>;

    async fn list(&self, table: Table, owner: &OwnerId) -> RemoteResult<Vec<RemoteRow<Row>>>;

    /// Create or replace the settings singleton of `owner`.
    async fn upsert_by_owner(&self, owner: &OwnerId, settings: &SettingsFields)
    -> RemoteResult<()>;

    async fn fetch_settings(&self, owner: &OwnerId) -> RemoteResult<Option<SettingsFields>>;
}
