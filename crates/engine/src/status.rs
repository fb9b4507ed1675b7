//! Observable sync state.

use std::fmt;

use api_types::RemoteId;

use crate::{FailureKind, entity::EntityRef};

/// Aggregate state shown by the UI.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Error,
    Offline,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Error => "error",
            Self::Offline => "offline",
        };
        f.write_str(label)
    }
}

/// Where a flush ended up writing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Remote,
    Local(LocalReason),
}

/// Why a flush stayed local.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalReason {
    Locked,
    Offline,
    AuthSuspended,
}

/// Per-trigger progress, mostly for diagnostics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerPhase {
    Idle,
    Queued,
    InFlight,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// A flush settled successfully.
    Saved { target: EntityRef, route: Route },
    /// A new row received its remote identity.
    Bound { target: EntityRef, id: RemoteId },
    /// A queued save was dropped in favour of a newer one.
    Superseded { target: EntityRef },
    /// A remote write failed; the change is kept locally.
    Failed {
        target: Option<EntityRef>,
        kind: FailureKind,
        message: String,
    },
    /// A row was removed locally, and remotely if it was bound.
    Deleted {
        target: EntityRef,
        id: Option<RemoteId>,
    },
}
