//! Identity binding for newly created rows.

use api_types::RemoteId;

use crate::{entity::EntityRef, state::StateStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindOutcome {
    /// The row was pending creation and now carries the identity.
    Bound,
    /// The row already had an identity; nothing changed.
    AlreadyBound(RemoteId),
    /// The row no longer exists locally.
    Missing,
}

/// The only writer of entity identities.
///
/// Binding is idempotent: once a row carries an identity every later bind is
/// a no-op, so a stray second insert can never rebind a row.
#[derive(Clone, Debug)]
pub struct IdentityBinder {
    state: StateStore,
}

impl IdentityBinder {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    pub fn bind(&self, target: EntityRef, identity: RemoteId) -> BindOutcome {
        let outcome = self.state.set_identity(target, identity);
        match outcome {
            BindOutcome::Bound => {
                tracing::debug!(%target, %identity, "bound remote identity");
            }
            BindOutcome::AlreadyBound(existing) => {
                tracing::warn!(
                    %target,
                    %existing,
                    discarded = %identity,
                    "row already bound, ignoring identity"
                );
            }
            BindOutcome::Missing => {
                tracing::warn!(%target, %identity, "row vanished before binding");
            }
        }
        outcome
    }
}
