//! # Optimistic Local View
//!
//! The caller-side copy of a collection. Mutations are applied here first so
//! the result can be shown immediately; the matching [`SyncCommand`] carries
//! the pre-mutation snapshot so a failed sync can put the view back.

use reliquary_economy::{ActorId, CollectionSnapshot, Mutation};

use crate::diagnostics::ActionDetails;
use crate::error::SyncFailure;
use crate::queue::SyncCommand;

/// An actor's optimistic collection.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalView {
    actor_id: ActorId,
    snapshot: CollectionSnapshot,
}

impl LocalView {
    /// View seeded from a (usually remote) snapshot.
    #[must_use]
    pub fn new(actor_id: ActorId, snapshot: CollectionSnapshot) -> Self {
        Self { actor_id, snapshot }
    }

    /// Owner.
    #[must_use]
    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    /// Current optimistic state.
    #[must_use]
    pub fn snapshot(&self) -> &CollectionSnapshot {
        &self.snapshot
    }

    /// Applies a mutation optimistically and returns the command to enqueue.
    #[must_use]
    pub fn apply(&mut self, mutation: Mutation, details: ActionDetails) -> SyncCommand {
        let rollback = self.snapshot.clone();
        self.snapshot.apply_mutation(&mutation);
        SyncCommand {
            mutation,
            rollback,
            details,
        }
    }

    /// Restores the snapshot carried by a failure.
    ///
    /// Later optimistic updates still in flight are reverted too; refresh from
    /// the remote record once the queue drains if that matters.
    pub fn rollback(&mut self, failure: &SyncFailure) {
        self.snapshot = failure.rollback.clone();
    }

    /// Replaces the view with a fresh remote snapshot.
    pub fn refresh(&mut self, snapshot: CollectionSnapshot) {
        self.snapshot = snapshot;
    }
}
