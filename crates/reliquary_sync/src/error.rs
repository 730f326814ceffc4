//! # Sync Error Types
//!
//! Errors raised while resolving actors, talking to the remote store, or
//! running the per-actor queues.

use reliquary_economy::{CollectionSnapshot, EconomyError};
use thiserror::Error;

/// Errors that can occur in the sync pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The remote store could not map a display name to an actor.
    #[error("could not resolve actor '{name}': {reason}")]
    ActorResolutionFailure {
        /// Display name that was looked up.
        name: String,
        /// Store-side reason.
        reason: String,
    },

    /// Reading the remote collection failed or timed out. Nothing was written.
    #[error("remote fetch failed: {reason}")]
    RemoteFetchFailure {
        /// Transport-level reason.
        reason: String,
    },

    /// Writing the payload failed or timed out.
    #[error("remote write failed: {reason}")]
    RemoteWriteFailure {
        /// Transport-level reason.
        reason: String,
    },

    /// The store refused the payload (validation). Retrying will not help.
    #[error("remote store rejected the write: {reason}")]
    RemoteRejected {
        /// Store-side reason.
        reason: String,
    },

    /// The actor's queue is at its configured depth.
    #[error("queue full: {depth} mutations already pending")]
    QueueFull {
        /// Configured depth.
        depth: usize,
    },

    /// The catalog could not be loaded from the remote store.
    #[error("card catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The mutation was still pending when its queue was cleared.
    #[error("mutation cancelled before reaching the remote store")]
    Cancelled,

    /// The worker stopped before reporting a result.
    #[error("queue worker stopped before completing the mutation")]
    WorkerStopped,

    /// No async runtime was available to spawn the queue worker.
    #[error("no async runtime available for the queue worker")]
    RuntimeUnavailable,

    /// Economy rule violation (empty catalog, missing target...).
    #[error(transparent)]
    Economy(#[from] EconomyError),

    /// Audit sink failure.
    #[error("audit sink error: {0}")]
    Audit(String),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Transport failures and a full queue may succeed later; everything else
    /// will fail the same way again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RemoteFetchFailure { .. } | Self::RemoteWriteFailure { .. } | Self::QueueFull { .. }
        )
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A mutation that did not reach the remote store.
///
/// Carries the local snapshot captured before the optimistic update so the
/// caller can revert its view.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct SyncFailure {
    /// Why the mutation failed.
    #[source]
    pub error: SyncError,
    /// Local view before the optimistic update.
    pub rollback: CollectionSnapshot,
}
