//! # RELIQUARY Sync
//!
//! Keeps actor collections consistent with a merge-only remote store while
//! outcomes are produced faster than the store answers.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  Mutation   ┌──────────────┐  FIFO  ┌───────────────┐
//! │ SyncService   │ ──────────► │ ActorQueue   │ ─────► │ SyncPipeline  │
//! │ (generation,  │  + rollback │ (one worker  │        │ reconcile     │
//! │  LocalView)   │             │  per actor)  │        │ validate      │
//! └───────────────┘             └──────────────┘        │ audit         │
//!                                                       └───────┬───────┘
//!                                                               │ absolute
//!                                                               ▼ payload
//!                                                       ┌───────────────┐
//!                                                       │ RemoteStore   │
//!                                                       └───────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - At most one reconciliation in flight per actor; mutations of one actor
//!   reach the store in enqueue order
//! - Only absolute, clamped values are written; untouched cards and unknown
//!   fields are preserved by merge semantics
//! - Every remote call is bounded by a timeout
//! - Every resolved mutation leaves one diagnostic record
//! - A failed mutation hands back the pre-mutation local snapshot

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod audit;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod local;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod reconciler;
pub mod service;
pub mod store;

pub use audit::{AuditLog, AuditSink, MemoryAuditSink};
pub use config::{ReliquaryConfig, SyncConfig};
pub use diagnostics::{
    ActionDetails, CollectionSummary, DiagnosticRecord, DiagnosticValidator, ValidationStatus,
    Verdict, ALL_PASSED,
};
pub use error::{SyncError, SyncFailure, SyncResult};
pub use local::LocalView;
pub use memory::{MemoryStore, WriteRecord};
pub use pipeline::SyncPipeline;
pub use queue::{
    ActorQueue, MutationProcessor, PendingSync, QueueStatus, QueuedMutation, SyncCommand,
    SyncReceipt,
};
pub use reconciler::{build_payload, Reconciler, Reconciliation};
pub use service::{resolve_failure_notice, FailureNotice, SyncService};
pub use store::{BuffSource, RemotePayload, RemoteStore, StoreError};
