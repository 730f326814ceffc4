//! # Per-Actor Mutation Queue
//!
//! **Strict FIFO, one reconciliation in flight per actor**
//!
//! ```text
//!            enqueue ──► [ m3 | m2 ] ──► worker ──► processor.process(m1)
//!                          pending        (one task, exits when empty)
//! ```
//!
//! Each actor gets its own queue. A `parking_lot` mutex guards the pending
//! list together with the `processing` flag, so concurrent `enqueue` calls are
//! totally ordered by the lock and at most one worker task exists per actor.
//! The worker is spawned on the first enqueue into an idle queue and exits
//! when the queue runs dry. Different actors never wait on each other.
//!
//! `enqueue` reserves the FIFO slot synchronously and returns a
//! [`PendingSync`] future resolving once that mutation has been reconciled.
//! The rollback snapshot stays with the future: whatever happens to the
//! worker, a failure always hands it back.
//!
//! A worker that unwinds (a panicking processor, or a runtime shutting down
//! under it) fails the in-flight and pending mutations with
//! [`SyncError::WorkerStopped`] and leaves the queue idle, so the next
//! enqueue starts a fresh worker.

use async_trait::async_trait;
use parking_lot::Mutex;
use reliquary_economy::{ActorId, CollectionSnapshot, Mutation};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, warn};

use crate::diagnostics::{ActionDetails, Verdict};
use crate::error::{SyncError, SyncFailure, SyncResult};
use crate::store::RemotePayload;

/// A mutation ready to enqueue, with the local state to restore if it fails.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncCommand {
    /// Deltas to reconcile.
    pub mutation: Mutation,
    /// Local snapshot from before the optimistic update.
    pub rollback: CollectionSnapshot,
    /// Context for the diagnostic record.
    pub details: ActionDetails,
}

impl SyncCommand {
    /// Command with details derived from the mutation's outcome.
    #[must_use]
    pub fn new(mutation: Mutation, rollback: CollectionSnapshot) -> Self {
        let details = ActionDetails::new(mutation.outcome);
        Self {
            mutation,
            rollback,
            details,
        }
    }

    /// Builder: replaces the action details.
    #[must_use]
    pub fn with_details(mut self, details: ActionDetails) -> Self {
        self.details = details;
        self
    }
}

/// What the worker hands to the processor.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedMutation {
    /// Deltas to reconcile.
    pub mutation: Mutation,
    /// Context for the diagnostic record.
    pub details: ActionDetails,
    /// Local state before the optimistic update.
    pub local_before: CollectionSnapshot,
    /// When the mutation entered the queue.
    pub enqueued_at: Instant,
}

/// A mutation that reached the remote store.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncReceipt {
    /// Actor written.
    pub actor_id: ActorId,
    /// Sequence of the diagnostic record.
    pub record_sequence: u64,
    /// What was written.
    pub payload: RemotePayload,
    /// Remote record after the write.
    pub remote: CollectionSnapshot,
    /// Diagnostic verdict.
    pub verdict: Verdict,
    /// Remote round-trip time.
    pub latency: Duration,
    /// Fields clamped at zero.
    pub clamped_fields: usize,
}

/// Does the actual work for one dequeued mutation.
#[async_trait]
pub trait MutationProcessor: Send + Sync {
    /// Reconciles one mutation. Never called concurrently for one actor.
    async fn process(&self, job: &QueuedMutation) -> SyncResult<SyncReceipt>;

    /// Called for a mutation the queue resolved without processing it:
    /// cancelled by [`ActorQueue::clear`] or abandoned by a stopped worker.
    fn record_failure(&self, _job: &QueuedMutation, _error: &SyncError) {}
}

struct Job {
    queued: QueuedMutation,
    reply: oneshot::Sender<SyncResult<SyncReceipt>>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    processing: bool,
    processed: u64,
    failed: u64,
}

/// Snapshot of a queue's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStatus {
    /// Mutations waiting (the in-flight one excluded).
    pub pending: usize,
    /// Whether a worker is running.
    pub processing: bool,
    /// Mutations that reached the store.
    pub processed: u64,
    /// Mutations that failed, cancelled ones included.
    pub failed: u64,
}

/// FIFO of one actor's mutations.
pub struct ActorQueue {
    actor_id: ActorId,
    processor: Arc<dyn MutationProcessor>,
    max_depth: Option<usize>,
    state: Mutex<QueueState>,
    idle: Notify,
}

impl ActorQueue {
    /// Creates an idle queue. `max_depth` bounds the pending list.
    #[must_use]
    pub fn new(
        actor_id: ActorId,
        processor: Arc<dyn MutationProcessor>,
        max_depth: Option<usize>,
    ) -> Arc<Self> {
        Arc::new(Self {
            actor_id,
            processor,
            max_depth,
            state: Mutex::new(QueueState::default()),
            idle: Notify::new(),
        })
    }

    /// Owner of the queue.
    #[must_use]
    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    /// Appends a command to the tail and makes sure a worker is running.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails immediately, handing the rollback snapshot back, with
    /// [`SyncError::QueueFull`] when the bounded queue is at depth, or
    /// [`SyncError::RuntimeUnavailable`] outside a runtime.
    pub fn enqueue(self: &Arc<Self>, command: SyncCommand) -> Result<PendingSync, SyncFailure> {
        let SyncCommand {
            mutation,
            rollback,
            details,
        } = command;

        let Ok(runtime) = Handle::try_current() else {
            return Err(SyncFailure {
                error: SyncError::RuntimeUnavailable,
                rollback,
            });
        };

        let (reply, receiver) = oneshot::channel();
        let spawn_worker = {
            let mut state = self.state.lock();
            if let Some(depth) = self.max_depth {
                if state.pending.len() >= depth {
                    drop(state);
                    warn!(actor = %self.actor_id, depth, "queue full, rejecting mutation");
                    return Err(SyncFailure {
                        error: SyncError::QueueFull { depth },
                        rollback,
                    });
                }
            }

            state.pending.push_back(Job {
                queued: QueuedMutation {
                    mutation,
                    details,
                    local_before: rollback.clone(),
                    enqueued_at: Instant::now(),
                },
                reply,
            });
            debug!(
                actor = %self.actor_id,
                queue_depth = state.pending.len(),
                processing = state.processing,
                "mutation enqueued"
            );

            let idle = !state.processing;
            state.processing = true;
            idle
        };

        if spawn_worker {
            runtime.spawn(Arc::clone(self).run());
        }

        Ok(PendingSync {
            receiver,
            rollback: Some(rollback),
        })
    }

    /// Current counters.
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let state = self.state.lock();
        QueueStatus {
            pending: state.pending.len(),
            processing: state.processing,
            processed: state.processed,
            failed: state.failed,
        }
    }

    /// True when nothing is pending or in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        !state.processing && state.pending.is_empty()
    }

    /// Resolves once the queue is idle.
    pub async fn drain(&self) {
        loop {
            let notified = self.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Cancels every pending mutation. The in-flight one, if any, completes.
    /// Each cancelled mutation counts as failed and is reported to the
    /// processor's [`MutationProcessor::record_failure`].
    ///
    /// Returns how many mutations were cancelled.
    pub fn clear(&self) -> usize {
        let cancelled: Vec<Job> = {
            let mut state = self.state.lock();
            let cancelled: Vec<Job> = state.pending.drain(..).collect();
            state.failed += cancelled.len() as u64;
            cancelled
        };
        let count = cancelled.len();
        for job in cancelled {
            self.processor.record_failure(&job.queued, &SyncError::Cancelled);
            let _ = job.reply.send(Err(SyncError::Cancelled));
        }
        if count > 0 {
            warn!(actor = %self.actor_id, cancelled = count, "queue cleared");
        }
        count
    }

    /// Worker loop: drains the FIFO one mutation at a time.
    async fn run(self: Arc<Self>) {
        let mut guard = WorkerGuard {
            queue: Arc::clone(&self),
            in_flight: None,
            finished: false,
        };
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.pending.pop_front();
                if next.is_none() {
                    state.processing = false;
                }
                next
            };
            let Some(job) = next else {
                guard.finished = true;
                self.idle.notify_waiters();
                return;
            };

            let waited = job.queued.enqueued_at.elapsed();
            guard.in_flight = Some(job.queued.clone());
            let result = self.processor.process(&job.queued).await;
            guard.in_flight = None;

            {
                let mut state = self.state.lock();
                if result.is_ok() {
                    state.processed += 1;
                } else {
                    state.failed += 1;
                }
            }

            match &result {
                Ok(receipt) => debug!(
                    actor = %self.actor_id,
                    outcome = %job.queued.mutation.outcome,
                    queued_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                    status = %receipt.verdict.status,
                    "mutation synced"
                ),
                Err(error) => warn!(
                    actor = %self.actor_id,
                    outcome = %job.queued.mutation.outcome,
                    retryable = error.is_retryable(),
                    error = %error,
                    "mutation failed"
                ),
            }

            // The caller may have dropped its future; the write still happened.
            let _ = job.reply.send(result);
        }
    }
}

/// Resets the queue when a worker stops before running dry.
struct WorkerGuard {
    queue: Arc<ActorQueue>,
    in_flight: Option<QueuedMutation>,
    finished: bool,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let abandoned: Vec<Job> = {
            let mut state = self.queue.state.lock();
            state.processing = false;
            let abandoned: Vec<Job> = state.pending.drain(..).collect();
            state.failed += abandoned.len() as u64 + u64::from(self.in_flight.is_some());
            abandoned
        };
        error!(
            actor = %self.queue.actor_id,
            in_flight = self.in_flight.is_some(),
            pending = abandoned.len(),
            "queue worker stopped unexpectedly"
        );

        // The in-flight reply sender is already gone with the worker's stack.
        let processor = &self.queue.processor;
        if let Some(job) = self.in_flight.take() {
            processor.record_failure(&job, &SyncError::WorkerStopped);
        }
        for job in abandoned {
            processor.record_failure(&job.queued, &SyncError::WorkerStopped);
            let _ = job.reply.send(Err(SyncError::WorkerStopped));
        }
        self.queue.idle.notify_waiters();
    }
}

/// Completion of one enqueued mutation.
///
/// Resolves to the receipt, or to a [`SyncFailure`] carrying the rollback
/// snapshot captured at enqueue time.
#[derive(Debug)]
#[must_use = "a pending sync reports failures only when awaited"]
pub struct PendingSync {
    receiver: oneshot::Receiver<SyncResult<SyncReceipt>>,
    rollback: Option<CollectionSnapshot>,
}

impl Future for PendingSync {
    type Output = Result<SyncReceipt, SyncFailure>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = ready!(Pin::new(&mut self.receiver).poll(cx))
            .unwrap_or(Err(SyncError::WorkerStopped));

        Poll::Ready(result.map_err(|error| SyncFailure {
            error,
            rollback: self.rollback.take().unwrap_or_default(),
        }))
    }
}
