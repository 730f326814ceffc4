//! # Sync Pipeline
//!
//! The [`MutationProcessor`] every actor queue runs: reconcile, validate,
//! record. A diagnostic record is appended for every resolved mutation,
//! successful or not. Audit failures are logged and never fail the mutation.

use async_trait::async_trait;
use parking_lot::RwLock;
use reliquary_economy::{ActorId, Catalog};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audit::AuditSink;
use crate::diagnostics::{
    ActionDetails, CollectionSummary, DiagnosticRecord, DiagnosticValidator, ValidationStatus,
    Verdict,
};
use crate::error::{SyncError, SyncResult};
use crate::queue::{MutationProcessor, QueuedMutation, SyncReceipt};
use crate::reconciler::Reconciler;

/// Reconciler + validator + audit sink.
pub struct SyncPipeline {
    reconciler: Reconciler,
    validator: DiagnosticValidator,
    audit: Arc<dyn AuditSink>,
    catalog: RwLock<Option<Arc<Catalog>>>,
    sequence: AtomicU64,
}

impl SyncPipeline {
    /// Creates a pipeline. Record sequences continue from what `audit` already holds.
    #[must_use]
    pub fn new(reconciler: Reconciler, validator: DiagnosticValidator, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            reconciler,
            validator,
            sequence: AtomicU64::new(audit.resume_sequence()),
            audit,
            catalog: RwLock::new(None),
        }
    }

    /// Catalog used to count cards per tier in diagnostic summaries.
    pub fn set_catalog(&self, catalog: Arc<Catalog>) {
        *self.catalog.write() = Some(catalog);
    }

    /// Validates, stamps and appends one record. Returns its sequence and verdict.
    fn record(
        &self,
        actor: &ActorId,
        before: CollectionSummary,
        after: CollectionSummary,
        details: ActionDetails,
    ) -> (u64, Verdict) {
        let verdict = self.validator.validate(&before, &after, &details);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        match verdict.status {
            ValidationStatus::Ok => {}
            ValidationStatus::Warning => {
                warn!(actor = %actor, outcome = %details.outcome, notes = %verdict.notes, "diagnostic warning");
            }
            ValidationStatus::Error => {
                error!(actor = %actor, outcome = %details.outcome, notes = %verdict.notes, "diagnostic error");
            }
        }

        let record = DiagnosticRecord::new(sequence, actor.clone(), before, after, details, verdict.clone());
        if let Err(e) = self.audit.append(&record) {
            error!(actor = %actor, sequence, error = %e, "failed to append diagnostic record");
        }
        (sequence, verdict)
    }
}

#[async_trait]
impl MutationProcessor for SyncPipeline {
    async fn process(&self, job: &QueuedMutation) -> SyncResult<SyncReceipt> {
        let actor = &job.mutation.actor_id;
        let catalog = self.catalog.read().clone();

        match self.reconciler.reconcile(actor, &job.mutation, catalog.as_deref()).await {
            Ok(reconciliation) => {
                let latency_ms = u64::try_from(reconciliation.latency.as_millis()).unwrap_or(u64::MAX);
                let mut details = job.details.clone();
                details.response_time_ms = Some(latency_ms);

                let before = CollectionSummary::of(&reconciliation.before, catalog.as_deref());
                let after = CollectionSummary::of(&reconciliation.after, catalog.as_deref());
                let (record_sequence, verdict) = self.record(actor, before, after, details);

                info!(
                    actor = %actor,
                    outcome = %job.mutation.outcome,
                    latency_ms,
                    currency = reconciliation.after.currency,
                    status = %verdict.status,
                    "collection synced"
                );

                Ok(SyncReceipt {
                    actor_id: actor.clone(),
                    record_sequence,
                    payload: reconciliation.payload,
                    remote: reconciliation.after,
                    verdict,
                    latency: reconciliation.latency,
                    clamped_fields: reconciliation.clamped_fields,
                })
            }
            Err(sync_error) => {
                self.record_failure(job, &sync_error);
                Err(sync_error)
            }
        }
    }

    fn record_failure(&self, job: &QueuedMutation, error: &SyncError) {
        let catalog = self.catalog.read().clone();
        let mut details = job.details.clone();
        details.sync_error = Some(error.to_string());
        let local = CollectionSummary::of(&job.local_before, catalog.as_deref());
        self.record(&job.mutation.actor_id, local.clone(), local, details);
    }
}
