//! # Collection Reconciler
//!
//! Turns a relative [`Mutation`] into an absolute [`RemotePayload`] against
//! the freshest remote record, then writes it.
//!
//! ```text
//! fetch(actor) ──► remote (None = empty record)
//!                    │
//!   for each touched card:  new = max(0, remote + delta)   (normal, foil)
//!   currency:               new = max(0, remote + delta)
//!                    │
//! upsert(actor, payload{touched cards, currency})
//! ```
//!
//! The payload carries the full entry of every touched card, so fields this
//! engine does not own survive the merge. Clamping is never skipped.
//!
//! Safety relies on the caller: only one reconciliation per actor may be in
//! flight, otherwise two fetch-then-write cycles can interleave and lose an
//! update. The per-actor queue guarantees it.

use reliquary_economy::{
    clamped_add, ActorId, CardDefinition, CardEntry, Catalog, CollectionSnapshot, Mutation,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::store::{RemotePayload, RemoteStore, StoreError};

/// Result of one successful reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciliation {
    /// Remote record before the write.
    pub before: CollectionSnapshot,
    /// Remote record with the payload merged.
    pub after: CollectionSnapshot,
    /// What was written.
    pub payload: RemotePayload,
    /// Fields whose raw value would have gone negative.
    pub clamped_fields: usize,
    /// Time spent on the remote round-trips (fetch plus write).
    pub latency: Duration,
}

/// Persisted per-card field mirroring `normal + foil`.
const QUANTITY_FIELD: &str = "quantity";

/// Computes the absolute payload for `mutation` against `remote`.
///
/// A card missing from the remote record is written with its catalog `name`
/// and `tier` when `catalog` knows it. A persisted `quantity` field is kept
/// equal to `normal + foil`.
///
/// Returns the payload and the number of clamped fields.
#[must_use]
pub fn build_payload(
    remote: &CollectionSnapshot,
    mutation: &Mutation,
    catalog: Option<&Catalog>,
) -> (RemotePayload, usize) {
    let mut payload = RemotePayload::default();
    let mut clamped = 0;

    for (card_id, delta) in &mutation.card_deltas {
        let mut entry = match remote.entry(card_id) {
            Some(entry) => entry.clone(),
            None => new_entry(catalog.and_then(|catalog| catalog.get(card_id))),
        };
        clamped += entry.apply_delta(*delta);
        if let Some(quantity) = entry.extra.get_mut(QUANTITY_FIELD) {
            *quantity = serde_json::Value::from(entry.normal.saturating_add(entry.foil));
        }
        payload.cards.insert(card_id.clone(), entry);
    }

    let (currency, currency_clamped) = clamped_add(remote.currency, mutation.currency_delta);
    payload.currency = currency;
    clamped += usize::from(currency_clamped);

    (payload, clamped)
}

/// Empty entry for a card the actor never held, seeded from its definition.
fn new_entry(definition: Option<&CardDefinition>) -> CardEntry {
    let mut entry = CardEntry::default();
    if let Some(definition) = definition {
        if let Some(name) = &definition.name {
            entry.extra.insert("name".to_string(), serde_json::Value::from(name.as_str()));
        }
        entry
            .extra
            .insert("tier".to_string(), serde_json::Value::from(definition.tier.as_str()));
        entry.extra.insert(QUANTITY_FIELD.to_string(), serde_json::Value::from(0u32));
    }
    entry
}

/// Fetch-compute-write against a [`RemoteStore`], with a bounded timeout on
/// every call.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl Reconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Timeout applied to each remote call.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Reconciles one mutation. Must not run concurrently for the same actor.
    ///
    /// `catalog` fills in definitions for cards new to the record.
    ///
    /// # Errors
    ///
    /// - [`SyncError::RemoteFetchFailure`] when the read fails or times out
    ///   (nothing was written)
    /// - [`SyncError::RemoteWriteFailure`] when the write fails or times out
    /// - [`SyncError::RemoteRejected`] when the store refuses the payload
    pub async fn reconcile(
        &self,
        actor: &ActorId,
        mutation: &Mutation,
        catalog: Option<&Catalog>,
    ) -> SyncResult<Reconciliation> {
        let started = Instant::now();

        let before = bounded(self.timeout, self.store.fetch_collection(actor))
            .await
            .map_err(|error| match error {
                StoreError::Rejected(reason) => SyncError::RemoteRejected { reason },
                StoreError::Unavailable(reason) => SyncError::RemoteFetchFailure { reason },
            })?
            .unwrap_or_default();

        let (payload, clamped_fields) = build_payload(&before, mutation, catalog);
        if clamped_fields > 0 {
            warn!(
                actor = %actor,
                outcome = %mutation.outcome,
                clamped_fields,
                "delta would go negative against remote record, clamped at zero"
            );
        }

        bounded(self.timeout, self.store.upsert_collection(actor, &payload))
            .await
            .map_err(|error| match error {
                StoreError::Rejected(reason) => SyncError::RemoteRejected { reason },
                StoreError::Unavailable(reason) => SyncError::RemoteWriteFailure { reason },
            })?;

        let latency = started.elapsed();
        let mut after = before.clone();
        payload.merge_into(&mut after);

        debug!(
            actor = %actor,
            outcome = %mutation.outcome,
            cards = payload.len(),
            currency = payload.currency,
            latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            "reconciled"
        );

        Ok(Reconciliation {
            before,
            after,
            payload,
            clamped_fields,
            latency,
        })
    }
}

/// Runs a store call under a timeout. Expiry is a transport failure.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "timed out after {}ms",
            limit.as_millis()
        ))),
    }
}
