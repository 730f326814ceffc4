//! # Sync Service
//!
//! Entry point for outcome producers. Owns the registry of per-actor queues,
//! the cached catalog, the service RNG and the shared pipeline. Construct it
//! once and share it by `Arc`.
//!
//! ```rust,ignore
//! let service = SyncService::new(config, store.clone(), store, audit)?;
//! let alice = service.resolve_actor("Alice").await?;
//! let mut view = service.load_view(&alice).await?;
//!
//! let outcome = service.roll_corruption(&alice, &target).await?;
//! let pending = service.apply(&mut view, &outcome, Some(&target))?;
//! if let Err(failure) = pending.await {
//!     view.rollback(&failure);
//! }
//! ```

use parking_lot::{Mutex, RwLock};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use reliquary_economy::{
    apply_outcome, pick_transform_target, ActorId, Buff, Catalog, CollectionSnapshot,
    DropGenerator, Outcome, OutcomeKind, Target,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::AuditSink;
use crate::config::{ReliquaryConfig, SyncConfig};
use crate::diagnostics::{ActionDetails, DiagnosticValidator};
use crate::error::{SyncError, SyncFailure, SyncResult};
use crate::local::LocalView;
use crate::pipeline::SyncPipeline;
use crate::queue::{ActorQueue, MutationProcessor, PendingSync, QueueStatus, SyncCommand};
use crate::reconciler::Reconciler;
use crate::store::{BuffSource, RemoteStore, StoreError};

/// What the caller should tell the user after a failed sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureNotice {
    /// Offer another try; the rendered outcome stays visible.
    Retry {
        /// Attempts made so far.
        attempt: u32,
        /// Attempts left before giving up.
        remaining: u32,
    },
    /// Give up and show the final failure notice.
    SyncFailed,
}

/// Decides between a retry prompt and the final failure notice.
///
/// Non-retryable errors fail at once; retryable ones allow up to
/// `max_user_retries` attempts.
#[must_use]
pub const fn resolve_failure_notice(
    error: &SyncError,
    attempts: u32,
    max_user_retries: u32,
) -> FailureNotice {
    if !error.is_retryable() || attempts >= max_user_retries {
        FailureNotice::SyncFailed
    } else {
        FailureNotice::Retry {
            attempt: attempts,
            remaining: max_user_retries - attempts,
        }
    }
}

/// Registry of actor queues plus the generation entry points.
pub struct SyncService {
    config: SyncConfig,
    generator: DropGenerator,
    store: Arc<dyn RemoteStore>,
    buffs: Arc<dyn BuffSource>,
    pipeline: Arc<SyncPipeline>,
    queues: Mutex<HashMap<ActorId, Arc<ActorQueue>>>,
    catalog: RwLock<Option<Arc<Catalog>>>,
    rng: Mutex<ChaCha8Rng>,
}

impl SyncService {
    /// Creates a service.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidConfig`] or [`SyncError::Economy`] for an invalid config.
    pub fn new(
        config: ReliquaryConfig,
        store: Arc<dyn RemoteStore>,
        buffs: Arc<dyn BuffSource>,
        audit: Arc<dyn AuditSink>,
    ) -> SyncResult<Self> {
        config.economy.validate()?;
        config.sync.validate()?;

        let reconciler = Reconciler::new(Arc::clone(&store), config.sync.remote_timeout());
        let validator = DiagnosticValidator::new(config.sync.slow_response_ms);
        let pipeline = Arc::new(SyncPipeline::new(reconciler, validator, audit));

        Ok(Self {
            config: config.sync,
            generator: DropGenerator::new(config.economy),
            store,
            buffs,
            pipeline,
            queues: Mutex::new(HashMap::new()),
            catalog: RwLock::new(None),
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        })
    }

    /// Builder: reseeds the service RNG for reproducible runs.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Pipeline settings.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Maps a display name to an actor, creating it on first contact.
    ///
    /// # Errors
    ///
    /// [`SyncError::ActorResolutionFailure`] when the store fails or times out.
    pub async fn resolve_actor(&self, display_name: &str) -> SyncResult<ActorId> {
        let timeout = self.config.remote_timeout();
        let result = tokio::time::timeout(timeout, self.store.get_or_create_actor(display_name)).await;
        match result {
            Ok(Ok(actor)) => Ok(actor),
            Ok(Err(StoreError::Unavailable(reason) | StoreError::Rejected(reason))) => {
                Err(SyncError::ActorResolutionFailure { name: display_name.to_string(), reason })
            }
            Err(_) => Err(SyncError::ActorResolutionFailure {
                name: display_name.to_string(),
                reason: format!("timed out after {}ms", timeout.as_millis()),
            }),
        }
    }

    /// The catalog, fetched on first use and cached afterwards.
    ///
    /// # Errors
    ///
    /// As [`SyncService::refresh_catalog`] while nothing is cached.
    pub async fn catalog(&self) -> SyncResult<Arc<Catalog>> {
        if let Some(catalog) = self.catalog.read().clone() {
            return Ok(catalog);
        }
        self.refresh_catalog().await
    }

    /// Fetches the catalog again and replaces the cached one.
    ///
    /// # Errors
    ///
    /// [`SyncError::CatalogUnavailable`] when the store fails or times out.
    /// The cached catalog is kept.
    pub async fn refresh_catalog(&self) -> SyncResult<Arc<Catalog>> {
        let timeout = self.config.remote_timeout();
        let cards = match tokio::time::timeout(timeout, self.store.fetch_catalog()).await {
            Ok(Ok(cards)) => cards,
            Ok(Err(e)) => return Err(SyncError::CatalogUnavailable(e.to_string())),
            Err(_) => {
                return Err(SyncError::CatalogUnavailable(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        };

        let catalog = Arc::new(Catalog::new(cards));
        info!(cards = catalog.len(), "catalog loaded");
        *self.catalog.write() = Some(Arc::clone(&catalog));
        self.pipeline.set_catalog(Arc::clone(&catalog));
        Ok(catalog)
    }

    /// Loads the remote record into a fresh optimistic view. Unknown actors
    /// start from the empty collection.
    ///
    /// # Errors
    ///
    /// [`SyncError::RemoteFetchFailure`] when the store fails or times out.
    pub async fn load_view(&self, actor: &ActorId) -> SyncResult<LocalView> {
        let timeout = self.config.remote_timeout();
        let snapshot = match tokio::time::timeout(timeout, self.store.fetch_collection(actor)).await {
            Ok(Ok(snapshot)) => snapshot.unwrap_or_default(),
            Ok(Err(e)) => return Err(SyncError::RemoteFetchFailure { reason: e.to_string() }),
            Err(_) => {
                return Err(SyncError::RemoteFetchFailure {
                    reason: format!("timed out after {}ms", timeout.as_millis()),
                })
            }
        };
        Ok(LocalView::new(actor.clone(), snapshot))
    }

    /// Active buffs of an actor. A failing buff source means no buffs.
    pub async fn active_buffs(&self, actor: &ActorId) -> Vec<Buff> {
        match tokio::time::timeout(self.config.remote_timeout(), self.buffs.active_buffs(actor)).await {
            Ok(Ok(buffs)) => buffs,
            Ok(Err(e)) => {
                warn!(actor = %actor, error = %e, "buff lookup failed, generating without buffs");
                Vec::new()
            }
            Err(_) => {
                warn!(actor = %actor, "buff lookup timed out, generating without buffs");
                Vec::new()
            }
        }
    }

    /// Draws and foil-rolls a booster for an actor.
    ///
    /// # Errors
    ///
    /// [`SyncError::CatalogUnavailable`], or [`SyncError::Economy`] wrapping
    /// `EmptyCatalog`.
    pub async fn open_booster(&self, actor: &ActorId) -> SyncResult<Outcome> {
        let catalog = self.catalog().await?;
        let buffs = self.active_buffs(actor).await;
        let picks = {
            let mut rng = self.rng.lock();
            self.generator.open_booster(&catalog, &buffs, &mut *rng)?
        };
        info!(actor = %actor, cards = picks.len(), foils = picks.iter().filter(|p| p.foil).count(), "booster opened");
        Ok(Outcome::Booster { picks })
    }

    /// Rolls a corruption outcome for the targeted copy.
    ///
    /// Foil copies use the foil table. A `transform` with no same-tier card to
    /// turn into becomes `nothing`.
    ///
    /// # Errors
    ///
    /// [`SyncError::CatalogUnavailable`], or [`SyncError::Economy`] wrapping
    /// `UnknownCard` when the target is not in the catalog.
    pub async fn roll_corruption(&self, actor: &ActorId, target: &Target) -> SyncResult<Outcome> {
        let catalog = self.catalog().await?;
        let source = catalog.require(&target.card_id)?.clone();
        let buffs = if target.foil {
            Vec::new()
        } else {
            self.active_buffs(actor).await
        };

        let outcome = {
            let mut rng = self.rng.lock();
            let kind = if target.foil {
                self.generator.roll_foil_corruption(&mut *rng)
            } else {
                self.generator.roll_corruption(&buffs, &mut *rng)
            };
            match kind {
                OutcomeKind::Foil => Outcome::Foil,
                OutcomeKind::Duplicate => Outcome::Duplicate,
                OutcomeKind::Destroyed => Outcome::Destroyed,
                OutcomeKind::LoseFoil => Outcome::LoseFoil,
                OutcomeKind::Transform => match pick_transform_target(&catalog, &source, &mut *rng) {
                    Some(card) => Outcome::Transform { into: card.id },
                    None => Outcome::Nothing,
                },
                OutcomeKind::Nothing | OutcomeKind::Booster { .. } | OutcomeKind::CurrencyGrant => {
                    Outcome::Nothing
                }
            }
        };

        info!(actor = %actor, card = %target.card_id, foil = target.foil, outcome = %outcome.kind(), "corruption rolled");
        Ok(outcome)
    }

    /// The default currency reward.
    #[must_use]
    pub fn currency_grant(&self) -> Outcome {
        Outcome::CurrencyGrant {
            amount: self.generator.config().currency_grant,
        }
    }

    /// Details for a diagnostic record, with the target's tier when known.
    fn details_for(&self, outcome: &Outcome, target: Option<&Target>) -> ActionDetails {
        let details = ActionDetails::new(outcome.kind());
        match target {
            Some(target) => {
                let tier = self
                    .catalog
                    .read()
                    .as_ref()
                    .and_then(|catalog| catalog.tier_of(&target.card_id));
                details.with_target(target.card_id.clone(), tier, target.foil)
            }
            None => details,
        }
    }

    /// Maps an outcome to a mutation, applies it to the view and enqueues it.
    ///
    /// # Errors
    ///
    /// Fails immediately, with the view untouched, when the outcome needs a
    /// target and none was given; otherwise as [`ActorQueue::enqueue`]. The
    /// failure's rollback snapshot is always the pre-mutation view.
    pub fn apply(
        &self,
        view: &mut LocalView,
        outcome: &Outcome,
        target: Option<&Target>,
    ) -> Result<PendingSync, SyncFailure> {
        let mutation = apply_outcome(view.actor_id(), outcome, target).map_err(|e| SyncFailure {
            error: e.into(),
            rollback: view.snapshot().clone(),
        })?;
        let command = view.apply(mutation, self.details_for(outcome, target));
        self.enqueue(command)
    }

    /// Routes a command to its actor's queue.
    ///
    /// # Errors
    ///
    /// See [`ActorQueue::enqueue`].
    pub fn enqueue(&self, command: SyncCommand) -> Result<PendingSync, SyncFailure> {
        self.queue_for(&command.mutation.actor_id).enqueue(command)
    }

    /// The queue of an actor, created on first use.
    #[must_use]
    pub fn queue_for(&self, actor: &ActorId) -> Arc<ActorQueue> {
        let mut queues = self.queues.lock();
        Arc::clone(queues.entry(actor.clone()).or_insert_with(|| {
            ActorQueue::new(
                actor.clone(),
                Arc::clone(&self.pipeline) as Arc<dyn MutationProcessor>,
                self.config.max_queue_depth,
            )
        }))
    }

    /// Counters of an actor's queue (all zero if it never had one).
    #[must_use]
    pub fn status(&self, actor: &ActorId) -> QueueStatus {
        self.queues
            .lock()
            .get(actor)
            .map(|queue| queue.status())
            .unwrap_or_default()
    }

    /// Resolves once every queue is idle.
    pub async fn drain(&self) {
        let queues: Vec<Arc<ActorQueue>> = self.queues.lock().values().cloned().collect();
        for queue in queues {
            queue.drain().await;
        }
    }

    /// Drops the queues of idle actors nobody else holds. Their counters are
    /// forgotten; the next mutation of such an actor gets a fresh queue.
    ///
    /// Returns how many queues were dropped.
    pub fn prune_idle(&self) -> usize {
        let mut queues = self.queues.lock();
        let before = queues.len();
        queues.retain(|_, queue| !(queue.is_idle() && Arc::strong_count(queue) == 1));
        let pruned = before - queues.len();
        if pruned > 0 {
            debug!(pruned, remaining = queues.len(), "idle actor queues pruned");
        }
        pruned
    }

    /// Number of actor queues currently registered.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.queues.lock().len()
    }

    /// Retry-or-give-up decision using the configured retry budget.
    #[must_use]
    pub fn failure_notice(&self, error: &SyncError, attempts: u32) -> FailureNotice {
        resolve_failure_notice(error, attempts, self.config.max_user_retries)
    }

    /// Convenience for tests and tools: the remote record of an actor.
    ///
    /// # Errors
    ///
    /// As [`SyncService::load_view`].
    pub async fn remote_snapshot(&self, actor: &ActorId) -> SyncResult<CollectionSnapshot> {
        Ok(self.load_view(actor).await?.snapshot().clone())
    }
}
