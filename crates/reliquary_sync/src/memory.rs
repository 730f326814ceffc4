//! # In-Memory Store
//!
//! A [`RemoteStore`] and [`BuffSource`] backed by process memory, with fault
//! injection for exercising the failure paths:
//!
//! - fail the next N fetches or writes (transport errors)
//! - reject the next N writes (validation errors)
//! - artificial latency on every call
//! - an ordered log of every accepted write
//!
//! Locks are never held across an `.await`.

use async_trait::async_trait;
use parking_lot::Mutex;
use reliquary_economy::{ActorId, Buff, CardDefinition, Catalog, CollectionSnapshot};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::store::{BuffSource, RemotePayload, RemoteStore, StoreError};

/// One accepted write, in arrival order.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteRecord {
    /// Actor written.
    pub actor_id: ActorId,
    /// Payload as received.
    pub payload: RemotePayload,
}

#[derive(Debug, Default)]
struct FaultPlan {
    fail_fetches: u32,
    fail_writes: u32,
    reject_writes: u32,
    fail_catalog: bool,
    fail_resolution: bool,
}

/// Takes one pending fault, if any.
fn take(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<ActorId, CollectionSnapshot>,
    actors: HashMap<String, ActorId>,
    buffs: HashMap<ActorId, Vec<Buff>>,
    catalog: Vec<CardDefinition>,
    faults: FaultPlan,
    writes: Vec<WriteRecord>,
    fetches: u64,
}

/// In-memory remote store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Mutex<Duration>,
}

impl MemoryStore {
    /// Empty store with an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store serving the given catalog.
    #[must_use]
    pub fn with_catalog(catalog: &Catalog) -> Self {
        let store = Self::new();
        store.state.lock().catalog = catalog.cards().to_vec();
        store
    }

    /// Replaces an actor's record.
    pub fn seed_collection(&self, actor: &ActorId, snapshot: CollectionSnapshot) {
        self.state.lock().records.insert(actor.clone(), snapshot);
    }

    /// Current record of an actor (`None` if never written).
    #[must_use]
    pub fn collection(&self, actor: &ActorId) -> Option<CollectionSnapshot> {
        self.state.lock().records.get(actor).cloned()
    }

    /// Adds a buff to an actor.
    pub fn grant_buff(&self, actor: &ActorId, buff: Buff) {
        self.state.lock().buffs.entry(actor.clone()).or_default().push(buff);
    }

    /// Delay applied before every call completes.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// The next `count` fetches fail with a transport error.
    pub fn fail_next_fetches(&self, count: u32) {
        self.state.lock().faults.fail_fetches = count;
    }

    /// The next `count` writes fail with a transport error.
    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().faults.fail_writes = count;
    }

    /// The next `count` writes are rejected by validation.
    pub fn reject_next_writes(&self, count: u32) {
        self.state.lock().faults.reject_writes = count;
    }

    /// Makes catalog fetches fail until reset.
    pub fn set_catalog_unavailable(&self, unavailable: bool) {
        self.state.lock().faults.fail_catalog = unavailable;
    }

    /// Makes actor resolution fail until reset.
    pub fn set_resolution_unavailable(&self, unavailable: bool) {
        self.state.lock().faults.fail_resolution = unavailable;
    }

    /// Every accepted write, in arrival order.
    #[must_use]
    pub fn write_log(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// Number of collection fetches served (failed ones included).
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.state.lock().fetches
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch_collection(&self, actor: &ActorId) -> Result<Option<CollectionSnapshot>, StoreError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.fetches += 1;
        if take(&mut state.faults.fail_fetches) {
            return Err(StoreError::Unavailable("injected fetch failure".to_string()));
        }
        Ok(state.records.get(actor).cloned())
    }

    async fn upsert_collection(&self, actor: &ActorId, payload: &RemotePayload) -> Result<(), StoreError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        if take(&mut state.faults.fail_writes) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        if take(&mut state.faults.reject_writes) {
            return Err(StoreError::Rejected("injected validation failure".to_string()));
        }
        payload.merge_into(state.records.entry(actor.clone()).or_default());
        state.writes.push(WriteRecord {
            actor_id: actor.clone(),
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn fetch_catalog(&self) -> Result<Vec<CardDefinition>, StoreError> {
        self.simulate_latency().await;
        let state = self.state.lock();
        if state.faults.fail_catalog {
            return Err(StoreError::Unavailable("catalog offline".to_string()));
        }
        Ok(state.catalog.clone())
    }

    async fn get_or_create_actor(&self, display_name: &str) -> Result<ActorId, StoreError> {
        self.simulate_latency().await;
        let key = display_name.trim().to_lowercase();
        if key.is_empty() {
            return Err(StoreError::Rejected("display name is empty".to_string()));
        }
        let mut state = self.state.lock();
        if state.faults.fail_resolution {
            return Err(StoreError::Unavailable("actor directory offline".to_string()));
        }
        Ok(state
            .actors
            .entry(key.clone())
            .or_insert_with(|| ActorId::new(key))
            .clone())
    }
}

#[async_trait]
impl BuffSource for MemoryStore {
    async fn active_buffs(&self, actor: &ActorId) -> Result<Vec<Buff>, StoreError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        let state = self.state.lock();
        Ok(state
            .buffs
            .get(actor)
            .map(|buffs| buffs.iter().filter(|buff| buff.is_active_at(now)).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reliquary_economy::CardEntry;

    #[tokio::test]
    async fn test_unknown_actor_has_no_record() {
        let store = MemoryStore::new();
        let actor = ActorId::new("ghost");
        assert_eq!(store.fetch_collection(&actor).await, Ok(None));
    }

    #[tokio::test]
    async fn test_faults_are_consumed_in_order() {
        let store = MemoryStore::new();
        let actor = ActorId::new("alice");
        let payload = RemotePayload { currency: 4, ..RemotePayload::default() };

        store.fail_next_writes(1);
        store.reject_next_writes(1);

        assert!(matches!(
            store.upsert_collection(&actor, &payload).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.upsert_collection(&actor, &payload).await,
            Err(StoreError::Rejected(_))
        ));
        assert_eq!(store.upsert_collection(&actor, &payload).await, Ok(()));
        assert_eq!(store.write_log().len(), 1);
        assert_eq!(store.collection(&actor).map(|c| c.currency), Some(4));
    }

    #[tokio::test]
    async fn test_actor_names_are_case_insensitive() {
        let store = MemoryStore::new();
        let first = store.get_or_create_actor("Alice").await.expect("created");
        let second = store.get_or_create_actor("  alice ").await.expect("found");
        assert_eq!(first, second);
        assert!(store.get_or_create_actor("   ").await.is_err());
    }

    #[tokio::test]
    async fn test_expired_buffs_are_filtered() {
        let store = MemoryStore::new();
        let actor = ActorId::new("buffed");
        store.grant_buff(&actor, Buff::foil_boost(0.1, 0));
        store.grant_buff(&actor, Buff::foil_boost(0.2, u64::MAX));

        let buffs = store.active_buffs(&actor).await.expect("in memory");
        assert_eq!(buffs.len(), 1);
        assert!((buffs[0].magnitude - 0.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_write_creates_record() {
        let store = MemoryStore::new();
        let actor = ActorId::new("new");
        let mut payload = RemotePayload::default();
        payload.cards.insert("a".to_string(), CardEntry::with_counts(1, 0));
        store.upsert_collection(&actor, &payload).await.expect("accepted");
        assert_eq!(store.collection(&actor).map(|c| c.normal("a")), Some(1));
    }
}
