//! # Remote Store Ports
//!
//! The authoritative collection store only supports whole-record merge
//! writes: no atomic increment, no compare-and-swap. The only way to write
//! to it is a [`RemotePayload`] of absolute values, and only the reconciler
//! builds those.

use async_trait::async_trait;
use reliquary_economy::{ActorId, Buff, CardDefinition, CardEntry, CardId, CollectionSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Failure reported by a store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transport problem (connection, 5xx...). May succeed on retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The store validated the request and refused it.
    #[error("store rejected request: {0}")]
    Rejected(String),
}

/// Absolute values for the touched cards plus the new currency balance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotePayload {
    /// Full entries of the touched cards. Untouched cards are absent.
    pub cards: BTreeMap<CardId, CardEntry>,
    /// New currency balance.
    pub currency: u32,
}

impl RemotePayload {
    /// Merges the payload into a stored record the way the store does:
    /// counts are overwritten, extra fields are merged key by key, cards not
    /// in the payload are left alone.
    pub fn merge_into(&self, record: &mut CollectionSnapshot) {
        for (id, incoming) in &self.cards {
            let entry = record.cards.entry(id.clone()).or_default();
            entry.normal = incoming.normal;
            entry.foil = incoming.foil;
            for (key, value) in &incoming.extra {
                entry.extra.insert(key.clone(), value.clone());
            }
        }
        record.currency = self.currency;
    }

    /// Number of cards the payload writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// True when only the currency is written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

/// Authoritative collection store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Current record of an actor. `None` when the actor has never been written.
    async fn fetch_collection(&self, actor: &ActorId) -> Result<Option<CollectionSnapshot>, StoreError>;

    /// Merges a payload of absolute values into the actor's record.
    async fn upsert_collection(&self, actor: &ActorId, payload: &RemotePayload) -> Result<(), StoreError>;

    /// The card catalog, in draw order.
    async fn fetch_catalog(&self) -> Result<Vec<CardDefinition>, StoreError>;

    /// Resolves a display name to an actor, creating it on first contact.
    async fn get_or_create_actor(&self, display_name: &str) -> Result<ActorId, StoreError>;
}

/// Source of an actor's active buffs. Expired buffs are filtered here.
#[async_trait]
pub trait BuffSource: Send + Sync {
    /// Buffs that apply right now.
    async fn active_buffs(&self, actor: &ActorId) -> Result<Vec<Buff>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_untouched_cards_and_fields() {
        let mut record = CollectionSnapshot::with_currency(9)
            .with_card("kept", 4, 1)
            .with_card("touched", 2, 0);
        record
            .cards
            .get_mut("touched")
            .expect("present")
            .extra
            .insert("artwork".to_string(), serde_json::json!("touched.png"));

        let mut payload = RemotePayload { currency: 8, ..RemotePayload::default() };
        let mut entry = CardEntry::with_counts(1, 1);
        entry.extra.insert("name".to_string(), serde_json::json!("Touched"));
        payload.cards.insert("touched".to_string(), entry);

        payload.merge_into(&mut record);

        assert_eq!(record.currency, 8);
        assert_eq!(record.normal("kept"), 4);
        assert_eq!(record.foil("kept"), 1);
        let touched = record.entry("touched").expect("present");
        assert_eq!((touched.normal, touched.foil), (1, 1));
        assert_eq!(touched.extra.get("artwork"), Some(&serde_json::json!("touched.png")));
        assert_eq!(touched.extra.get("name"), Some(&serde_json::json!("Touched")));
    }
}
