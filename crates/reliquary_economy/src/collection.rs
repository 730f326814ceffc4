//! # Collection Snapshots
//!
//! Point-in-time copy of one actor's collection: per-card normal/foil counts
//! plus a currency balance. Counts are unsigned so a snapshot can never hold a
//! negative value; every place that adds a signed delta clamps at zero.
//!
//! The same type is used for the optimistic local view and for what the remote
//! store returns. Per-card fields this engine does not own (name, artwork,
//! acquisition date...) ride along in [`CardEntry::extra`] and must survive a
//! reconciliation untouched.

use serde::{Deserialize, Serialize};
use siphasher::sip128::{Hasher128, SipHasher24};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;

use crate::catalog::{CardId, Catalog};
use crate::outcome::{CardDelta, Mutation};

/// Fixed keys for the content fingerprint. Changing them invalidates every
/// hash already stored in diagnostic records.
const HASH_KEY_0: u64 = 0x5245_4c49_5155_4152;
const HASH_KEY_1: u64 = 0x5953_4e41_5053_484f;

/// Identity of the owner of a collection.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Wraps a raw id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw id.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Adds a signed delta to an unsigned count, clamping to `[0, u32::MAX]`.
///
/// Returns the new value and whether the lower clamp kicked in.
#[inline]
#[must_use]
pub fn clamped_add(current: u32, delta: i64) -> (u32, bool) {
    let raw = i64::from(current).saturating_add(delta);
    if raw < 0 {
        (0, true)
    } else {
        (u32::try_from(raw).unwrap_or(u32::MAX), false)
    }
}

/// Holdings of one card.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CardEntry {
    /// Normal copies.
    #[serde(default)]
    pub normal: u32,
    /// Foil copies.
    #[serde(default)]
    pub foil: u32,
    /// Every other persisted field of the card, kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CardEntry {
    /// Entry with the given counts and no extra fields.
    #[must_use]
    pub fn with_counts(normal: u32, foil: u32) -> Self {
        Self {
            normal,
            foil,
            extra: BTreeMap::new(),
        }
    }

    /// Normal plus foil copies.
    #[inline]
    #[must_use]
    pub fn total(&self) -> u64 {
        u64::from(self.normal) + u64::from(self.foil)
    }

    /// Applies a delta with clamping. Returns how many of the two counts
    /// were clamped at zero.
    pub fn apply_delta(&mut self, delta: CardDelta) -> usize {
        let (normal, normal_clamped) = clamped_add(self.normal, delta.normal);
        let (foil, foil_clamped) = clamped_add(self.foil, delta.foil);
        self.normal = normal;
        self.foil = foil;
        usize::from(normal_clamped) + usize::from(foil_clamped)
    }
}

/// One actor's collection at a point in time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    /// Holdings keyed by card id.
    #[serde(default)]
    pub cards: BTreeMap<CardId, CardEntry>,
    /// Currency balance.
    #[serde(default)]
    pub currency: u32,
}

impl CollectionSnapshot {
    /// An empty collection with the given balance.
    #[must_use]
    pub fn with_currency(currency: u32) -> Self {
        Self {
            cards: BTreeMap::new(),
            currency,
        }
    }

    /// Builder: sets the counts of one card.
    #[must_use]
    pub fn with_card(mut self, id: impl Into<CardId>, normal: u32, foil: u32) -> Self {
        let entry = self.cards.entry(id.into()).or_default();
        entry.normal = normal;
        entry.foil = foil;
        self
    }

    /// Holdings of a card, if any entry exists.
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&CardEntry> {
        self.cards.get(id)
    }

    /// Normal copies of a card (0 when absent).
    #[must_use]
    pub fn normal(&self, id: &str) -> u32 {
        self.entry(id).map_or(0, |entry| entry.normal)
    }

    /// Foil copies of a card (0 when absent).
    #[must_use]
    pub fn foil(&self, id: &str) -> u32 {
        self.entry(id).map_or(0, |entry| entry.foil)
    }

    /// Sum of normal and foil copies over all cards.
    #[must_use]
    pub fn total_cards(&self) -> u64 {
        self.cards.values().map(CardEntry::total).sum()
    }

    /// Copies held per tier label. Cards missing from the catalog (or all
    /// cards, without a catalog) are counted under `"unknown"`.
    #[must_use]
    pub fn cards_by_tier(&self, catalog: Option<&Catalog>) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for (id, entry) in &self.cards {
            if entry.total() == 0 {
                continue;
            }
            let label = catalog
                .and_then(|catalog| catalog.tier_of(id))
                .map_or("unknown", |tier| tier.as_str());
            *counts.entry(label.to_string()).or_insert(0) += entry.total();
        }
        counts
    }

    /// Order-independent fingerprint of the card counts.
    ///
    /// SipHash-2-4 over the id-sorted `id:normal:foil` lines. Currency and
    /// extra fields do not take part.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        let mut hasher = SipHasher24::new_with_keys(HASH_KEY_0, HASH_KEY_1);
        // BTreeMap iteration is already sorted by id.
        for (id, entry) in &self.cards {
            hasher.write(format!("{id}:{}:{}\n", entry.normal, entry.foil).as_bytes());
        }
        let hash = hasher.finish128();
        hash.h1 ^ hash.h2
    }

    /// Optimistically applies a mutation in place, clamping at zero.
    ///
    /// Returns the number of clamped fields (currency included).
    pub fn apply_mutation(&mut self, mutation: &Mutation) -> usize {
        let mut clamped = 0;
        for (id, delta) in &mutation.card_deltas {
            clamped += self.cards.entry(id.clone()).or_default().apply_delta(*delta);
        }
        let (currency, currency_clamped) = clamped_add(self.currency, mutation.currency_delta);
        self.currency = currency;
        clamped + usize::from(currency_clamped)
    }
}
