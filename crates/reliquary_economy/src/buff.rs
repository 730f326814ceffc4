//! # Buffs
//!
//! Temporary modifiers attached to an actor. The generator only reads them;
//! expiry is decided by whoever hands the list over.

use serde::{Deserialize, Serialize};

/// What a buff modifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffKind {
    /// Adds its magnitude to every foil roll.
    FoilChanceBoost,
    /// A kind this engine does not interpret.
    #[serde(other)]
    Other,
}

/// An active (or expired) buff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Buff {
    /// Modifier kind.
    pub kind: BuffKind,
    /// Additive magnitude, e.g. `0.05` for +5 percentage points of foil chance.
    pub magnitude: f64,
    /// Expiry as unix seconds.
    pub expires_at: u64,
}

impl Buff {
    /// Creates a foil chance boost.
    #[must_use]
    pub fn foil_boost(magnitude: f64, expires_at: u64) -> Self {
        Self {
            kind: BuffKind::FoilChanceBoost,
            magnitude,
            expires_at,
        }
    }

    /// Whether the buff still applies at `now` (unix seconds).
    #[inline]
    #[must_use]
    pub const fn is_active_at(&self, now: u64) -> bool {
        self.expires_at > now
    }
}

/// Sum of all foil chance boosts in the list.
#[must_use]
pub fn total_foil_boost(buffs: &[Buff]) -> f64 {
    buffs
        .iter()
        .filter(|buff| buff.kind == BuffKind::FoilChanceBoost)
        .map(|buff| buff.magnitude)
        .sum()
}
