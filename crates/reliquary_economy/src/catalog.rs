//! # Card Catalog
//!
//! The immutable list of card definitions the drop generator draws from.
//!
//! Catalog order matters: the weighted scan walks candidates in the order they
//! appear here, so two catalogs with the same cards in a different order give
//! different (equally fair) draws for the same RNG stream.
//!
//! ## TOML Format
//!
//! ```toml
//! [[cards]]
//! id = "ember-drake"
//! name = "Ember Drake"
//! tier = "T2"
//! base_weight = 3.0
//!
//! [[cards]]
//! id = "void-saint"
//! tier = "T3"
//! base_weight = 0.5
//! foil_chance = { T3 = 0.25 }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{EconomyError, EconomyResult};

/// Stable card identifier as stored by the remote collection.
pub type CardId = String;

/// Rarity tier of a card. `T0` is the most common, `T3` the rarest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Common.
    T0,
    /// Uncommon.
    T1,
    /// Rare.
    T2,
    /// Mythic.
    T3,
    /// Tier string the catalog did not recognise. Never eligible for the
    /// first-pick guarantee and rolls foil at the fallback chance.
    #[serde(other)]
    Unknown,
}

impl Tier {
    /// Tiers eligible for the guaranteed first booster pick.
    #[inline]
    #[must_use]
    pub const fn is_guarantee_eligible(self) -> bool {
        matches!(self, Self::T0 | Self::T1 | Self::T2)
    }

    /// Short label used in logs and diagnostic summaries.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::T0 => "T0",
            Self::T1 => "T1",
            Self::T2 => "T2",
            Self::T3 => "T3",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Foil chance applied when a tier has no explicit entry.
pub const FALLBACK_FOIL_CHANCE: f64 = 0.01;

/// Probability of rolling a foil copy, per tier.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FoilChanceTable {
    /// Chance for `T0` cards.
    #[serde(rename = "T0", default = "fallback_chance")]
    pub t0: f64,
    /// Chance for `T1` cards.
    #[serde(rename = "T1", default = "fallback_chance")]
    pub t1: f64,
    /// Chance for `T2` cards.
    #[serde(rename = "T2", default = "fallback_chance")]
    pub t2: f64,
    /// Chance for `T3` cards.
    #[serde(rename = "T3", default = "fallback_chance")]
    pub t3: f64,
}

fn fallback_chance() -> f64 {
    FALLBACK_FOIL_CHANCE
}

impl Default for FoilChanceTable {
    fn default() -> Self {
        Self {
            t0: 0.01,
            t1: 0.05,
            t2: 0.08,
            t3: 0.10,
        }
    }
}

impl FoilChanceTable {
    /// Base chance for the given tier.
    #[inline]
    #[must_use]
    pub fn chance(&self, tier: Tier) -> f64 {
        match tier {
            Tier::T0 => self.t0,
            Tier::T1 => self.t1,
            Tier::T2 => self.t2,
            Tier::T3 => self.t3,
            Tier::Unknown => FALLBACK_FOIL_CHANCE,
        }
    }

    /// Checks every entry is a probability.
    pub fn validate(&self) -> EconomyResult<()> {
        for (label, value) in [("T0", self.t0), ("T1", self.t1), ("T2", self.t2), ("T3", self.t3)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EconomyError::InvalidConfig(format!(
                    "foil chance for {label} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

fn default_weight() -> f64 {
    1.0
}

/// A single catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardDefinition {
    /// Card id.
    pub id: CardId,
    /// Display name, if the catalog carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Rarity tier.
    pub tier: Tier,
    /// Relative draw weight. Missing weights count as 1.
    #[serde(default = "default_weight")]
    pub base_weight: f64,
    /// Card-specific foil table overriding the generator default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foil_chance: Option<FoilChanceTable>,
}

impl CardDefinition {
    /// Creates a definition with the default weight and no foil override.
    #[must_use]
    pub fn new(id: impl Into<CardId>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            name: None,
            tier,
            base_weight: default_weight(),
            foil_chance: None,
        }
    }

    /// Builder: sets the draw weight.
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.base_weight = weight;
        self
    }

    /// Builder: sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder: sets a card-specific foil table.
    #[must_use]
    pub fn with_foil_table(mut self, table: FoilChanceTable) -> Self {
        self.foil_chance = Some(table);
        self
    }

    /// Weight used by the cumulative scan. Negative or NaN weights never win.
    #[inline]
    #[must_use]
    pub fn draw_weight(&self) -> f64 {
        if self.base_weight.is_finite() && self.base_weight > 0.0 {
            self.base_weight
        } else {
            0.0
        }
    }
}

/// Raw TOML shape of a catalog file.
#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    cards: Vec<CardDefinition>,
}

/// Ordered, read-only card catalog.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Catalog {
    cards: Vec<CardDefinition>,
}

impl Catalog {
    /// Builds a catalog from definitions, keeping their order.
    #[must_use]
    pub fn new(cards: Vec<CardDefinition>) -> Self {
        Self { cards }
    }

    /// Parses a catalog from TOML text.
    pub fn from_toml_str(content: &str) -> EconomyResult<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| EconomyError::InvalidConfig(format!("catalog parse error: {e}")))?;
        Ok(Self::new(file.cards))
    }

    /// Loads a catalog from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EconomyError::InvalidConfig(format!(
                "failed to read catalog {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// All cards in catalog order.
    #[inline]
    #[must_use]
    pub fn cards(&self) -> &[CardDefinition] {
        &self.cards
    }

    /// Number of cards.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// True when no card can be drawn.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Looks up a card by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CardDefinition> {
        self.cards.iter().find(|card| card.id == id)
    }

    /// Looks up a card by id, failing with [`EconomyError::UnknownCard`].
    pub fn require(&self, id: &str) -> EconomyResult<&CardDefinition> {
        self.get(id)
            .ok_or_else(|| EconomyError::UnknownCard(id.to_string()))
    }

    /// Tier of a card, if it is in the catalog.
    #[must_use]
    pub fn tier_of(&self, id: &str) -> Option<Tier> {
        self.get(id).map(|card| card.tier)
    }

    /// Sum of all draw weights.
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.cards.iter().map(CardDefinition::draw_weight).sum()
    }
}

impl From<Vec<CardDefinition>> for Catalog {
    fn from(cards: Vec<CardDefinition>) -> Self {
        Self::new(cards)
    }
}
