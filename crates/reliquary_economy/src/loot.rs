//! # Drop Generator
//!
//! **Weighted Boosters with a Tier Guarantee**
//!
//! Every draw is a cumulative-weight scan over the catalog in catalog order:
//!
//! 1. draw `r` uniform in `[0, total_weight)`
//! 2. walk the candidates, subtracting each weight from `r`
//! 3. the first candidate that brings `r` to `<= 0` wins
//! 4. if float error leaves `r > 0` after the walk, the last candidate wins
//!
//! ## Booster Layout
//!
//! - Pick 1 is drawn from `T0..=T2` only, with `T2` weights multiplied by the
//!   guarantee boost (4 by default). If the catalog has no such card the
//!   guarantee is skipped.
//! - Every other pick is drawn from the full catalog with base weights.
//!   Repeats are allowed.
//!
//! ## Foil Rolls
//!
//! `chance = clamp(tier_chance + sum(foil boosts), 0, 1)`, then `u < chance`
//! with `u` uniform in `[0, 1)`.
//!
//! The generator never owns an RNG. Tests pass a seeded `ChaCha8Rng`, the
//! service passes its own.

use rand::Rng;
use tracing::debug;

use crate::buff::{total_foil_boost, Buff};
use crate::catalog::{CardDefinition, Catalog, Tier};
use crate::config::{CorruptionWeights, EconomyConfig, FoilCorruptionWeights};
use crate::error::{EconomyError, EconomyResult};
use crate::outcome::{BoosterPick, OutcomeKind};

/// Extra `foil` corruption weight per unit of foil boost magnitude.
const FOIL_BOOST_CORRUPTION_SCALE: f64 = 100.0;

/// Cumulative-weight scan.
///
/// Returns `None` only when `items` is empty. Zero total weight selects the
/// first item.
pub fn weighted_pick<'a, T, R, W>(items: &'a [T], weight: W, rng: &mut R) -> Option<&'a T>
where
    R: Rng + ?Sized,
    W: Fn(&T) -> f64,
{
    let last = items.last()?;
    let total: f64 = items.iter().map(&weight).sum();
    let mut r = rng.gen::<f64>() * total;

    for item in items {
        r -= weight(item);
        if r <= 0.0 {
            return Some(item);
        }
    }

    Some(last)
}

/// Booster generation and corruption rolls, parameterised by [`EconomyConfig`].
#[derive(Clone, Debug, Default)]
pub struct DropGenerator {
    config: EconomyConfig,
}

impl DropGenerator {
    /// Creates a generator from a (validated) config.
    #[must_use]
    pub fn new(config: EconomyConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// Draws `size` cards.
    ///
    /// # Errors
    ///
    /// [`EconomyError::EmptyCatalog`] when there is nothing to draw.
    pub fn generate_booster<R: Rng + ?Sized>(
        &self,
        catalog: &Catalog,
        size: usize,
        rng: &mut R,
    ) -> EconomyResult<Vec<CardDefinition>> {
        if catalog.is_empty() {
            return Err(EconomyError::EmptyCatalog);
        }

        let mut picks = Vec::with_capacity(size);
        if size == 0 {
            return Ok(picks);
        }

        let eligible: Vec<&CardDefinition> = catalog
            .cards()
            .iter()
            .filter(|card| card.tier.is_guarantee_eligible())
            .collect();

        let boost = self.config.guarantee_boost;
        let guaranteed = weighted_pick(
            &eligible,
            |card| {
                if card.tier == Tier::T2 {
                    card.draw_weight() * boost
                } else {
                    card.draw_weight()
                }
            },
            rng,
        );
        if let Some(card) = guaranteed {
            picks.push((*card).clone());
        } else {
            debug!(catalog_size = catalog.len(), "no T0-T2 card, skipping guaranteed pick");
        }

        while picks.len() < size {
            let card = weighted_pick(catalog.cards(), CardDefinition::draw_weight, rng)
                .ok_or(EconomyError::EmptyCatalog)?;
            picks.push(card.clone());
        }

        Ok(picks)
    }

    /// Base foil chance of a card before buffs.
    #[must_use]
    pub fn base_foil_chance(&self, card: &CardDefinition) -> f64 {
        card.foil_chance
            .as_ref()
            .unwrap_or(&self.config.foil_chance)
            .chance(card.tier)
    }

    /// Rolls whether a drawn card is foil.
    pub fn determine_foil<R: Rng + ?Sized>(
        &self,
        card: &CardDefinition,
        buffs: &[Buff],
        rng: &mut R,
    ) -> bool {
        let chance = (self.base_foil_chance(card) + total_foil_boost(buffs)).clamp(0.0, 1.0);
        rng.gen::<f64>() < chance
    }

    /// Draws a booster of the configured size and rolls foil for every card.
    ///
    /// # Errors
    ///
    /// [`EconomyError::EmptyCatalog`] when there is nothing to draw.
    pub fn open_booster<R: Rng + ?Sized>(
        &self,
        catalog: &Catalog,
        buffs: &[Buff],
        rng: &mut R,
    ) -> EconomyResult<Vec<BoosterPick>> {
        let cards = self.generate_booster(catalog, self.config.booster_size, rng)?;
        Ok(cards
            .into_iter()
            .map(|card| {
                let foil = self.determine_foil(&card, buffs, rng);
                BoosterPick {
                    card_id: card.id,
                    tier: card.tier,
                    foil,
                }
            })
            .collect())
    }

    /// Rolls the corruption outcome for a normal copy.
    pub fn roll_corruption<R: Rng + ?Sized>(&self, buffs: &[Buff], rng: &mut R) -> OutcomeKind {
        roll_corruption(&self.config.corruption, buffs, rng)
    }

    /// Rolls the corruption outcome for a foil copy.
    pub fn roll_foil_corruption<R: Rng + ?Sized>(&self, rng: &mut R) -> OutcomeKind {
        roll_foil_corruption(&self.config.foil_corruption, rng)
    }
}

/// Weighted roll over the corruption table. Foil boosts make `foil` likelier.
pub fn roll_corruption<R: Rng + ?Sized>(
    weights: &CorruptionWeights,
    buffs: &[Buff],
    rng: &mut R,
) -> OutcomeKind {
    let foil_weight = weights.foil + total_foil_boost(buffs).max(0.0) * FOIL_BOOST_CORRUPTION_SCALE;
    let table = [
        (OutcomeKind::Nothing, weights.nothing),
        (OutcomeKind::Foil, foil_weight),
        (OutcomeKind::Destroyed, weights.destroyed),
        (OutcomeKind::Transform, weights.transform),
        (OutcomeKind::Duplicate, weights.duplicate),
    ];
    weighted_pick(&table, |(_, w)| w.max(0.0), rng).map_or(OutcomeKind::Nothing, |(kind, _)| *kind)
}

/// Weighted roll over the foil corruption table.
pub fn roll_foil_corruption<R: Rng + ?Sized>(
    weights: &FoilCorruptionWeights,
    rng: &mut R,
) -> OutcomeKind {
    let table = [
        (OutcomeKind::LoseFoil, weights.lose_foil),
        (OutcomeKind::Destroyed, weights.destroyed),
    ];
    weighted_pick(&table, |(_, w)| w.max(0.0), rng).map_or(OutcomeKind::LoseFoil, |(kind, _)| *kind)
}

/// Picks the card a `transform` turns `source` into: same tier, never the
/// source itself, weighted by base weight.
#[must_use]
pub fn pick_transform_target<R: Rng + ?Sized>(
    catalog: &Catalog,
    source: &CardDefinition,
    rng: &mut R,
) -> Option<CardDefinition> {
    let candidates: Vec<&CardDefinition> = catalog
        .cards()
        .iter()
        .filter(|card| card.tier == source.tier && card.id != source.id)
        .collect();
    weighted_pick(&candidates, |card| card.draw_weight(), rng).map(|card| (*card).clone())
}

/// Observed frequencies from a batch of boosters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LootStatistics {
    /// Boosters opened.
    pub boosters: u64,
    /// Cards drawn.
    pub cards: u64,
    /// Foil copies drawn.
    pub foils: u64,
    /// Cards drawn per tier: `[T0, T1, T2, T3, unknown]`.
    pub per_tier: [u64; 5],
    /// Boosters whose first card was `T0..=T2`.
    pub guaranteed_first: u64,
}

impl LootStatistics {
    /// Fraction of drawn cards that were foil.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn foil_rate(&self) -> f64 {
        if self.cards == 0 {
            return 0.0;
        }
        self.foils as f64 / self.cards as f64
    }

    /// Fraction of drawn cards in the given tier slot.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tier_rate(&self, slot: usize) -> f64 {
        if self.cards == 0 {
            return 0.0;
        }
        self.per_tier.get(slot).copied().unwrap_or(0) as f64 / self.cards as f64
    }
}

/// Opens `boosters` boosters and tallies the results.
///
/// # Errors
///
/// [`EconomyError::EmptyCatalog`] when there is nothing to draw.
pub fn run_booster_statistics<R: Rng + ?Sized>(
    generator: &DropGenerator,
    catalog: &Catalog,
    buffs: &[Buff],
    boosters: u64,
    rng: &mut R,
) -> EconomyResult<LootStatistics> {
    let mut stats = LootStatistics::default();
    for _ in 0..boosters {
        let picks = generator.open_booster(catalog, buffs, rng)?;
        stats.boosters += 1;
        if picks.first().is_some_and(|pick| pick.tier.is_guarantee_eligible()) {
            stats.guaranteed_first += 1;
        }
        for pick in &picks {
            stats.cards += 1;
            stats.foils += u64::from(pick.foil);
            let slot = match pick.tier {
                Tier::T0 => 0,
                Tier::T1 => 1,
                Tier::T2 => 2,
                Tier::T3 => 3,
                Tier::Unknown => 4,
            };
            stats.per_tier[slot] += 1;
        }
    }
    Ok(stats)
}
