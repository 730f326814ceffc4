//! # Outcome Applier
//!
//! Maps a decided outcome onto signed deltas. This is the contract shared by
//! the callers that apply mutations optimistically, the reconciler that turns
//! deltas into absolute values, and the validator that checks the result.
//!
//! | Outcome          | Card deltas                             | Total | Currency |
//! |------------------|-----------------------------------------|-------|----------|
//! | `nothing`        | none                                    | 0     | -1       |
//! | `foil`           | target normal -1, foil +1               | 0     | -1       |
//! | `duplicate`      | target variant +1                       | +1    | -1       |
//! | `destroyed`      | target variant -1                       | -1    | -1       |
//! | `transform`      | target variant -1, result normal +1     | 0     | -1       |
//! | `lose_foil`      | target foil -1, normal +1               | 0     | -1       |
//! | `booster(n)`     | +1 per pick (normal or foil)            | +n    | 0        |
//! | `currency_grant` | none                                    | 0     | +amount  |
//!
//! Applying is pure: no I/O, no randomness.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::{CardId, Tier};
use crate::collection::ActorId;
use crate::error::{EconomyError, EconomyResult};

/// Currency spent by every corruption action, whatever it rolls.
pub const CORRUPTION_COST: i64 = 1;

/// Currency granted by a reward when the caller does not pick an amount.
pub const DEFAULT_CURRENCY_GRANT: u32 = 5;

/// Outcome category, without payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OutcomeKind {
    /// Corruption did nothing.
    Nothing,
    /// Target normal copy became foil.
    Foil,
    /// Target copy was duplicated.
    Duplicate,
    /// Target copy was destroyed.
    Destroyed,
    /// Target copy turned into another card.
    Transform,
    /// Target foil copy lost its foil.
    LoseFoil,
    /// A booster of `size` cards was opened.
    Booster {
        /// Number of cards in the booster.
        size: usize,
    },
    /// Currency was granted.
    CurrencyGrant,
}

impl OutcomeKind {
    /// True for outcomes of a corruption action (they all cost currency).
    #[inline]
    #[must_use]
    pub const fn is_corruption(self) -> bool {
        matches!(
            self,
            Self::Nothing
                | Self::Foil
                | Self::Duplicate
                | Self::Destroyed
                | Self::Transform
                | Self::LoseFoil
        )
    }

    /// True when the outcome acts on a specific card copy.
    #[inline]
    #[must_use]
    pub const fn requires_target(self) -> bool {
        matches!(
            self,
            Self::Foil | Self::Duplicate | Self::Destroyed | Self::Transform | Self::LoseFoil
        )
    }

    /// Expected change of the total card count.
    #[must_use]
    pub fn expected_card_delta(self) -> i64 {
        match self {
            Self::Nothing | Self::Foil | Self::Transform | Self::LoseFoil | Self::CurrencyGrant => 0,
            Self::Duplicate => 1,
            Self::Destroyed => -1,
            Self::Booster { size } => i64::try_from(size).unwrap_or(i64::MAX),
        }
    }

    /// Stable name used in logs and records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::Foil => "foil",
            Self::Duplicate => "duplicate",
            Self::Destroyed => "destroyed",
            Self::Transform => "transform",
            Self::LoseFoil => "lose_foil",
            Self::Booster { .. } => "booster",
            Self::CurrencyGrant => "currency_grant",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Booster { size } => write!(f, "booster({size})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One card of an opened booster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoosterPick {
    /// Card drawn.
    pub card_id: CardId,
    /// Tier of the card at draw time.
    pub tier: Tier,
    /// Whether the copy is foil.
    pub foil: bool,
}

/// A decided outcome with everything needed to compute deltas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// See [`OutcomeKind::Nothing`].
    Nothing,
    /// See [`OutcomeKind::Foil`].
    Foil,
    /// See [`OutcomeKind::Duplicate`].
    Duplicate,
    /// See [`OutcomeKind::Destroyed`].
    Destroyed,
    /// See [`OutcomeKind::Transform`].
    Transform {
        /// Card the target turned into.
        into: CardId,
    },
    /// See [`OutcomeKind::LoseFoil`].
    LoseFoil,
    /// See [`OutcomeKind::Booster`].
    Booster {
        /// Drawn cards, in draw order.
        picks: Vec<BoosterPick>,
    },
    /// See [`OutcomeKind::CurrencyGrant`].
    CurrencyGrant {
        /// Amount granted.
        amount: u32,
    },
}

impl Outcome {
    /// Payload-free category.
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Nothing => OutcomeKind::Nothing,
            Self::Foil => OutcomeKind::Foil,
            Self::Duplicate => OutcomeKind::Duplicate,
            Self::Destroyed => OutcomeKind::Destroyed,
            Self::Transform { .. } => OutcomeKind::Transform,
            Self::LoseFoil => OutcomeKind::LoseFoil,
            Self::Booster { picks } => OutcomeKind::Booster { size: picks.len() },
            Self::CurrencyGrant { .. } => OutcomeKind::CurrencyGrant,
        }
    }
}

/// The card copy an action was used on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Card id.
    pub card_id: CardId,
    /// Whether the foil copy was targeted.
    pub foil: bool,
}

impl Target {
    /// Targets a normal copy.
    #[must_use]
    pub fn normal(card_id: impl Into<CardId>) -> Self {
        Self { card_id: card_id.into(), foil: false }
    }

    /// Targets a foil copy.
    #[must_use]
    pub fn foil(card_id: impl Into<CardId>) -> Self {
        Self { card_id: card_id.into(), foil: true }
    }

    /// A delta of `amount` on the targeted variant.
    const fn variant_delta(&self, amount: i64) -> CardDelta {
        if self.foil {
            CardDelta { normal: 0, foil: amount }
        } else {
            CardDelta { normal: amount, foil: 0 }
        }
    }
}

/// Signed change of one card's counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardDelta {
    /// Change of normal copies.
    pub normal: i64,
    /// Change of foil copies.
    pub foil: i64,
}

impl CardDelta {
    /// Sum of both parts.
    #[inline]
    #[must_use]
    pub const fn total(self) -> i64 {
        self.normal + self.foil
    }

    /// True when nothing changes.
    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.normal == 0 && self.foil == 0
    }
}

/// Relative change to one actor's collection. Created per request, consumed once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    /// Owner of the collection.
    pub actor_id: ActorId,
    /// Per-card deltas. Only touched cards appear.
    pub card_deltas: BTreeMap<CardId, CardDelta>,
    /// Currency change.
    pub currency_delta: i64,
    /// Outcome that produced the deltas.
    pub outcome: OutcomeKind,
}

impl Mutation {
    fn empty(actor_id: ActorId, outcome: OutcomeKind) -> Self {
        Self {
            actor_id,
            card_deltas: BTreeMap::new(),
            currency_delta: 0,
            outcome,
        }
    }

    fn add(&mut self, card_id: &str, delta: CardDelta) {
        let entry = self.card_deltas.entry(card_id.to_string()).or_default();
        entry.normal += delta.normal;
        entry.foil += delta.foil;
    }

    /// Sum of all per-card deltas.
    #[must_use]
    pub fn total_card_delta(&self) -> i64 {
        self.card_deltas.values().map(|delta| delta.total()).sum()
    }

    /// Ids of the cards this mutation touches.
    pub fn touched_cards(&self) -> impl Iterator<Item = &CardId> {
        self.card_deltas.keys()
    }
}

/// Turns an outcome into a mutation.
///
/// # Errors
///
/// [`EconomyError::MissingTarget`] when the outcome acts on a card and no
/// target was given.
pub fn apply_outcome(
    actor_id: &ActorId,
    outcome: &Outcome,
    target: Option<&Target>,
) -> EconomyResult<Mutation> {
    let kind = outcome.kind();
    let mut mutation = Mutation::empty(actor_id.clone(), kind);

    let target = match (kind.requires_target(), target) {
        (true, None) => {
            return Err(EconomyError::MissingTarget {
                outcome: kind.as_str().to_string(),
            })
        }
        (_, target) => target,
    };

    if kind.is_corruption() {
        mutation.currency_delta = -CORRUPTION_COST;
    }

    match (outcome, target) {
        (Outcome::Nothing, _) => {}
        (Outcome::Foil, Some(target)) => {
            mutation.add(&target.card_id, CardDelta { normal: -1, foil: 1 });
        }
        (Outcome::Duplicate, Some(target)) => {
            mutation.add(&target.card_id, target.variant_delta(1));
        }
        (Outcome::Destroyed, Some(target)) => {
            mutation.add(&target.card_id, target.variant_delta(-1));
        }
        (Outcome::Transform { into }, Some(target)) => {
            mutation.add(&target.card_id, target.variant_delta(-1));
            mutation.add(into, CardDelta { normal: 1, foil: 0 });
        }
        (Outcome::LoseFoil, Some(target)) => {
            mutation.add(&target.card_id, CardDelta { normal: 1, foil: -1 });
        }
        (Outcome::Booster { picks }, _) => {
            for pick in picks {
                let delta = if pick.foil {
                    CardDelta { normal: 0, foil: 1 }
                } else {
                    CardDelta { normal: 1, foil: 0 }
                };
                mutation.add(&pick.card_id, delta);
            }
        }
        (Outcome::CurrencyGrant { amount }, _) => {
            mutation.currency_delta = i64::from(*amount);
        }
        // requires_target() already rejected the target-less cases.
        (_, None) => {}
    }

    mutation.card_deltas.retain(|_, delta| !delta.is_zero());
    Ok(mutation)
}
