//! # RELIQUARY Economy
//!
//! Pure rules of the collectible economy: what a booster contains, what a
//! corruption roll does to a card, and how much it costs.
//!
//! ## Design Principles
//!
//! 1. **No I/O** - nothing here talks to a store; the sync crate does
//! 2. **Caller-owned randomness** - every draw takes `&mut impl Rng`
//! 3. **Deltas, not totals** - outcomes produce a [`Mutation`] of signed
//!    deltas; absolute values are only computed against the remote record
//! 4. **External configuration** - balance numbers live in TOML files
//!
//! ## Example
//!
//! ```rust,ignore
//! use reliquary_economy::{apply_outcome, Catalog, DropGenerator, Outcome, ActorId};
//!
//! let catalog = Catalog::from_toml_file("data/catalog.toml")?;
//! let generator = DropGenerator::default();
//!
//! let picks = generator.open_booster(&catalog, &buffs, &mut rng)?;
//! let mutation = apply_outcome(&ActorId::new("alice"), &Outcome::Booster { picks }, None)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod buff;
pub mod catalog;
pub mod collection;
pub mod config;
pub mod error;
pub mod loot;
pub mod outcome;

pub use buff::{total_foil_boost, Buff, BuffKind};
pub use catalog::{CardDefinition, CardId, Catalog, FoilChanceTable, Tier};
pub use collection::{clamped_add, ActorId, CardEntry, CollectionSnapshot};
pub use config::{CorruptionWeights, EconomyConfig, FoilCorruptionWeights, DEFAULT_BOOSTER_SIZE};
pub use error::{EconomyError, EconomyResult};
pub use loot::{
    pick_transform_target, roll_corruption, roll_foil_corruption, run_booster_statistics,
    weighted_pick, DropGenerator, LootStatistics,
};
pub use outcome::{
    apply_outcome, BoosterPick, CardDelta, Mutation, Outcome, OutcomeKind, Target,
    CORRUPTION_COST, DEFAULT_CURRENCY_GRANT,
};
