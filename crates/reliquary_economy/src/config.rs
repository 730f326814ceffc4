//! # Economy Configuration
//!
//! Balance numbers for the drop generator, loaded once at startup.
//!
//! ```toml
//! booster_size = 5
//! guarantee_boost = 4.0
//! currency_grant = 5
//!
//! [foil_chance]
//! T0 = 0.01
//! T1 = 0.05
//! T2 = 0.08
//! T3 = 0.10
//!
//! [corruption]
//! nothing = 40
//! foil = 20
//! destroyed = 15
//! transform = 15
//! duplicate = 10
//!
//! [foil_corruption]
//! lose_foil = 50
//! destroyed = 40
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::catalog::FoilChanceTable;
use crate::error::{EconomyError, EconomyResult};
use crate::outcome::DEFAULT_CURRENCY_GRANT;

/// Default number of cards in a booster.
pub const DEFAULT_BOOSTER_SIZE: usize = 5;

/// Default weight multiplier for `T2` cards on the guaranteed first pick.
pub const DEFAULT_GUARANTEE_BOOST: f64 = 4.0;

/// Weights of the corruption outcomes for a normal copy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorruptionWeights {
    /// Weight of `nothing`.
    pub nothing: f64,
    /// Weight of `foil`. Foil chance buffs add `magnitude * 100` here.
    pub foil: f64,
    /// Weight of `destroyed`.
    pub destroyed: f64,
    /// Weight of `transform`.
    pub transform: f64,
    /// Weight of `duplicate`.
    pub duplicate: f64,
}

impl Default for CorruptionWeights {
    fn default() -> Self {
        Self {
            nothing: 40.0,
            foil: 20.0,
            destroyed: 15.0,
            transform: 15.0,
            duplicate: 10.0,
        }
    }
}

/// Weights of the corruption outcomes for a foil copy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FoilCorruptionWeights {
    /// Weight of `lose_foil`.
    pub lose_foil: f64,
    /// Weight of `destroyed`.
    pub destroyed: f64,
}

impl Default for FoilCorruptionWeights {
    fn default() -> Self {
        Self {
            lose_foil: 50.0,
            destroyed: 40.0,
        }
    }
}

/// Economy balance configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Cards per booster.
    pub booster_size: usize,
    /// Weight multiplier for `T2` on the guaranteed first pick.
    pub guarantee_boost: f64,
    /// Default foil chances for cards without their own table.
    pub foil_chance: FoilChanceTable,
    /// Corruption outcome weights (normal copy).
    pub corruption: CorruptionWeights,
    /// Corruption outcome weights (foil copy).
    pub foil_corruption: FoilCorruptionWeights,
    /// Amount of a default currency reward.
    pub currency_grant: u32,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            booster_size: DEFAULT_BOOSTER_SIZE,
            guarantee_boost: DEFAULT_GUARANTEE_BOOST,
            foil_chance: FoilChanceTable::default(),
            corruption: CorruptionWeights::default(),
            foil_corruption: FoilCorruptionWeights::default(),
            currency_grant: DEFAULT_CURRENCY_GRANT,
        }
    }
}

impl EconomyConfig {
    /// Parses and validates a config from TOML text.
    pub fn from_toml_str(content: &str) -> EconomyResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EconomyError::InvalidConfig(format!("economy config parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a config from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EconomyError::InvalidConfig(format!(
                "failed to read economy config {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Rejects values the generator cannot work with.
    pub fn validate(&self) -> EconomyResult<()> {
        if self.booster_size == 0 {
            return Err(EconomyError::InvalidConfig("booster_size must be at least 1".to_string()));
        }
        if !self.guarantee_boost.is_finite() || self.guarantee_boost < 0.0 {
            return Err(EconomyError::InvalidConfig(format!(
                "guarantee_boost must be a non-negative number, got {}",
                self.guarantee_boost
            )));
        }
        self.foil_chance.validate()?;

        let c = &self.corruption;
        check_weights("corruption", &[c.nothing, c.foil, c.destroyed, c.transform, c.duplicate])?;
        let f = &self.foil_corruption;
        check_weights("foil_corruption", &[f.lose_foil, f.destroyed])?;
        Ok(())
    }
}

fn check_weights(table: &str, weights: &[f64]) -> EconomyResult<()> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(EconomyError::InvalidConfig(format!(
            "{table} weights must be non-negative numbers"
        )));
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(EconomyError::InvalidConfig(format!("{table} weights sum to zero")));
    }
    Ok(())
}
