//! # Economy Error Types
//!
//! All errors that can occur while generating drops or mapping outcomes.

use thiserror::Error;

/// Errors that can occur in the economy rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EconomyError {
    /// A booster (or any weighted draw) was requested from an empty catalog.
    #[error("card catalog is empty")]
    EmptyCatalog,

    /// The outcome acts on a specific card but no target was supplied.
    #[error("outcome '{outcome}' requires a target card")]
    MissingTarget {
        /// Name of the outcome that needed a target.
        outcome: String,
    },

    /// Card id not present in the catalog.
    #[error("card not found in catalog: {0}")]
    UnknownCard(String),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for economy operations.
pub type EconomyResult<T> = Result<T, EconomyError>;
