//! # Diagnostic Validator
//!
//! After every resolved mutation the pipeline compares a summary of the
//! remote record before and after, and records a verdict. The validator only
//! observes: it never raises, blocks or reverts anything.
//!
//! ## Checks
//!
//! | Check | Condition                                               | Severity |
//! |-------|---------------------------------------------------------|----------|
//! | a     | corruption: currency delta != -cost                     | error    |
//! | b     | total card delta != outcome's expected delta            | warning  |
//! | c     | remote latency above the slow threshold                 | warning  |
//! | d     | `nothing`: content hash changed                         | warning  |
//! | e     | the mutation failed to sync                             | error    |
//!
//! A failed mutation wrote nothing, so checks a, b and d are skipped for it.

use reliquary_economy::{ActorId, CardId, Catalog, CollectionSnapshot, OutcomeKind, Tier, CORRUPTION_COST};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Notes text when every check passed.
pub const ALL_PASSED: &str = "All validations passed";

/// Compact description of a collection, enough to validate a mutation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    /// Currency balance.
    pub currency: u32,
    /// Normal plus foil copies over all cards.
    pub total_cards: u64,
    /// Copies per tier label.
    pub cards_by_tier: BTreeMap<String, u64>,
    /// [`CollectionSnapshot::content_hash`].
    pub content_hash: u64,
}

impl CollectionSummary {
    /// Summarises a snapshot. Tiers come from the catalog when one is given.
    #[must_use]
    pub fn of(snapshot: &CollectionSnapshot, catalog: Option<&Catalog>) -> Self {
        Self {
            currency: snapshot.currency,
            total_cards: snapshot.total_cards(),
            cards_by_tier: snapshot.cards_by_tier(catalog),
            content_hash: snapshot.content_hash(),
        }
    }
}

/// What was done, as far as the validator cares.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDetails {
    /// Outcome applied.
    pub outcome: OutcomeKind,
    /// Target card, for targeted outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<CardId>,
    /// Tier of the target card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_tier: Option<Tier>,
    /// Whether the foil copy was targeted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_foil: Option<bool>,
    /// Remote round-trip time, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    /// Why the sync failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

impl ActionDetails {
    /// Details for an untargeted action.
    #[must_use]
    pub const fn new(outcome: OutcomeKind) -> Self {
        Self {
            outcome,
            card_id: None,
            card_tier: None,
            card_foil: None,
            response_time_ms: None,
            sync_error: None,
        }
    }

    /// Builder: records the targeted card.
    #[must_use]
    pub fn with_target(mut self, card_id: impl Into<CardId>, tier: Option<Tier>, foil: bool) -> Self {
        self.card_id = Some(card_id.into());
        self.card_tier = tier;
        self.card_foil = Some(foil);
        self
    }
}

/// Severity of a verdict. Ordered: `Ok < Warning < Error`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Every check passed.
    Ok,
    /// Something looks off but balances are right.
    Warning,
    /// A balance or the sync itself is wrong.
    Error,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Outcome of validation. A non-ok verdict is a value, never an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Highest severity among failed checks.
    pub status: ValidationStatus,
    /// Failed check notes joined with `"; "`, or [`ALL_PASSED`].
    pub notes: String,
}

impl Verdict {
    /// True when no check failed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ValidationStatus::Ok
    }
}

/// Post-condition checks over before/after summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiagnosticValidator {
    slow_response_ms: u64,
}

impl Default for DiagnosticValidator {
    fn default() -> Self {
        Self::new(2_000)
    }
}

impl DiagnosticValidator {
    /// Validator warning above `slow_response_ms` of remote latency.
    #[must_use]
    pub const fn new(slow_response_ms: u64) -> Self {
        Self { slow_response_ms }
    }

    /// Runs every check and folds the results into one verdict.
    #[must_use]
    pub fn validate(
        &self,
        before: &CollectionSummary,
        after: &CollectionSummary,
        details: &ActionDetails,
    ) -> Verdict {
        let mut status = ValidationStatus::Ok;
        let mut notes: Vec<String> = Vec::new();
        let mut fail = |severity: ValidationStatus, note: String| {
            status = status.max(severity);
            notes.push(note);
        };

        let synced = details.sync_error.is_none();

        if synced && details.outcome.is_corruption() {
            let currency_delta = i64::from(after.currency) - i64::from(before.currency);
            if currency_delta != -CORRUPTION_COST {
                fail(
                    ValidationStatus::Error,
                    format!(
                        "Currency delta incorrect: expected {}, got {currency_delta}",
                        -CORRUPTION_COST
                    ),
                );
            }
        }

        if synced {
            let expected = details.outcome.expected_card_delta();
            let actual = signed_delta(before.total_cards, after.total_cards);
            if actual != expected {
                fail(
                    ValidationStatus::Warning,
                    format!(
                        "Card delta incorrect for {}: expected {expected}, got {actual}",
                        details.outcome.as_str()
                    ),
                );
            }
        }

        if let Some(ms) = details.response_time_ms {
            if ms > self.slow_response_ms {
                fail(ValidationStatus::Warning, format!("Slow remote response: {ms}ms"));
            }
        }

        if synced && details.outcome == OutcomeKind::Nothing && before.content_hash != after.content_hash {
            fail(
                ValidationStatus::Warning,
                "Collection hash changed for \"nothing\" outcome".to_string(),
            );
        }

        if let Some(error) = &details.sync_error {
            fail(ValidationStatus::Error, format!("Synchronisation failed: {error}"));
        }

        let notes = if notes.is_empty() {
            ALL_PASSED.to_string()
        } else {
            notes.join("; ")
        };
        Verdict { status, notes }
    }
}

fn signed_delta(before: u64, after: u64) -> i64 {
    let before = i64::try_from(before).unwrap_or(i64::MAX);
    let after = i64::try_from(after).unwrap_or(i64::MAX);
    after - before
}

/// Append-only record of one resolved mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// Monotonic id within the process.
    pub sequence: u64,
    /// Actor whose collection was mutated.
    pub actor_id: ActorId,
    /// Remote state before (local state when the sync failed).
    pub state_before: CollectionSummary,
    /// Remote state after (equal to before when the sync failed).
    pub state_after: CollectionSummary,
    /// What was done.
    pub action_details: ActionDetails,
    /// Verdict severity.
    pub status: ValidationStatus,
    /// Verdict notes.
    pub notes: String,
    /// Creation time, unix milliseconds.
    pub recorded_at: u64,
}

impl DiagnosticRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        sequence: u64,
        actor_id: ActorId,
        state_before: CollectionSummary,
        state_after: CollectionSummary,
        action_details: ActionDetails,
        verdict: Verdict,
    ) -> Self {
        let recorded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
        Self {
            sequence,
            actor_id,
            state_before,
            state_after,
            action_details,
            status: verdict.status,
            notes: verdict.notes,
            recorded_at,
        }
    }
}
