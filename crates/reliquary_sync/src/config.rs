//! # Sync Configuration
//!
//! ```toml
//! [economy]
//! booster_size = 5
//!
//! [sync]
//! remote_timeout_ms = 10000
//! max_queue_depth = 64
//! slow_response_ms = 2000
//! max_user_retries = 3
//! audit_history = 1000
//! ```

use reliquary_economy::EconomyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{SyncError, SyncResult};

/// Pipeline configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Timeout for every remote call, in milliseconds.
    pub remote_timeout_ms: u64,
    /// Pending mutations allowed per actor. `None` means unbounded.
    pub max_queue_depth: Option<usize>,
    /// Remote latency above which the validator warns, in milliseconds.
    pub slow_response_ms: u64,
    /// Failed attempts before the caller should show a final failure notice.
    pub max_user_retries: u32,
    /// Records kept by the in-memory audit sink.
    pub audit_history: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: 10_000,
            max_queue_depth: None,
            slow_response_ms: 2_000,
            max_user_retries: 3,
            audit_history: 1_000,
        }
    }
}

impl SyncConfig {
    /// Tight timeouts and a bounded queue, for load tests.
    #[must_use]
    pub const fn stress() -> Self {
        Self {
            remote_timeout_ms: 500,
            max_queue_depth: Some(256),
            slow_response_ms: 250,
            max_user_retries: 1,
            audit_history: 10_000,
        }
    }

    /// Remote call timeout.
    #[inline]
    #[must_use]
    pub const fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Rejects values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> SyncResult<()> {
        if self.remote_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig("remote_timeout_ms must be positive".to_string()));
        }
        if self.max_queue_depth == Some(0) {
            return Err(SyncError::InvalidConfig(
                "max_queue_depth must be at least 1 (omit it for unbounded)".to_string(),
            ));
        }
        if self.audit_history == 0 {
            return Err(SyncError::InvalidConfig("audit_history must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Whole-system configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliquaryConfig {
    /// Economy balance.
    pub economy: EconomyConfig,
    /// Pipeline settings.
    pub sync: SyncConfig,
}

impl ReliquaryConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidConfig`] for malformed TOML or a rejected sync
    /// section, [`SyncError::Economy`] for a rejected economy section.
    pub fn from_toml_str(content: &str) -> SyncResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SyncError::InvalidConfig(format!("config parse error: {e}")))?;
        config.economy.validate()?;
        config.sync.validate()?;
        Ok(config)
    }

    /// Loads a config from a TOML file.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidConfig`] when the file cannot be read, otherwise as
    /// [`ReliquaryConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SyncError::InvalidConfig(format!(
                "failed to read config {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&content)
    }
}
