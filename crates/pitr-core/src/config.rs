//! Engine configuration
//!
//! Loaded from a TOML file; every key is optional and falls back to the
//! defaults below.
//!
//! ```toml
//! snapshot_ttl_hours = 168
//! table_timeout_ms = 30000
//! busy_timeout_ms = 5000
//! history_limit = 50
//! changelog_page_size = 500
//! logging_profile = "production"
//! ```

use crate::errors::{PitrError, Result};
use crate::logging_facility::Profile;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Lifetime of a snapshot before cleanup may delete it
    pub snapshot_ttl_hours: u32,
    /// Budget for restoring a single table
    pub table_timeout_ms: u64,
    /// SQLite busy timeout for cross-connection lease contention
    pub busy_timeout_ms: u64,
    /// Default number of records returned by rollback history
    pub history_limit: usize,
    /// Rows fetched per page by the change-log cursor
    pub changelog_page_size: usize,
    pub logging_profile: Profile,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_hours: 168,
            table_timeout_ms: 30_000,
            busy_timeout_ms: 5_000,
            history_limit: 50,
            changelog_page_size: 500,
            logging_profile: Profile::Development,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(input).map_err(|e| PitrError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| PitrError::InvalidConfig {
            reason: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.snapshot_ttl_hours == 0 {
            return Err(PitrError::InvalidConfig {
                reason: "snapshot_ttl_hours must be greater than zero".to_string(),
            });
        }
        if self.changelog_page_size == 0 {
            return Err(PitrError::InvalidConfig {
                reason: "changelog_page_size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn snapshot_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.snapshot_ttl_hours))
    }

    pub fn table_timeout(&self) -> Duration {
        Duration::from_millis(self.table_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
