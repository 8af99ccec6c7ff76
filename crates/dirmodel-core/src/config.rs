/// Tunables for the directory model, loadable from JSON.
use crate::error::{ModelError, Result};
use crate::model::EntryUrl;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Delay for explicit refreshes and for the pending-rescan follow-up.
pub const SHORT_RESCAN_INTERVAL_MS: u64 = 100;

/// Delay for watcher-driven refreshes, where a burst of notifications is
/// expected inside a short window.
pub const LONG_RESCAN_INTERVAL_MS: u64 = 500;

/// Upper bound for either rescan interval (one day).
pub const MAX_RESCAN_INTERVAL_MS: u64 = 24 * 60 * 60 * 1_000;

/// Entries per `ScanUpdated` batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Automatic retries after a failed scan before the failure sticks.
pub const DEFAULT_MAX_SCAN_RETRIES: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub short_rescan_interval_ms: u64,
    pub long_rescan_interval_ms: u64,
    pub batch_size: usize,
    pub max_scan_retries: u32,
    /// Where to navigate after the requested directory cannot be resolved.
    /// `None` uses the storage backend's default root.
    pub fallback_root: Option<EntryUrl>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            short_rescan_interval_ms: SHORT_RESCAN_INTERVAL_MS,
            long_rescan_interval_ms: LONG_RESCAN_INTERVAL_MS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_scan_retries: DEFAULT_MAX_SCAN_RETRIES,
            fallback_root: None,
        }
    }
}

impl ModelConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ModelConfig =
            serde_json::from_str(json).map_err(|e| ModelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ModelError::Config("batch_size must be > 0".into()));
        }
        for (name, value) in [
            ("short_rescan_interval_ms", self.short_rescan_interval_ms),
            ("long_rescan_interval_ms", self.long_rescan_interval_ms),
        ] {
            if value > MAX_RESCAN_INTERVAL_MS {
                return Err(ModelError::Config(format!(
                    "{name} must be at most {MAX_RESCAN_INTERVAL_MS}"
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn short_rescan_interval(&self) -> Duration {
        Duration::from_millis(self.short_rescan_interval_ms)
    }

    #[inline]
    pub fn long_rescan_interval(&self) -> Duration {
        Duration::from_millis(self.long_rescan_interval_ms)
    }
}
