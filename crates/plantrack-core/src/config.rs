//! Tracker configuration that every process owns a runtime-settable copy of.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Work modes:
/// - `Normal` - track a query when the `log_min_error` threshold is exceeded
/// - `Forced` - track every query
/// - `Disabled` - track nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackMode {
    Normal,
    Forced,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub mode: TrackMode,

    /// Minimum average estimation error that triggers the plan report
    /// callback (and, in `Normal` mode, storage). `-1.0` disables report
    /// emission; zero reports every plan.
    pub log_min_error: f64,

    /// Upper bound on shared-table memory, in KB. Capacity in entries is
    /// `hash_mem_kb * 1024 / sizeof(entry)`.
    pub hash_mem_kb: usize,

    /// Run the checkpoint flush from the process-exit hook.
    pub auto_flush: bool,

    /// Name of the shared region all processes rendezvous on.
    pub region: String,

    /// Directory holding the checkpoint file.
    pub stats_dir: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            mode: TrackMode::Disabled,
            log_min_error: -1.0,
            hash_mem_kb: 4096,
            auto_flush: true,
            region: "plantrack".to_string(),
            stats_dir: PathBuf::from("."),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.log_min_error < -1.0 {
            return Err(Error::BadInput(format!(
                "log_min_error must be >= -1, got {}",
                self.log_min_error
            )));
        }
        if self.region.is_empty() {
            return Err(Error::BadInput("region name must not be empty".into()));
        }
        Ok(())
    }

    /// Whether executions should be instrumented and assessed at all.
    /// `Normal` mode with report emission disabled has nothing to do.
    pub fn tracking_enabled(&self) -> bool {
        match self.mode {
            TrackMode::Disabled => false,
            TrackMode::Forced => true,
            TrackMode::Normal => self.log_min_error >= 0.0,
        }
    }
}
