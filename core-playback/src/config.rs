//! # Orchestrator Configuration
//!
//! Tunables for the playback orchestrator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How often position/duration is reported while playing.
    ///
    /// Default: 1 second.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: Duration,

    /// Draws made by the shuffle rule before a repeat of the current track
    /// is accepted.
    ///
    /// Default: 10.
    #[serde(default = "default_shuffle_max_draws")]
    pub shuffle_max_draws: u32,

    /// Two play/pause presses closer than this count as a double tap.
    ///
    /// Default: 300ms.
    #[serde(default = "default_double_tap_window")]
    pub double_tap_window: Duration,

    /// Play the offline copy of a track instead of streaming when one exists.
    ///
    /// Default: true.
    #[serde(default = "default_prefer_local_playback")]
    pub prefer_local_playback: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
            shuffle_max_draws: default_shuffle_max_draws(),
            double_tap_window: default_double_tap_window(),
            prefer_local_playback: default_prefer_local_playback(),
        }
    }
}

impl OrchestratorConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.progress_interval.is_zero() {
            return Err("progress_interval must be > 0".to_string());
        }

        if self.shuffle_max_draws == 0 {
            return Err("shuffle_max_draws must be > 0".to_string());
        }

        if self.double_tap_window.is_zero() {
            return Err("double_tap_window must be > 0".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_progress_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_shuffle_max_draws() -> u32 {
    10
}

fn default_double_tap_window() -> Duration {
    Duration::from_millis(300)
}

fn default_prefer_local_playback() -> bool {
    true
}
