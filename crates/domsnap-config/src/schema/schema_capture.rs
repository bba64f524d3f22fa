//! Capture and action configuration types.

use serde::{Deserialize, Serialize};

use super::default_true;

/// Snapshot capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Pixels beyond the visible viewport still counted as in view. `-1` means unlimited.
    #[serde(default)]
    pub viewport_expansion: i32,

    #[serde(default)]
    pub render_overlay: bool,

    /// Collect per-phase timing counters during capture.
    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_stability_timeout")]
    pub stability_timeout_ms: u64,

    #[serde(default = "default_stability_quiet")]
    pub stability_quiet_ms: u64,

    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    #[serde(default = "default_min_capture_interval")]
    pub min_capture_interval_ms: u64,

    #[serde(default = "default_overlay_throttle")]
    pub overlay_throttle_ms: u64,
}

fn default_stability_timeout() -> u64 {
    5000
}

fn default_stability_quiet() -> u64 {
    500
}

fn default_debounce() -> u64 {
    500
}

fn default_min_capture_interval() -> u64 {
    1000
}

fn default_overlay_throttle() -> u64 {
    16
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            viewport_expansion: 0,
            render_overlay: false,
            debug: false,
            stability_timeout_ms: default_stability_timeout(),
            stability_quiet_ms: default_stability_quiet(),
            debounce_ms: default_debounce(),
            min_capture_interval_ms: default_min_capture_interval(),
            overlay_throttle_ms: default_overlay_throttle(),
        }
    }
}

/// Action execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Wait after each action before the next one runs.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Pause between actions of a batch.
    #[serde(default = "default_action_delay")]
    pub action_delay_ms: u64,

    /// Add `data-id`/`data-qa`/`data-cy`/`data-testid` to locator selectors.
    #[serde(default = "default_true")]
    pub include_dynamic_attributes: bool,
}

fn default_settle_delay() -> u64 {
    100
}

fn default_action_delay() -> u64 {
    100
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            action_delay_ms: default_action_delay(),
            include_dynamic_attributes: true,
        }
    }
}
