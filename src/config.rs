//! Tracker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, TrackerError};

/// Location accuracy requested from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Accuracy {
    Lowest,
    Low,
    Balanced,
    High,
    Highest,
    BestForNavigation,
}

/// Options passed to a location stream subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchOptions {
    /// Requested accuracy class.
    /// Default: BestForNavigation
    pub accuracy: Accuracy,

    /// Minimum time between delivered fixes, in milliseconds.
    /// Default: 1000
    pub min_interval_ms: u32,

    /// Minimum movement between delivered fixes, in meters.
    /// Default: 1.0
    pub min_distance_meters: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::BestForNavigation,
            min_interval_ms: 1000,
            min_distance_meters: 1.0,
        }
    }
}

/// Configuration for a [`crate::Tracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    /// Location subscription options used on start and resume.
    pub watch: WatchOptions,

    /// Detail-entry window after a pin is dropped, in seconds.
    /// Default: 10
    pub pin_initial_window_secs: u64,

    /// Detail-entry window after each edit, in seconds. Measured from the
    /// most recent edit, not from the drop.
    /// Default: 30
    pub pin_edit_window_secs: u64,

    /// Edge padding (screen points) attached to fit-to-bounds requests.
    /// Default: 50.0
    pub fit_edge_padding: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            watch: WatchOptions::default(),
            pin_initial_window_secs: 10,
            pin_edit_window_secs: 30,
            fit_edge_padding: 50.0,
        }
    }
}

impl TrackerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pin_initial_window_secs == 0 || self.pin_edit_window_secs == 0 {
            return Err(TrackerError::Config {
                message: "pin windows must be at least one second".to_string(),
            });
        }
        if !(self.watch.min_distance_meters >= 0.0) {
            return Err(TrackerError::Config {
                message: format!(
                    "min_distance_meters must be non-negative, got {}",
                    self.watch.min_distance_meters
                ),
            });
        }
        if !(self.fit_edge_padding >= 0.0) {
            return Err(TrackerError::Config {
                message: format!(
                    "fit_edge_padding must be non-negative, got {}",
                    self.fit_edge_padding
                ),
            });
        }
        Ok(())
    }

    pub fn pin_initial_window(&self) -> Duration {
        Duration::from_secs(self.pin_initial_window_secs)
    }

    pub fn pin_edit_window(&self) -> Duration {
        Duration::from_secs(self.pin_edit_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_windows() {
        let config = TrackerConfig::default();
        assert_eq!(config.watch.accuracy, Accuracy::BestForNavigation);
        assert_eq!(config.watch.min_interval_ms, 1000);
        assert_eq!(config.pin_initial_window(), Duration::from_secs(10));
        assert_eq!(config.pin_edit_window(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            TrackerConfig::from_json(r#"{"pinEditWindowSecs": 45, "watch": {"accuracy": "high"}}"#)
                .unwrap();
        assert_eq!(config.pin_edit_window_secs, 45);
        assert_eq!(config.pin_initial_window_secs, 10);
        assert_eq!(config.watch.accuracy, Accuracy::High);
        assert_eq!(config.watch.min_interval_ms, 1000);
    }

    #[test]
    fn test_rejects_zero_window() {
        let err = TrackerConfig::from_json(r#"{"pinInitialWindowSecs": 0}"#).unwrap_err();
        assert!(matches!(err, TrackerError::Config { .. }));
    }

    #[test]
    fn test_rejects_nan_distance() {
        let mut config = TrackerConfig::default();
        config.watch.min_distance_meters = f64::NAN;
        assert!(config.validate().is_err());
    }
}
