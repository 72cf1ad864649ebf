//! # Configuration Module
//!
//! Explicit configuration handed to each component at construction. Every section has
//! defaults, so a config file only needs the values it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TunerError;

/// Longest accepted timed reference tone, in seconds.
pub const MAX_TIMED_TONE_SECONDS: f64 = 3600.0;

/// Default location of the persisted reference pitch.
pub const DEFAULT_STORAGE_PATH: &str = "tuner_settings.json";

/// Top-level configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TunerConfig {
    pub bus: BusConfig,
    pub audio: AudioConfig,
    pub tuner: TunerSettings,
    /// Where the reference pitch is stored. `None` uses [`DEFAULT_STORAGE_PATH`].
    pub storage_path: Option<PathBuf>,
}

impl TunerConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: TunerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TunerError> {
        self.audio.validate()?;
        self.tuner.validate()
    }

    pub fn storage_path(&self) -> PathBuf {
        self.storage_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH))
    }
}

/// Event bus behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BusConfig {
    /// Trace every registration and emit at debug level.
    pub debug_mode: bool,
    /// Soft limit of listeners per event kind. Exceeding it only warns.
    pub max_listeners: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            max_listeners: 10,
        }
    }
}

/// Audio engine settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output gain of the reference tone (0-1).
    pub tone_gain: f32,
    /// Length of the fade in/out ramps, in seconds.
    pub fade_seconds: f32,
    /// Capacity of the channel carrying input level measurements.
    pub level_channel_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            tone_gain: 0.1,
            fade_seconds: 0.01,
            level_channel_capacity: 64,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<(), TunerError> {
        if !(self.tone_gain > 0.0 && self.tone_gain <= 1.0) {
            return Err(TunerError::invalid_config("tone_gain must be in (0.0, 1.0]"));
        }
        if !(0.0..=1.0).contains(&self.fade_seconds) {
            return Err(TunerError::invalid_config("fade_seconds must be between 0.0 and 1.0"));
        }
        if self.level_channel_capacity == 0 {
            return Err(TunerError::invalid_config("level_channel_capacity must be >= 1"));
        }
        Ok(())
    }
}

/// Tuning indicator settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TunerSettings {
    /// Largest deviation still attributed to a string, and the meter's full scale.
    pub max_deviation_cents: f64,
    /// A string counts as tuned below this deviation.
    pub tuned_tolerance_cents: f64,
    /// Input below this level is treated as silence.
    pub silence_threshold_db: f64,
    /// Number of readings averaged for display.
    pub smoothing_window: usize,
    /// Number of consecutive readings checked for stability.
    pub stabilization_count: usize,
    /// Maximum spread of a stable reading, in cents.
    pub stabilization_tolerance_cents: f64,
    /// Length of a timed reference tone, in seconds.
    pub timed_tone_seconds: f64,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            max_deviation_cents: 50.0,
            tuned_tolerance_cents: 5.0,
            silence_threshold_db: -50.0,
            smoothing_window: 5,
            stabilization_count: 5,
            stabilization_tolerance_cents: 1.0,
            timed_tone_seconds: 2.0,
        }
    }
}

impl TunerSettings {
    pub fn validate(&self) -> Result<(), TunerError> {
        if !(self.max_deviation_cents > 0.0) {
            return Err(TunerError::invalid_config("max_deviation_cents must be positive"));
        }
        if !(self.tuned_tolerance_cents > 0.0 && self.tuned_tolerance_cents <= self.max_deviation_cents) {
            return Err(TunerError::invalid_config(
                "tuned_tolerance_cents must be positive and not above max_deviation_cents",
            ));
        }
        if self.smoothing_window == 0 || self.stabilization_count == 0 {
            return Err(TunerError::invalid_config(
                "smoothing_window and stabilization_count must be >= 1",
            ));
        }
        if !(self.timed_tone_seconds > 0.0 && self.timed_tone_seconds <= MAX_TIMED_TONE_SECONDS) {
            return Err(TunerError::invalid_config(format!(
                "timed_tone_seconds must be in (0, {}]",
                MAX_TIMED_TONE_SECONDS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = TunerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bus.max_listeners, 10);
        assert_eq!(config.storage_path(), PathBuf::from(DEFAULT_STORAGE_PATH));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "bus": {{ "debug_mode": true }}, "tuner": {{ "tuned_tolerance_cents": 2.5 }} }}"#).unwrap();

        let config = TunerConfig::load(file.path()).unwrap();
        assert!(config.bus.debug_mode);
        assert_eq!(config.bus.max_listeners, 10);
        assert_eq!(config.tuner.tuned_tolerance_cents, 2.5);
        assert_eq!(config.tuner.max_deviation_cents, 50.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "audio": {{ "tone_gain": 1.5 }} }}"#).unwrap();
        assert!(TunerConfig::load(file.path()).is_err());

        let settings = TunerSettings {
            smoothing_window: 0,
            ..TunerSettings::default()
        };
        assert!(matches!(settings.validate(), Err(TunerError::InvalidConfig { .. })));
    }

    #[test]
    fn oversized_tone_length_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "tuner": {{ "timed_tone_seconds": 1e30 }} }}"#).unwrap();
        assert!(TunerConfig::load(file.path()).is_err());

        for seconds in [f64::INFINITY, f64::NAN, 0.0, MAX_TIMED_TONE_SECONDS + 1.0] {
            let settings = TunerSettings {
                timed_tone_seconds: seconds,
                ..TunerSettings::default()
            };
            assert!(settings.validate().is_err(), "{} accepted", seconds);
        }

        let longest = TunerSettings {
            timed_tone_seconds: MAX_TIMED_TONE_SECONDS,
            ..TunerSettings::default()
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(TunerConfig::load("/nonexistent/tuner_config.json").is_err());
    }
}
