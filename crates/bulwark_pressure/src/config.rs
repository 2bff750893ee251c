//! # Pressure Configuration
//!
//! Loaded once at startup, either from a TOML table or derived from the
//! machine's total memory.
//!
//! ```toml
//! sample_interval_secs = 0.5
//! settle_delay_secs = 5.0
//! cooldown_secs = 5.0
//! max_attempts = 3
//!
//! [thresholds]
//! base = 512.0
//! warning = 768.0
//! critical = 1024.0
//! emergency = 1536.0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PressureError, PressureResult};
use crate::tier::Thresholds;

/// Total memory the default thresholds are calibrated for, in MB.
pub const REFERENCE_SYSTEM_MEMORY_MB: f64 = 8192.0;

/// Bounds on the system-memory scale factor.
const SYSTEM_SCALE_RANGE: (f64, f64) = (0.5, 4.0);

/// Configuration for [`MemoryPressureMonitor`](crate::MemoryPressureMonitor).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    /// Time between two memory samples.
    pub sample_interval_secs: f64,
    /// Samples younger than this (counted from the first tick) are ignored.
    pub settle_delay_secs: f64,
    /// Minimum time between preemptive cleanups; aggressive cleanups use half.
    pub cooldown_secs: f64,
    /// Aggressive attempts before escalating straight to emergency.
    pub max_attempts: u32,
    /// Collection passes in an aggressive cleanup, one per generation.
    pub collection_generations: u8,
    /// Full collection passes in an emergency cleanup.
    pub emergency_passes: u8,
    /// A preemptive cleanup lowers the baseline when usage drops below
    /// `baseline * baseline_shrink_ratio`.
    pub baseline_shrink_ratio: f64,
    /// Validity checks per sampler candidate before giving up on it.
    pub sampler_probe_attempts: u32,
    /// Capacity of each subscriber's event channel.
    pub event_capacity: usize,
    /// The four tier thresholds, in MB.
    pub thresholds: Thresholds,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 0.5,
            settle_delay_secs: 5.0,
            cooldown_secs: 5.0,
            max_attempts: 3,
            collection_generations: 3,
            emergency_passes: 2,
            baseline_shrink_ratio: 0.9,
            sampler_probe_attempts: 3,
            event_capacity: 64,
            thresholds: Thresholds::default(),
        }
    }
}

impl PressureConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`PressureError::ConfigParse`] for malformed TOML and
    /// [`PressureError::InvalidConfig`] for inconsistent values.
    pub fn from_toml_str(source: &str) -> PressureResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// As [`from_toml_str`](Self::from_toml_str), plus
    /// [`PressureError::ConfigIo`] if the file cannot be read.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PressureResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Default configuration with thresholds recomputed from the machine's
    /// total memory.
    ///
    /// Thresholds scale by `total_mb / 8192`, clamped to `[0.5, 4.0]`.
    /// Non-finite or non-positive readings keep the defaults.
    #[must_use]
    pub fn for_system_memory(total_mb: f64) -> Self {
        let mut config = Self::default();
        if total_mb.is_finite() && total_mb > 0.0 {
            let (min, max) = SYSTEM_SCALE_RANGE;
            let factor = (total_mb / REFERENCE_SYSTEM_MEMORY_MB).clamp(min, max);
            config.thresholds = config.thresholds.scaled(factor);
        }
        config
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`PressureError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> PressureResult<()> {
        if !self.thresholds.is_ordered() {
            return Err(PressureError::InvalidConfig(format!(
                "thresholds must be positive and ascending, got {:?}",
                self.thresholds
            )));
        }
        if !(self.sample_interval_secs.is_finite() && self.sample_interval_secs > 0.0) {
            return Err(PressureError::InvalidConfig(
                "sample_interval_secs must be positive".into(),
            ));
        }
        for (name, value) in [
            ("settle_delay_secs", self.settle_delay_secs),
            ("cooldown_secs", self.cooldown_secs),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PressureError::InvalidConfig(format!(
                    "{name} must be zero or positive"
                )));
            }
        }
        if !(self.baseline_shrink_ratio > 0.0 && self.baseline_shrink_ratio <= 1.0) {
            return Err(PressureError::InvalidConfig(
                "baseline_shrink_ratio must be in (0, 1]".into(),
            ));
        }
        if self.max_attempts == 0 || self.sampler_probe_attempts == 0 {
            return Err(PressureError::InvalidConfig(
                "max_attempts and sampler_probe_attempts must be at least 1".into(),
            ));
        }
        if self.collection_generations == 0 || self.emergency_passes == 0 {
            return Err(PressureError::InvalidConfig(
                "collection_generations and emergency_passes must be at least 1".into(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(PressureError::InvalidConfig(
                "event_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Sampling cadence.
    #[must_use]
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs_f64(self.sample_interval_secs)
    }

    /// Settling window.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs_f64(self.settle_delay_secs)
    }

    /// Preemptive cooldown.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_secs)
    }
}
