//! # Runtime Configuration
//!
//! One TOML file for the whole runtime:
//!
//! ```toml
//! [pressure]
//! cooldown_secs = 5.0
//!
//! [pressure.thresholds]
//! base = 512.0
//! warning = 768.0
//! critical = 1024.0
//! emergency = 1536.0
//!
//! [registry]
//! stats_interval_secs = 1.0
//!
//! [projectiles]
//! initial_size = 64
//! max_size = 512
//! ```
//!
//! Every table is optional. Without a file, [`RuntimeConfig::detect`] derives
//! the thresholds from the machine's total memory.

use std::path::Path;

use bulwark_core::{PoolSettings, RegistryConfig};
use bulwark_pressure::{PressureConfig, SystemMemorySampler};
use serde::{Deserialize, Serialize};

use crate::error::BulwarkResult;

/// Configuration for [`Runtime`](crate::Runtime).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pressure controller settings.
    pub pressure: PressureConfig,
    /// Registry settings.
    pub registry: RegistryConfig,
    /// Capacity of the projectile pool.
    pub projectiles: PoolSettings,
}

impl RuntimeConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`BulwarkError::ConfigParse`](crate::BulwarkError::ConfigParse)
    /// for malformed TOML, and the pressure or pool validation error for
    /// inconsistent values.
    pub fn from_toml_str(source: &str) -> BulwarkResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.pressure.validate()?;
        config.projectiles.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// As [`from_toml_str`](Self::from_toml_str), plus
    /// [`BulwarkError::ConfigIo`](crate::BulwarkError::ConfigIo) if the file
    /// cannot be read.
    pub fn from_toml_file(path: impl AsRef<Path>) -> BulwarkResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Defaults, with thresholds scaled to the machine's total memory when
    /// `system` can report it.
    #[must_use]
    pub fn detect(system: &dyn SystemMemorySampler) -> Self {
        let pressure = match system.total_system_memory_mb() {
            Some(total_mb) => {
                tracing::info!(total_mb, "scaling pressure thresholds to system memory");
                PressureConfig::for_system_memory(total_mb)
            }
            None => {
                tracing::warn!("system memory unknown, using default pressure thresholds");
                PressureConfig::default()
            }
        };

        Self {
            pressure,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BulwarkError;
    use bulwark_pressure::Thresholds;

    struct Machine(Option<f64>);

    impl SystemMemorySampler for Machine {
        fn total_system_memory_mb(&self) -> Option<f64> {
            self.0
        }
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(RuntimeConfig::from_toml_str("").unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_nested_tables() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [pressure]
            max_attempts = 4

            [pressure.thresholds]
            base = 300.0
            warning = 400.0
            critical = 500.0
            emergency = 600.0

            [registry]
            stats_interval_secs = 0.25

            [projectiles]
            initial_size = 8
            max_size = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.pressure.max_attempts, 4);
        assert_eq!(
            config.pressure.thresholds,
            Thresholds::new(300.0, 400.0, 500.0, 600.0)
        );
        assert_eq!(config.registry.stats_interval_secs, 0.25);
        assert_eq!(config.projectiles, PoolSettings::new(8, 64));
    }

    #[test]
    fn test_bad_pool_capacity_is_rejected() {
        let err = RuntimeConfig::from_toml_str(
            r#"
            [projectiles]
            initial_size = 100
            max_size = 10
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, BulwarkError::Pool(_)));
    }

    #[test]
    fn test_detect_scales_with_machine() {
        let config = RuntimeConfig::detect(&Machine(Some(16_384.0)));
        assert_eq!(config.pressure.thresholds, Thresholds::default().scaled(2.0));

        let unknown = RuntimeConfig::detect(&Machine(None));
        assert_eq!(unknown.pressure.thresholds, Thresholds::default());
    }
}
