//! # Pressure Tiers
//!
//! ```text
//!   usage (MB)
//!   ──────────┬──────────────┬───────────────┬────────────────┬──────────>
//!            warning      critical        emergency
//!   Nominal   │   Warning    │   Critical    │   Emergency
//!   (none)    │ (preemptive) │ (aggressive)  │ (emergency)
//! ```
//!
//! Boundaries belong to the lower tier: `usage == warning` is still Nominal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of current memory usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PressureTier {
    /// At or below the warning threshold. No action.
    #[default]
    Nominal,
    /// Above warning, at or below critical. Preemptive cleanup.
    Warning,
    /// Above critical, at or below emergency. Aggressive cleanup.
    Critical,
    /// Above emergency. Emergency cleanup, sessions refused.
    Emergency,
}

impl PressureTier {
    /// Short uppercase label for logs and overlays.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Nominal => "NOMINAL",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for PressureTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The four ascending thresholds, in MB.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Expected steady-state usage; also the reference for baseline scaling.
    pub base: f64,
    /// Upper bound of Nominal.
    pub warning: f64,
    /// Upper bound of Warning.
    pub critical: f64,
    /// Upper bound of Critical.
    pub emergency: f64,
}

impl Thresholds {
    /// Creates a threshold set.
    #[must_use]
    pub const fn new(base: f64, warning: f64, critical: f64, emergency: f64) -> Self {
        Self {
            base,
            warning,
            critical,
            emergency,
        }
    }

    /// Whether every value is finite, positive and `base <= warning <= critical <= emergency`.
    #[must_use]
    pub fn is_ordered(&self) -> bool {
        let values = [self.base, self.warning, self.critical, self.emergency];
        values.iter().all(|v| v.is_finite() && *v > 0.0)
            && values.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Multiplies every threshold by `factor`.
    #[must_use]
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            base: self.base * factor,
            warning: self.warning * factor,
            critical: self.critical * factor,
            emergency: self.emergency * factor,
        }
    }

    /// Classifies `usage_mb`.
    #[must_use]
    pub fn classify(&self, usage_mb: f64) -> PressureTier {
        if usage_mb <= self.warning {
            PressureTier::Nominal
        } else if usage_mb <= self.critical {
            PressureTier::Warning
        } else if usage_mb <= self.emergency {
            PressureTier::Critical
        } else {
            PressureTier::Emergency
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::new(512.0, 768.0, 1024.0, 1536.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_bands() {
        let t = Thresholds::new(100.0, 150.0, 175.0, 200.0);

        assert_eq!(t.classify(90.0), PressureTier::Nominal);
        assert_eq!(t.classify(150.0), PressureTier::Nominal);
        assert_eq!(t.classify(160.0), PressureTier::Warning);
        assert_eq!(t.classify(175.0), PressureTier::Warning);
        assert_eq!(t.classify(180.0), PressureTier::Critical);
        assert_eq!(t.classify(200.0), PressureTier::Critical);
        assert_eq!(t.classify(210.0), PressureTier::Emergency);
    }

    #[test]
    fn test_ordering_check() {
        assert!(Thresholds::default().is_ordered());
        assert!(Thresholds::new(100.0, 100.0, 100.0, 100.0).is_ordered());
        assert!(!Thresholds::new(100.0, 90.0, 175.0, 200.0).is_ordered());
        assert!(!Thresholds::new(100.0, 150.0, f64::NAN, 200.0).is_ordered());
        assert!(!Thresholds::new(0.0, 150.0, 175.0, 200.0).is_ordered());
    }

    #[test]
    fn test_scaling_preserves_order() {
        let scaled = Thresholds::new(100.0, 150.0, 175.0, 200.0).scaled(2.0);

        assert_eq!(scaled, Thresholds::new(200.0, 300.0, 350.0, 400.0));
        assert_eq!(scaled.classify(320.0), PressureTier::Warning);
    }

    #[test]
    fn test_tiers_are_ordered_by_severity() {
        assert!(PressureTier::Nominal < PressureTier::Warning);
        assert!(PressureTier::Critical < PressureTier::Emergency);
        assert_eq!(PressureTier::Critical.to_string(), "CRITICAL");
    }
}
