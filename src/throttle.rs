//! Throttling and thermal-drop detection
//!
//! Runs are bracketed by two throughput probes; the relative drop between them,
//! the thermal state and the power mode feed a stutter-risk forecast.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sensors::ThermalLevel;

/// Percentage slowdown between two probes, floored at 0.
///
/// Returns 0 when `start` is zero or either value is not finite.
pub fn speed_drop_percent(start: f64, end: f64) -> f64 {
    if !start.is_finite() || !end.is_finite() || start <= 0.0 {
        return 0.0;
    }
    ((start - end) / start * 100.0).max(0.0)
}

/// `last / first * 100`, or 0 when `first` is zero.
pub fn stability_percent(first: u32, last: u32) -> f64 {
    if first == 0 {
        return 0.0;
    }
    last as f64 / first as f64 * 100.0
}

/// Forecast of frame-pacing problems in games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StutterRisk {
    Low,
    Medium,
    High,
}

impl StutterRisk {
    pub fn label(&self) -> &'static str {
        match self {
            StutterRisk::Low => "low",
            StutterRisk::Medium => "medium",
            StutterRisk::High => "high",
        }
    }
}

impl fmt::Display for StutterRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tunable cutoffs for [`classify_stutter_risk`]. The rule order is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StutterThresholds {
    /// Speed drop (%) at or above which risk is high.
    pub high_drop_percent: f64,
    /// Speed drop (%) at or above which risk is at least medium.
    pub medium_drop_percent: f64,
    /// Under serious thermals, GPU stability below this is high risk (else medium).
    pub serious_stability_percent: f64,
    /// Under fair/nominal thermals, GPU stability below this is medium risk (else low).
    pub nominal_stability_percent: f64,
}

impl Default for StutterThresholds {
    fn default() -> Self {
        Self {
            high_drop_percent: 25.0,
            medium_drop_percent: 15.0,
            serious_stability_percent: 80.0,
            nominal_stability_percent: 70.0,
        }
    }
}

/// Inputs to the stutter-risk forecast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StutterInputs {
    pub low_power_mode: bool,
    pub speed_drop_percent: f64,
    pub thermal_state: ThermalLevel,
    pub gpu_stability_percent: f64,
}

/// First matching rule wins:
/// 1. low-power mode → high
/// 2. drop ≥ high cutoff → high
/// 3. drop ≥ medium cutoff → medium
/// 4. thermal lookup refined by GPU stability
pub fn classify_stutter_risk(inputs: &StutterInputs, thresholds: &StutterThresholds) -> StutterRisk {
    if inputs.low_power_mode {
        return StutterRisk::High;
    }
    if inputs.speed_drop_percent >= thresholds.high_drop_percent {
        return StutterRisk::High;
    }
    if inputs.speed_drop_percent >= thresholds.medium_drop_percent {
        return StutterRisk::Medium;
    }

    match inputs.thermal_state {
        ThermalLevel::Critical => StutterRisk::High,
        ThermalLevel::Serious => {
            if inputs.gpu_stability_percent < thresholds.serious_stability_percent {
                StutterRisk::High
            } else {
                StutterRisk::Medium
            }
        }
        ThermalLevel::Fair | ThermalLevel::Nominal => {
            if inputs.gpu_stability_percent < thresholds.nominal_stability_percent {
                StutterRisk::Medium
            } else {
                StutterRisk::Low
            }
        }
    }
}

/// Qualitative reading of a sustained run's stability percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StabilityVerdict {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl StabilityVerdict {
    pub fn from_percent(stability: f64) -> Self {
        if stability >= 95.0 {
            StabilityVerdict::Excellent
        } else if stability >= 85.0 {
            StabilityVerdict::Good
        } else if stability >= 70.0 {
            StabilityVerdict::Fair
        } else {
            StabilityVerdict::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StabilityVerdict::Poor => "poor",
            StabilityVerdict::Fair => "fair",
            StabilityVerdict::Good => "good",
            StabilityVerdict::Excellent => "excellent",
        }
    }
}

impl fmt::Display for StabilityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stability below this, or a speed drop at or above the medium cutoff, counts as throttling.
pub const THROTTLING_STABILITY_PERCENT: f64 = 90.0;

pub fn throttling_detected(stability: f64, speed_drop: f64, thresholds: &StutterThresholds) -> bool {
    stability < THROTTLING_STABILITY_PERCENT || speed_drop >= thresholds.medium_drop_percent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(low_power: bool, drop: f64, thermal: ThermalLevel, stability: f64) -> StutterInputs {
        StutterInputs {
            low_power_mode: low_power,
            speed_drop_percent: drop,
            thermal_state: thermal,
            gpu_stability_percent: stability,
        }
    }

    #[test]
    fn test_speed_drop_scenario() {
        let drop = speed_drop_percent(100_000.0, 80_000.0);
        assert!((drop - 20.0).abs() < 1e-9);

        let risk = classify_stutter_risk(
            &inputs(false, drop, ThermalLevel::Serious, 99.0),
            &StutterThresholds::default(),
        );
        assert_eq!(risk, StutterRisk::Medium);
    }

    #[test]
    fn test_zero_guards_never_produce_nan() {
        assert_eq!(speed_drop_percent(0.0, 80_000.0), 0.0);
        assert_eq!(speed_drop_percent(0.0, 0.0), 0.0);
        assert_eq!(speed_drop_percent(f64::NAN, 1.0), 0.0);
        assert_eq!(stability_percent(0, 8_520), 0.0);
        assert_eq!(stability_percent(0, 0), 0.0);
    }

    #[test]
    fn test_speed_gain_is_not_a_drop() {
        assert_eq!(speed_drop_percent(100.0, 150.0), 0.0);
    }

    #[test]
    fn test_stability_scenario() {
        let stability = stability_percent(8_748, 8_520);
        assert!((stability - 97.3936).abs() < 0.01);
        assert_eq!(StabilityVerdict::from_percent(stability), StabilityVerdict::Excellent);
    }

    #[test]
    fn test_low_power_mode_dominates_everything() {
        let risk = classify_stutter_risk(
            &inputs(true, 0.0, ThermalLevel::Nominal, 100.0),
            &StutterThresholds::default(),
        );
        assert_eq!(risk, StutterRisk::High);
    }

    #[test]
    fn test_large_drop_dominates_cool_device() {
        let thresholds = StutterThresholds::default();
        assert_eq!(
            classify_stutter_risk(&inputs(false, 25.0, ThermalLevel::Nominal, 100.0), &thresholds),
            StutterRisk::High
        );
        assert_eq!(
            classify_stutter_risk(&inputs(false, 15.0, ThermalLevel::Nominal, 100.0), &thresholds),
            StutterRisk::Medium
        );
        // medium drop still wins over a critical thermal state
        assert_eq!(
            classify_stutter_risk(&inputs(false, 16.0, ThermalLevel::Critical, 100.0), &thresholds),
            StutterRisk::Medium
        );
    }

    #[test]
    fn test_thermal_lookup_uses_gpu_stability() {
        let thresholds = StutterThresholds::default();
        let classify = |thermal, stability| {
            classify_stutter_risk(&inputs(false, 0.0, thermal, stability), &thresholds)
        };
        assert_eq!(classify(ThermalLevel::Critical, 100.0), StutterRisk::High);
        assert_eq!(classify(ThermalLevel::Serious, 79.9), StutterRisk::High);
        assert_eq!(classify(ThermalLevel::Serious, 80.0), StutterRisk::Medium);
        assert_eq!(classify(ThermalLevel::Fair, 69.0), StutterRisk::Medium);
        assert_eq!(classify(ThermalLevel::Nominal, 90.0), StutterRisk::Low);
    }

    #[test]
    fn test_thresholds_are_tunable() {
        let strict = StutterThresholds {
            medium_drop_percent: 5.0,
            ..StutterThresholds::default()
        };
        assert_eq!(
            classify_stutter_risk(&inputs(false, 6.0, ThermalLevel::Nominal, 100.0), &strict),
            StutterRisk::Medium
        );
    }

    #[test]
    fn test_throttling_flag() {
        let thresholds = StutterThresholds::default();
        assert!(!throttling_detected(97.4, 2.0, &thresholds));
        assert!(throttling_detected(85.0, 0.0, &thresholds));
        assert!(throttling_detected(99.0, 20.0, &thresholds));
    }
}
