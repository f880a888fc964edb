//! Metric source adapters
//!
//! The benchmark core reads the environment only through [`MetricSource`]: thermal
//! level, a one-shot CPU throughput probe, power mode, battery and parallelism.
//! [`SystemSensors`] is the host implementation; tests inject scripted sources.

mod device;
mod system;

pub use device::DeviceInfo;
pub use system::SystemSensors;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hint::black_box;
use std::time::Instant;

/// Device thermal pressure, ordered from coolest to hottest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalLevel {
    Nominal,
    Fair,
    Serious,
    Critical,
}

impl ThermalLevel {
    /// Map a die temperature in °C to a level.
    pub fn from_celsius(celsius: f32) -> Self {
        if celsius >= 90.0 {
            ThermalLevel::Critical
        } else if celsius >= 75.0 {
            ThermalLevel::Serious
        } else if celsius >= 60.0 {
            ThermalLevel::Fair
        } else {
            ThermalLevel::Nominal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ThermalLevel::Nominal => "nominal",
            ThermalLevel::Fair => "fair",
            ThermalLevel::Serious => "serious",
            ThermalLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for ThermalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scalar queries the core needs from the host platform.
///
/// Every call is synchronous and cheap except [`MetricSource::cpu_throughput_probe`],
/// which runs a short fixed workload.
pub trait MetricSource: Send + Sync {
    fn current_thermal_state(&self) -> ThermalLevel;

    /// Relative CPU speed; units only need to be consistent within one run.
    fn cpu_throughput_probe(&self) -> f64;

    fn is_low_power_mode_active(&self) -> bool;

    fn battery_level_percent(&self) -> u8;

    fn available_parallelism(&self) -> usize;
}

/// Iterations of the probe loop. Small enough to finish in a few milliseconds.
pub const PROBE_ITERATIONS: u64 = 2_000_000;

/// Run the fixed probe workload and return iterations per millisecond.
pub fn run_throughput_probe(iterations: u64) -> f64 {
    let start = Instant::now();
    let mut x: u64 = 0x9e37_79b9_7f4a_7c15;
    for i in 0..iterations {
        x ^= x >> 12;
        x = x.wrapping_mul(0x2545_F491_4F6C_DD1D);
        x ^= x << 25;
        x = x.wrapping_add(i);
    }
    black_box(x);

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    if elapsed_ms <= 0.0 {
        return 0.0;
    }
    iterations as f64 / elapsed_ms
}
