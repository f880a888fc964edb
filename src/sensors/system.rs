//! Host metric source
//!
//! Reads:
//! - Linux: /sys/class/thermal, /sys/class/power_supply, ACPI platform_profile
//! - Everywhere: std::thread::available_parallelism
//!
//! Platforms without these files report nominal thermals, a full battery and no
//! low-power mode.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{run_throughput_probe, MetricSource, ThermalLevel, PROBE_ITERATIONS};

/// [`MetricSource`] backed by the running host.
#[derive(Debug, Clone)]
pub struct SystemSensors {
    sys_root: PathBuf,
    probe_iterations: u64,
}

impl Default for SystemSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSensors {
    pub fn new() -> Self {
        Self {
            sys_root: PathBuf::from("/sys"),
            probe_iterations: PROBE_ITERATIONS,
        }
    }

    /// Read sysfs-style files from `root` instead of `/sys`.
    pub fn with_sys_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sys_root: root.into(),
            probe_iterations: PROBE_ITERATIONS,
        }
    }

    /// Hottest thermal zone in °C, if any zone is readable.
    fn hottest_zone_celsius(&self) -> Option<f32> {
        let thermal_dir = self.sys_root.join("class/thermal");
        let entries = fs::read_dir(&thermal_dir).ok()?;

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with("thermal_zone"))
            })
            .filter_map(|entry| read_trimmed(&entry.path().join("temp")))
            .filter_map(|raw| raw.parse::<i64>().ok())
            // sysfs reports millidegrees
            .map(|milli| milli as f32 / 1000.0)
            .filter(|celsius| celsius.is_finite() && *celsius > -50.0)
            .reduce(f32::max)
    }

    fn battery_capacity(&self) -> Option<u8> {
        let supply_dir = self.sys_root.join("class/power_supply");
        let entries = fs::read_dir(&supply_dir).ok()?;

        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            let is_battery = read_trimmed(&path.join("type"))
                .map(|kind| kind.eq_ignore_ascii_case("battery"))
                .unwrap_or(false);
            if !is_battery {
                continue;
            }
            if let Some(capacity) = read_trimmed(&path.join("capacity"))
                .and_then(|raw| raw.parse::<u16>().ok())
            {
                return Some(capacity.min(100) as u8);
            }
        }
        None
    }
}

impl MetricSource for SystemSensors {
    fn current_thermal_state(&self) -> ThermalLevel {
        match self.hottest_zone_celsius() {
            Some(celsius) => {
                let level = ThermalLevel::from_celsius(celsius);
                debug!(celsius, level = %level, "Sampled thermal state");
                level
            }
            None => ThermalLevel::Nominal,
        }
    }

    fn cpu_throughput_probe(&self) -> f64 {
        run_throughput_probe(self.probe_iterations)
    }

    fn is_low_power_mode_active(&self) -> bool {
        read_trimmed(&self.sys_root.join("firmware/acpi/platform_profile"))
            .map(|profile| profile == "low-power" || profile == "quiet")
            .unwrap_or(false)
    }

    fn battery_level_percent(&self) -> u8 {
        self.battery_capacity().unwrap_or(100)
    }

    fn available_parallelism(&self) -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}
