//! Device identity
//!
//! Detects the strings embedded in every report using the sysinfo crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use sysinfo::System;

/// Identity of the device a report was produced on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// CPU name (e.g., "AMD Ryzen 7 5800X")
    pub cpu_name: String,
    /// CPU vendor
    pub cpu_vendor: String,
    /// Number of physical cores
    pub cores: usize,
    /// Number of logical threads
    pub threads: usize,
    /// Total memory in MB
    pub memory_mb: u64,
    /// Operating system
    pub os: String,
    /// OS version
    pub os_version: Option<String>,
    /// Host name, when the platform exposes one
    pub host_name: Option<String>,
}

impl DeviceInfo {
    /// Detect identity of the running host. Missing fields fall back to "Unknown".
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let cpus = sys.cpus();
        let (cpu_name, cpu_vendor) = match cpus.first() {
            Some(cpu) => (cpu.brand().trim().to_string(), cpu.vendor_id().to_string()),
            None => ("Unknown".to_string(), "Unknown".to_string()),
        };
        let threads = cpus.len().max(1);
        let cores = sys.physical_core_count().unwrap_or(threads);

        DeviceInfo {
            cpu_name: if cpu_name.is_empty() {
                "Unknown".to_string()
            } else {
                cpu_name
            },
            cpu_vendor,
            cores,
            threads,
            memory_mb: sys.total_memory() / 1024 / 1024, // bytes to MB
            os: System::name().unwrap_or_else(|| "Unknown".to_string()),
            os_version: System::os_version(),
            host_name: System::host_name(),
        }
    }

    /// Fixed identity for tests and offline rendering.
    pub fn placeholder() -> Self {
        DeviceInfo {
            cpu_name: "Test CPU".to_string(),
            cpu_vendor: "Test".to_string(),
            cores: 4,
            threads: 8,
            memory_mb: 8192,
            os: "TestOS".to_string(),
            os_version: Some("1.0".to_string()),
            host_name: None,
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CPU: {} ({})", self.cpu_name, self.cpu_vendor)?;
        writeln!(f, "     {} cores / {} threads", self.cores, self.threads)?;
        writeln!(f, "RAM: {:.1} GB", self.memory_mb as f64 / 1024.0)?;
        match &self.os_version {
            Some(ver) => write!(f, "OS:  {} {}", self.os, ver),
            None => write!(f, "OS:  {}", self.os),
        }
    }
}
