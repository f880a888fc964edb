//! Deterministic stand-ins for sensors, suites, workloads and sinks.

use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bench::{BenchmarkSuite, CpuResult, GpuResult, MemoryResult, RunMode, StorageResult};
use crate::coordinator::{CompositeReport, Coordinator, ReportSink, RunOutcome};
use crate::run::{lock_recover, RunGuard};
use crate::scoring::Grade;
use crate::sensors::{DeviceInfo, MetricSource, ThermalLevel};
use crate::sustained::{
    CycleWorkload, SustainedConfig, SustainedController, SustainedOutcome, SustainedRunResult,
};

/// CPU result with the given total and healthy multi-core scaling.
pub fn cpu_result(total: u32) -> CpuResult {
    CpuResult {
        single_core: total / 2,
        multi_core: total,
        integer: total,
        float: total,
        crypto: total,
        threads: 8,
        total_score: total,
        grade: Grade::from_score(total),
    }
}

pub fn gpu_result(total: u32, stability_percent: f64) -> GpuResult {
    GpuResult {
        backend: "scripted".to_string(),
        frames: 60,
        average_fps: 60.0,
        low_fps: 60.0 * stability_percent / 100.0,
        stability_percent,
        fill_rate_score: total,
        geometry_score: total,
        compute_score: total,
        frame_score: total,
        total_score: total,
        grade: Grade::from_score(total),
    }
}

pub fn memory_result(total: u32) -> MemoryResult {
    MemoryResult {
        read_mb_s: total as f64 * 2.0,
        write_mb_s: total as f64 * 2.0,
        copy_mb_s: total as f64 * 2.0,
        random_ops_per_sec: total as f64 * 5_000.0,
        read_score: total,
        write_score: total,
        copy_score: total,
        random_score: total,
        total_score: total,
        grade: Grade::from_score(total),
    }
}

pub fn storage_result(total: u32, estimated: bool) -> StorageResult {
    StorageResult {
        sequential_write_mb_s: total as f64,
        sequential_read_mb_s: total as f64,
        random_read_iops: total as f64,
        write_score: total,
        read_score: total,
        random_score: total,
        total_score: total,
        grade: Grade::from_score(total),
        estimated,
    }
}

/// Plays back scripted readings in order; the last reading repeats once exhausted.
#[derive(Debug)]
pub struct ScriptedSensors {
    thermals: Mutex<VecDeque<ThermalLevel>>,
    probes: Mutex<VecDeque<f64>>,
    batteries: Mutex<VecDeque<u8>>,
    low_power: bool,
    parallelism: usize,
}

fn next_reading<T: Copy>(queue: &Mutex<VecDeque<T>>, fallback: T) -> T {
    let mut queue = lock_recover(queue);
    if queue.len() > 1 {
        queue.pop_front().unwrap_or(fallback)
    } else {
        queue.front().copied().unwrap_or(fallback)
    }
}

impl ScriptedSensors {
    /// Nominal thermals, a flat 100k probe, full battery.
    pub fn steady() -> Self {
        Self {
            thermals: Mutex::new(VecDeque::from([ThermalLevel::Nominal])),
            probes: Mutex::new(VecDeque::from([100_000.0])),
            batteries: Mutex::new(VecDeque::from([100])),
            low_power: false,
            parallelism: 4,
        }
    }

    pub fn with_thermals(self, thermals: &[ThermalLevel]) -> Self {
        *lock_recover(&self.thermals) = thermals.iter().copied().collect();
        self
    }

    pub fn with_probes(self, probes: &[f64]) -> Self {
        *lock_recover(&self.probes) = probes.iter().copied().collect();
        self
    }

    pub fn with_batteries(self, batteries: &[u8]) -> Self {
        *lock_recover(&self.batteries) = batteries.iter().copied().collect();
        self
    }

    pub fn with_low_power(mut self, low_power: bool) -> Self {
        self.low_power = low_power;
        self
    }
}

impl MetricSource for ScriptedSensors {
    fn current_thermal_state(&self) -> ThermalLevel {
        next_reading(&self.thermals, ThermalLevel::Nominal)
    }

    fn cpu_throughput_probe(&self) -> f64 {
        next_reading(&self.probes, 0.0)
    }

    fn is_low_power_mode_active(&self) -> bool {
        self.low_power
    }

    fn battery_level_percent(&self) -> u8 {
        next_reading(&self.batteries, 100)
    }

    fn available_parallelism(&self) -> usize {
        self.parallelism
    }
}

/// Returns canned domain results and records the order domains were requested in.
#[derive(Debug)]
pub struct FixedSuite {
    cpu: CpuResult,
    gpu: GpuResult,
    memory: MemoryResult,
    storage: StorageResult,
    calls: Mutex<Vec<&'static str>>,
}

impl FixedSuite {
    pub fn new(cpu: CpuResult, gpu: GpuResult, memory: MemoryResult, storage: StorageResult) -> Self {
        Self {
            cpu,
            gpu,
            memory,
            storage,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// CPU 10000, GPU 8000, memory 6000, storage 5000: composite 7750.
    pub fn balanced() -> Self {
        Self::new(
            cpu_result(10_000),
            gpu_result(8_000, 95.0),
            memory_result(6_000),
            storage_result(5_000, false),
        )
    }

    pub fn call_order(&self) -> Vec<&'static str> {
        lock_recover(&self.calls).clone()
    }

    pub fn storage_calls(&self) -> usize {
        lock_recover(&self.calls)
            .iter()
            .filter(|name| **name == "storage")
            .count()
    }

    fn record(&self, name: &'static str) {
        lock_recover(&self.calls).push(name);
    }
}

impl BenchmarkSuite for FixedSuite {
    fn cpu(&self, _mode: RunMode) -> CpuResult {
        self.record("cpu");
        self.cpu.clone()
    }

    fn gpu(&self, _mode: RunMode) -> GpuResult {
        self.record("gpu");
        self.gpu.clone()
    }

    fn memory(&self, _mode: RunMode) -> MemoryResult {
        self.record("memory");
        self.memory.clone()
    }

    fn storage(&self, _mode: RunMode) -> StorageResult {
        self.record("storage");
        self.storage.clone()
    }
}

/// Cycle scores played back in order; the last score repeats.
#[derive(Debug)]
pub struct ScriptedWorkload {
    scores: Mutex<VecDeque<u32>>,
    runs: AtomicUsize,
}

impl ScriptedWorkload {
    pub fn new(scores: &[u32]) -> Self {
        Self {
            scores: Mutex::new(scores.iter().copied().collect()),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl CycleWorkload for ScriptedWorkload {
    fn name(&self) -> &str {
        "scripted"
    }

    fn run_cycle(&self) -> u32 {
        self.runs.fetch_add(1, Ordering::SeqCst);
        next_reading(&self.scores, 0)
    }
}

/// Counts persisted reports; optionally fails every write.
#[derive(Debug, Default)]
pub struct RecordingSink {
    persisted: AtomicUsize,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            persisted: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.persisted.load(Ordering::SeqCst)
    }
}

impl ReportSink for RecordingSink {
    fn persist(&self, _report: &CompositeReport) -> Result<()> {
        self.persisted.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("disk full");
        }
        Ok(())
    }
}

/// Report from a quick or full run over [`FixedSuite::balanced`].
pub fn sample_report(mode: RunMode) -> CompositeReport {
    let coordinator = Coordinator::new(
        Arc::new(ScriptedSensors::steady()),
        Arc::new(FixedSuite::balanced()),
        DeviceInfo::placeholder(),
        RunGuard::new(),
    );
    match coordinator.run(mode, |_| {}) {
        RunOutcome::Completed(report) => (*report).clone(),
        other => panic!("sample run did not complete: {other:?}"),
    }
}

/// Three-cycle sustained result with a slight score decline.
pub fn sample_sustained_result() -> SustainedRunResult {
    let controller = SustainedController::new(
        Arc::new(ScriptedSensors::steady()),
        Arc::new(ScriptedWorkload::new(&[8_748, 8_700, 8_520])),
        RunGuard::new(),
    );
    let config = SustainedConfig {
        min_cycles: 3,
        max_cycles: 3,
        interval: Duration::ZERO,
        stable_thermal_window: 3,
    };
    match controller.start(&config, |_| {}) {
        Ok(SustainedOutcome::Completed(result)) => (*result).clone(),
        other => panic!("sample sustained run did not complete: {other:?}"),
    }
}
