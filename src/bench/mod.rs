//! Domain benchmarks
//!
//! Each domain (CPU, GPU, memory, storage) times fixed amounts of synthetic work
//! and converts `work / elapsed` into sub-scores. Domains share no state.
//!
//! A sub-test that cannot get its workspace (allocation or file-system failure)
//! scores 0 instead of failing the domain.

pub mod cpu;
pub mod gpu;
pub mod memory;
pub mod storage;

pub use cpu::{CpuBenchmark, CpuResult, CpuWorkload};
pub use gpu::{GpuBenchmark, GpuResult, GpuWorkload, RenderBackend, SoftwareRasterizer};
pub use memory::{MemoryBenchmark, MemoryResult, MemoryWorkload};
pub use storage::{StorageBenchmark, StorageResult, StorageWorkload};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::scoring::Grade;

/// Full runs use realistic durations; quick runs shrink every workload but keep
/// the same sub-score shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Full,
    Quick,
}

impl RunMode {
    pub fn profile_key(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::Quick => "quick",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RunMode::Full => "CPU, GPU, memory and storage with realistic durations",
            RunMode::Quick => "Reduced workloads; storage estimated from memory speed",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile_key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Cpu,
    Gpu,
    Memory,
    Storage,
}

impl Domain {
    pub fn label(&self) -> &'static str {
        match self {
            Domain::Cpu => "CPU",
            Domain::Gpu => "GPU",
            Domain::Memory => "Memory",
            Domain::Storage => "Storage",
        }
    }
}

/// Common view of a finished domain result.
pub trait DomainScore {
    fn domain(&self) -> Domain;
    fn total_score(&self) -> u32;
    fn grade(&self) -> Grade {
        Grade::from_score(self.total_score())
    }
}

/// One hardware domain with full and quick entry points.
pub trait DomainBenchmark {
    type Output: DomainScore;

    fn run_full(&self) -> Self::Output;

    fn run_quick(&self) -> Self::Output;

    fn run(&self, mode: RunMode) -> Self::Output {
        match mode {
            RunMode::Full => self.run_full(),
            RunMode::Quick => self.run_quick(),
        }
    }
}

/// The set of domain benchmarks a coordinator drives.
///
/// Implementations must return fully-formed results; failures inside a domain
/// become zero sub-scores.
pub trait BenchmarkSuite: Send + Sync {
    fn cpu(&self, mode: RunMode) -> CpuResult;
    fn gpu(&self, mode: RunMode) -> GpuResult;
    fn memory(&self, mode: RunMode) -> MemoryResult;
    fn storage(&self, mode: RunMode) -> StorageResult;
}

/// The real synthetic workloads.
pub struct SyntheticSuite {
    pub cpu: CpuBenchmark,
    pub gpu: GpuBenchmark,
    pub memory: MemoryBenchmark,
    pub storage: StorageBenchmark,
}

impl SyntheticSuite {
    pub fn new(parallelism: usize, scratch_root: PathBuf) -> Self {
        Self {
            cpu: CpuBenchmark::new(parallelism),
            gpu: GpuBenchmark::detect(),
            memory: MemoryBenchmark::new(),
            storage: StorageBenchmark::new(scratch_root),
        }
    }
}

impl BenchmarkSuite for SyntheticSuite {
    fn cpu(&self, mode: RunMode) -> CpuResult {
        self.cpu.run(mode)
    }

    fn gpu(&self, mode: RunMode) -> GpuResult {
        self.gpu.run(mode)
    }

    fn memory(&self, mode: RunMode) -> MemoryResult {
        self.memory.run(mode)
    }

    fn storage(&self, mode: RunMode) -> StorageResult {
        self.storage.run(mode)
    }
}

/// Throughput `work / elapsed` expressed in points, where `units_per_point`
/// units per second equal one point.
///
/// Returns 0 for zero elapsed time, zero work, or a non-positive scale.
pub fn throughput_score(work: f64, elapsed: Duration, units_per_point: f64) -> u32 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 || !work.is_finite() || work <= 0.0 || units_per_point <= 0.0 {
        return 0;
    }
    rate_score(work / secs, units_per_point)
}

/// Convert an already-computed rate into points.
pub fn rate_score(rate: f64, units_per_point: f64) -> u32 {
    if !rate.is_finite() || rate <= 0.0 || units_per_point <= 0.0 {
        return 0;
    }
    (rate / units_per_point).round().min(u32::MAX as f64) as u32
}

/// `work / elapsed` in units per second, 0 when elapsed is zero.
pub fn rate_per_sec(work: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 || !work.is_finite() {
        return 0.0;
    }
    work / secs
}

/// Weighted sum of sub-scores, truncated.
pub fn weighted_total(parts: &[(u32, f64)]) -> u32 {
    let total: f64 = parts.iter().map(|(score, weight)| *score as f64 * weight).sum();
    (total + 1e-6).clamp(0.0, u32::MAX as f64) as u32
}

/// Run `work` and measure wall-clock time.
pub fn timed<T>(work: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = work();
    (out, start.elapsed())
}

/// Allocate a zeroed buffer without aborting on allocation failure.
pub fn try_alloc<T: Clone + Default>(len: usize) -> Option<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).ok()?;
    buf.resize(len, T::default());
    Some(buf)
}

/// Deterministic xorshift generator for workload data and access patterns.
#[derive(Debug, Clone)]
pub(crate) struct XorShift(u64);

impl XorShift {
    pub(crate) fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub(crate) fn next_below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.next_u64() % bound
    }

    pub(crate) fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}
