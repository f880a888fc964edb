//! Scoring model
//!
//! Pure functions turning domain totals into a composite score, letter grades,
//! performance tiers, recommendations and percentile-style comparisons.
//!
//! ## Weights
//!
//! The composite is a convex combination of the four domain totals:
//! - CPU: 30%
//! - GPU: 35% - gaming and rendering dominate mobile workloads
//! - Memory: 20%
//! - Storage: 15%
//!
//! Domain totals and the composite share one scale, so the same [`Grade`]
//! buckets apply to both.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bench::{CpuResult, GpuResult, MemoryResult, StorageResult};
use crate::error::{BenchError, BenchResult};

/// Version of the scoring semantics.
///
/// Bump this when score meanings change (weights, thresholds, normalization) so
/// stored reports can be compared like-for-like.
pub const SCORING_VERSION: u32 = 1;

/// Ordinal letter bucket, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    D,
    C,
    B,
    A,
    S,
}

impl Grade {
    /// Lower bound (inclusive) of each bucket. The top bucket is unbounded above.
    pub const THRESHOLDS: [(u32, Grade); 5] = [
        (0, Grade::D),
        (2_000, Grade::C),
        (6_000, Grade::B),
        (10_000, Grade::A),
        (15_000, Grade::S),
    ];

    pub fn from_score(score: u32) -> Self {
        Self::THRESHOLDS
            .iter()
            .rev()
            .find(|(floor, _)| score >= *floor)
            .map(|(_, grade)| *grade)
            .unwrap_or(Grade::D)
    }

    pub fn letter(&self) -> &'static str {
        match self {
            Grade::D => "D",
            Grade::C => "C",
            Grade::B => "B",
            Grade::A => "A",
            Grade::S => "S",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

/// Map a score into its grade bucket.
pub fn grade(score: u32) -> Grade {
    Grade::from_score(score)
}

/// Composite weights per domain. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub cpu: f64,
    pub gpu: f64,
    pub memory: f64,
    pub storage: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::COMPOSITE
    }
}

impl ScoreWeights {
    pub const COMPOSITE: ScoreWeights = ScoreWeights {
        cpu: 0.30,
        gpu: 0.35,
        memory: 0.20,
        storage: 0.15,
    };

    pub fn sum(&self) -> f64 {
        self.cpu + self.gpu + self.memory + self.storage
    }

    pub fn validate(&self) -> BenchResult<()> {
        let all = [self.cpu, self.gpu, self.memory, self.storage];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(BenchError::InvalidConfig(
                "score weights must be finite and non-negative".to_string(),
            ));
        }
        if (self.sum() - 1.0).abs() > 1e-9 {
            return Err(BenchError::InvalidConfig(format!(
                "score weights must sum to 1.0 (got {:.6})",
                self.sum()
            )));
        }
        Ok(())
    }

    /// Weighted sum of domain totals, truncated to an integer.
    pub fn combine(&self, cpu: u32, gpu: u32, memory: u32, storage: u32) -> u32 {
        let total = cpu as f64 * self.cpu
            + gpu as f64 * self.gpu
            + memory as f64 * self.memory
            + storage as f64 * self.storage;
        // Rounding guard: 0.1 + 0.2-style drift must not drop a whole point.
        (total + 1e-6).max(0.0) as u32
    }
}

/// Composite score with the default weights.
pub fn overall_score(cpu: u32, gpu: u32, memory: u32, storage: u32) -> u32 {
    ScoreWeights::COMPOSITE.combine(cpu, gpu, memory, storage)
}

/// Device tier derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLevel {
    Entry,
    Mainstream,
    Performance,
    Flagship,
    Elite,
}

impl PerformanceLevel {
    pub const THRESHOLDS: [(u32, PerformanceLevel); 5] = [
        (0, PerformanceLevel::Entry),
        (3_000, PerformanceLevel::Mainstream),
        (7_000, PerformanceLevel::Performance),
        (11_000, PerformanceLevel::Flagship),
        (16_000, PerformanceLevel::Elite),
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PerformanceLevel::Entry => "Entry",
            PerformanceLevel::Mainstream => "Mainstream",
            PerformanceLevel::Performance => "Performance",
            PerformanceLevel::Flagship => "Flagship",
            PerformanceLevel::Elite => "Elite",
        }
    }
}

impl fmt::Display for PerformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn performance_level(score: u32) -> PerformanceLevel {
    PerformanceLevel::THRESHOLDS
        .iter()
        .rev()
        .find(|(floor, _)| score >= *floor)
        .map(|(_, level)| *level)
        .unwrap_or(PerformanceLevel::Entry)
}

/// Message returned when no recommendation rule fires.
pub const ALL_GOOD: &str = "Your device performs well across all areas. No action needed.";

/// Rule list, evaluated per domain in CPU, GPU, Memory, Storage order.
pub fn recommendations(
    cpu: &CpuResult,
    gpu: &GpuResult,
    memory: &MemoryResult,
    storage: &StorageResult,
) -> Vec<String> {
    let mut out = Vec::new();

    if cpu.total_score < 4_000 {
        out.push(
            "CPU performance is limited. Close background apps before demanding tasks."
                .to_string(),
        );
    }
    if cpu.multi_core > 0 && cpu.single_core > 0 && cpu.multi_core < cpu.single_core * 2 {
        out.push(
            "Multi-core scaling is weak. The device may be restricting background cores."
                .to_string(),
        );
    }

    if gpu.total_score < 4_000 {
        out.push("Graphics performance is limited. Prefer low or medium game presets.".to_string());
    }
    if gpu.stability_percent < 80.0 {
        out.push(format!(
            "Frame pacing is uneven ({:.0}% stability). Expect stutter in games.",
            gpu.stability_percent
        ));
    }

    if memory.total_score < 3_000 {
        out.push(
            "Memory throughput is low. Keep fewer apps open to avoid reloads.".to_string(),
        );
    }

    if storage.total_score < 2_500 {
        out.push(
            "Storage is slow. Free up space; nearly full flash storage loses speed."
                .to_string(),
        );
    }
    if storage.estimated {
        out.push(
            "Storage score is estimated from memory speed. Run the full benchmark to measure it."
                .to_string(),
        );
    }

    if out.is_empty() {
        out.push(ALL_GOOD.to_string());
    }
    out
}

/// Percentile-style standing per domain, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileEstimate {
    pub cpu: f64,
    pub gpu: f64,
    pub memory: f64,
    pub storage: f64,
}

/// Domain score that maps to the 100th percentile.
pub const PERCENTILE_REFERENCE: PercentileEstimate = PercentileEstimate {
    cpu: 16_000.0,
    gpu: 14_000.0,
    memory: 12_000.0,
    storage: 10_000.0,
};

pub fn comparison(cpu: u32, gpu: u32, memory: u32, storage: u32) -> PercentileEstimate {
    let scale = |score: u32, reference: f64| (score as f64 / reference * 100.0).clamp(0.0, 100.0);
    PercentileEstimate {
        cpu: scale(cpu, PERCENTILE_REFERENCE.cpu),
        gpu: scale(gpu, PERCENTILE_REFERENCE.gpu),
        memory: scale(memory, PERCENTILE_REFERENCE.memory),
        storage: scale(storage, PERCENTILE_REFERENCE.storage),
    }
}
