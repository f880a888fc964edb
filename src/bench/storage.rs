//! Storage benchmark
//!
//! Works inside a dedicated scratch directory that is removed when the run ends,
//! on success or failure:
//! - sequential write of a fixed-size file (synced)
//! - sequential read of the same file
//! - random 4 KiB reads at pseudo-random offsets
//!
//! Total = 35% write + 35% read + 30% random.
//!
//! Quick runs do not touch the disk: [`StorageResult::estimated_from_memory`]
//! derives the sub-scores from memory speeds and marks the result `estimated`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    rate_per_sec, rate_score, timed, try_alloc, weighted_total, Domain, DomainBenchmark,
    DomainScore, MemoryResult, XorShift,
};
use crate::scoring::Grade;

const WRITE_WEIGHT: f64 = 0.35;
const READ_WEIGHT: f64 = 0.35;
const RANDOM_WEIGHT: f64 = 0.30;

const WRITE_MB_S_PER_POINT: f64 = 0.2;
const READ_MB_S_PER_POINT: f64 = 0.3;
const RANDOM_IOPS_PER_POINT: f64 = 10.0;

/// Quick-mode substitute ratios applied to memory speeds.
pub const ESTIMATED_READ_RATIO: f64 = 0.5;
pub const ESTIMATED_WRITE_RATIO: f64 = 0.25;
pub const ESTIMATED_RANDOM_RATIO: f64 = 0.25;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const SCRATCH_PREFIX: &str = "device-bench-scratch-";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageResult {
    pub sequential_write_mb_s: f64,
    pub sequential_read_mb_s: f64,
    pub random_read_iops: f64,
    pub write_score: u32,
    pub read_score: u32,
    pub random_score: u32,
    pub total_score: u32,
    pub grade: Grade,
    /// True when the numbers were derived from memory speeds, not measured on disk.
    #[serde(default)]
    pub estimated: bool,
}

impl StorageResult {
    pub fn from_measurements(
        sequential_write_mb_s: f64,
        sequential_read_mb_s: f64,
        random_read_iops: f64,
        estimated: bool,
    ) -> Self {
        let write_score = rate_score(sequential_write_mb_s, WRITE_MB_S_PER_POINT);
        let read_score = rate_score(sequential_read_mb_s, READ_MB_S_PER_POINT);
        let random_score = rate_score(random_read_iops, RANDOM_IOPS_PER_POINT);
        let total_score = weighted_total(&[
            (write_score, WRITE_WEIGHT),
            (read_score, READ_WEIGHT),
            (random_score, RANDOM_WEIGHT),
        ]);
        Self {
            sequential_write_mb_s: sequential_write_mb_s.max(0.0),
            sequential_read_mb_s: sequential_read_mb_s.max(0.0),
            random_read_iops: random_read_iops.max(0.0),
            write_score,
            read_score,
            random_score,
            total_score,
            grade: Grade::from_score(total_score),
            estimated,
        }
    }

    /// Quick-mode approximation from memory speeds. Not a storage measurement.
    pub fn estimated_from_memory(memory: &MemoryResult) -> Self {
        Self::from_measurements(
            memory.write_mb_s * ESTIMATED_WRITE_RATIO,
            memory.read_mb_s * ESTIMATED_READ_RATIO,
            memory.random_ops_per_sec * ESTIMATED_RANDOM_RATIO,
            true,
        )
    }
}

impl DomainScore for StorageResult {
    fn domain(&self) -> Domain {
        Domain::Storage
    }

    fn total_score(&self) -> u32 {
        self.total_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageWorkload {
    pub file_bytes: usize,
    pub chunk_bytes: usize,
    pub random_reads: u32,
    pub block_bytes: usize,
}

impl StorageWorkload {
    pub const FULL: StorageWorkload = StorageWorkload {
        file_bytes: 256 * 1024 * 1024,
        chunk_bytes: 1024 * 1024,
        random_reads: 20_000,
        block_bytes: 4096,
    };

    pub const QUICK: StorageWorkload = StorageWorkload {
        file_bytes: 32 * 1024 * 1024,
        chunk_bytes: 1024 * 1024,
        random_reads: 2_000,
        block_bytes: 4096,
    };
}

/// Scratch directory removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn create_in(root: &Path) -> Result<Self> {
        let path = root.join(format!("{SCRATCH_PREFIX}{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create scratch directory: {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %err, "Failed to remove scratch directory");
        }
    }
}

pub struct StorageBenchmark {
    scratch_root: PathBuf,
    full: StorageWorkload,
    quick: StorageWorkload,
}

impl StorageBenchmark {
    pub fn new(scratch_root: PathBuf) -> Self {
        Self::with_workloads(scratch_root, StorageWorkload::FULL, StorageWorkload::QUICK)
    }

    pub fn with_workloads(
        scratch_root: PathBuf,
        full: StorageWorkload,
        quick: StorageWorkload,
    ) -> Self {
        Self {
            scratch_root,
            full,
            quick,
        }
    }

    fn run_workload(&self, workload: &StorageWorkload) -> StorageResult {
        let scratch = match ScratchDir::create_in(&self.scratch_root) {
            Ok(scratch) => scratch,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Storage scratch unavailable; scoring 0");
                return StorageResult::from_measurements(0.0, 0.0, 0.0, false);
            }
        };
        let file_path = scratch.path().join("sequential.bin");

        let write_mb_s = score_or_zero("sequential write", sequential_write(&file_path, workload));
        let read_mb_s = score_or_zero("sequential read", sequential_read(&file_path, workload));
        let random_iops = score_or_zero("random read", random_read(&file_path, workload));

        let result = StorageResult::from_measurements(write_mb_s, read_mb_s, random_iops, false);
        debug!(
            write_mb_s,
            read_mb_s,
            random_iops,
            total = result.total_score,
            "Storage benchmark finished"
        );
        result
    }
}

impl DomainBenchmark for StorageBenchmark {
    type Output = StorageResult;

    fn run_full(&self) -> StorageResult {
        self.run_workload(&self.full)
    }

    fn run_quick(&self) -> StorageResult {
        self.run_workload(&self.quick)
    }
}

fn score_or_zero(sub_test: &str, measured: Result<f64>) -> f64 {
    match measured {
        Ok(value) => value,
        Err(err) => {
            warn!(sub_test, error = %format!("{err:#}"), "Storage sub-test failed; scoring 0");
            0.0
        }
    }
}

fn sequential_write(path: &Path, workload: &StorageWorkload) -> Result<f64> {
    let chunk_len = workload.chunk_bytes.max(1);
    let mut chunk = try_alloc::<u8>(chunk_len).context("Failed to allocate write buffer")?;
    chunk.fill(0xa5);

    let (written, elapsed) = timed(|| -> Result<usize> {
        let mut file = File::create(path).context("Failed to create storage benchmark file")?;
        let mut written = 0usize;
        while written < workload.file_bytes {
            let to_write = (workload.file_bytes - written).min(chunk.len());
            file.write_all(&chunk[..to_write])
                .context("Failed writing storage benchmark file")?;
            written += to_write;
        }
        file.sync_data().context("Failed to sync storage benchmark file")?;
        Ok(written)
    });
    let written = written?;
    Ok(rate_per_sec(written as f64 / BYTES_PER_MB, elapsed))
}

fn sequential_read(path: &Path, workload: &StorageWorkload) -> Result<f64> {
    let mut buf = try_alloc::<u8>(workload.chunk_bytes.max(1)).context("Failed to allocate read buffer")?;

    let (read_total, elapsed) = timed(|| -> Result<u64> {
        let mut file = File::open(path).context("Failed to open storage benchmark file")?;
        let mut read_total = 0u64;
        loop {
            let n = file.read(&mut buf).context("Storage benchmark read failed")?;
            if n == 0 {
                break;
            }
            read_total += n as u64;
        }
        Ok(read_total)
    });
    let read_total = read_total?;
    if read_total == 0 {
        anyhow::bail!("Storage benchmark file is empty");
    }
    Ok(rate_per_sec(read_total as f64 / BYTES_PER_MB, elapsed))
}

fn random_read(path: &Path, workload: &StorageWorkload) -> Result<f64> {
    let block = workload.block_bytes.max(1);
    let mut file = File::open(path).context("Failed to open storage benchmark file")?;
    let file_len = file.metadata().context("Failed to stat storage benchmark file")?.len();
    if file_len < block as u64 {
        anyhow::bail!("Storage benchmark file smaller than one block");
    }
    let blocks = file_len / block as u64;
    let mut buf = vec![0u8; block];
    let mut rng = XorShift::new(0xd15c_u64);

    let (reads, elapsed) = timed(|| -> Result<u32> {
        for _ in 0..workload.random_reads {
            let offset = rng.next_below(blocks) * block as u64;
            file.seek(SeekFrom::Start(offset))
                .context("Storage benchmark seek failed")?;
            file.read_exact(&mut buf)
                .context("Storage benchmark random read failed")?;
        }
        Ok(workload.random_reads)
    });
    let reads = reads?;
    Ok(rate_per_sec(reads as f64, elapsed))
}
