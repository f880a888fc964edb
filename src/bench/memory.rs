//! Memory benchmark
//!
//! Pseudo-random and sequential access over a large allocated buffer:
//! - sequential write (fill), sequential read (sum), copy between two buffers
//! - random read: dependent pseudo-random indexing across the whole buffer
//!
//! Total = 30% read + 30% write + 20% copy + 20% random.

use serde::{Deserialize, Serialize};
use std::hint::black_box;
use tracing::{debug, warn};

use super::{
    rate_per_sec, rate_score, timed, try_alloc, weighted_total, Domain, DomainBenchmark,
    DomainScore, XorShift,
};
use crate::scoring::Grade;

const READ_WEIGHT: f64 = 0.30;
const WRITE_WEIGHT: f64 = 0.30;
const COPY_WEIGHT: f64 = 0.20;
const RANDOM_WEIGHT: f64 = 0.20;

const MB_S_PER_POINT: f64 = 2.0;
const RANDOM_OPS_PER_POINT: f64 = 5_000.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResult {
    pub read_mb_s: f64,
    pub write_mb_s: f64,
    pub copy_mb_s: f64,
    pub random_ops_per_sec: f64,
    pub read_score: u32,
    pub write_score: u32,
    pub copy_score: u32,
    pub random_score: u32,
    pub total_score: u32,
    pub grade: Grade,
}

impl MemoryResult {
    pub fn from_measurements(
        read_mb_s: f64,
        write_mb_s: f64,
        copy_mb_s: f64,
        random_ops_per_sec: f64,
    ) -> Self {
        let read_score = rate_score(read_mb_s, MB_S_PER_POINT);
        let write_score = rate_score(write_mb_s, MB_S_PER_POINT);
        let copy_score = rate_score(copy_mb_s, MB_S_PER_POINT);
        let random_score = rate_score(random_ops_per_sec, RANDOM_OPS_PER_POINT);
        let total_score = weighted_total(&[
            (read_score, READ_WEIGHT),
            (write_score, WRITE_WEIGHT),
            (copy_score, COPY_WEIGHT),
            (random_score, RANDOM_WEIGHT),
        ]);
        Self {
            read_mb_s: sanitize(read_mb_s),
            write_mb_s: sanitize(write_mb_s),
            copy_mb_s: sanitize(copy_mb_s),
            random_ops_per_sec: sanitize(random_ops_per_sec),
            read_score,
            write_score,
            copy_score,
            random_score,
            total_score,
            grade: Grade::from_score(total_score),
        }
    }
}

impl DomainScore for MemoryResult {
    fn domain(&self) -> Domain {
        Domain::Memory
    }

    fn total_score(&self) -> u32 {
        self.total_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryWorkload {
    pub buffer_bytes: usize,
    pub passes: u32,
    pub random_accesses: u64,
}

impl MemoryWorkload {
    pub const FULL: MemoryWorkload = MemoryWorkload {
        buffer_bytes: 128 * 1024 * 1024, // 128 MiB working set
        passes: 8,
        random_accesses: 40_000_000,
    };

    pub const QUICK: MemoryWorkload = MemoryWorkload {
        buffer_bytes: 32 * 1024 * 1024,
        passes: 3,
        random_accesses: 4_000_000,
    };
}

pub struct MemoryBenchmark {
    full: MemoryWorkload,
    quick: MemoryWorkload,
}

impl Default for MemoryBenchmark {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBenchmark {
    pub fn new() -> Self {
        Self::with_workloads(MemoryWorkload::FULL, MemoryWorkload::QUICK)
    }

    pub fn with_workloads(full: MemoryWorkload, quick: MemoryWorkload) -> Self {
        Self { full, quick }
    }

    fn run_workload(&self, workload: &MemoryWorkload) -> MemoryResult {
        let words = workload.buffer_bytes / 8;
        let passes = workload.passes.max(1);

        let Some(mut src) = try_alloc::<u64>(words) else {
            warn!(
                bytes = workload.buffer_bytes,
                "Memory buffer allocation failed; scoring 0"
            );
            return MemoryResult::from_measurements(0.0, 0.0, 0.0, 0.0);
        };

        let write_mb_s = sequential_write(&mut src, passes);
        let read_mb_s = sequential_read(&src, passes);
        let copy_mb_s = match try_alloc::<u64>(words) {
            Some(mut dst) => copy_between(&src, &mut dst, passes),
            None => {
                warn!(
                    bytes = workload.buffer_bytes,
                    "Memory copy buffer allocation failed; copy scores 0"
                );
                0.0
            }
        };
        let random_ops_per_sec = random_reads(&src, workload.random_accesses);

        let result =
            MemoryResult::from_measurements(read_mb_s, write_mb_s, copy_mb_s, random_ops_per_sec);
        debug!(
            read_mb_s,
            write_mb_s,
            copy_mb_s,
            random_ops_per_sec,
            total = result.total_score,
            "Memory benchmark finished"
        );
        result
    }
}

impl DomainBenchmark for MemoryBenchmark {
    type Output = MemoryResult;

    fn run_full(&self) -> MemoryResult {
        self.run_workload(&self.full)
    }

    fn run_quick(&self) -> MemoryResult {
        self.run_workload(&self.quick)
    }
}

fn mb(words: usize, passes: u32) -> f64 {
    (words as f64 * 8.0 * passes as f64) / BYTES_PER_MB
}

fn sequential_write(buf: &mut [u64], passes: u32) -> f64 {
    let (_, elapsed) = timed(|| {
        for pass in 0..passes as u64 {
            for (i, word) in buf.iter_mut().enumerate() {
                *word = (i as u64).wrapping_mul(0x9e37_79b9).wrapping_add(pass);
            }
            black_box(&buf);
        }
    });
    rate_per_sec(mb(buf.len(), passes), elapsed)
}

fn sequential_read(buf: &[u64], passes: u32) -> f64 {
    let (sum, elapsed) = timed(|| {
        let mut sum = 0u64;
        for _ in 0..passes {
            sum = buf.iter().fold(sum, |acc, word| acc.wrapping_add(*word));
            black_box(sum);
        }
        sum
    });
    black_box(sum);
    rate_per_sec(mb(buf.len(), passes), elapsed)
}

fn copy_between(src: &[u64], dst: &mut [u64], passes: u32) -> f64 {
    let (_, elapsed) = timed(|| {
        for _ in 0..passes {
            dst.copy_from_slice(src);
            black_box(&dst);
        }
    });
    rate_per_sec(mb(src.len(), passes), elapsed)
}

/// Each index depends on the previous read so the loads cannot be overlapped.
fn random_reads(buf: &[u64], accesses: u64) -> f64 {
    if buf.is_empty() || accesses == 0 {
        return 0.0;
    }
    let len = buf.len() as u64;
    let (checksum, elapsed) = timed(|| {
        let mut rng = XorShift::new(0x5eed_u64);
        let mut checksum = 0u64;
        for _ in 0..accesses {
            let idx = (rng.next_u64() ^ checksum) % len;
            checksum = checksum.wrapping_add(buf[idx as usize]) & 0xffff;
        }
        checksum
    });
    black_box(checksum);
    rate_per_sec(accesses as f64, elapsed)
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}
