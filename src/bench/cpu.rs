//! CPU benchmark
//!
//! Sub-tests:
//! - single-core: trial-division prime counting on one thread
//! - multi-core: the same prime workload fanned out to one worker per execution unit
//! - integer: mixed shift/multiply/branch loop
//! - float: multiply-add/sqrt chain
//! - crypto: add-rotate-xor rounds over a byte buffer
//!
//! Total = 25% single + 30% multi + 15% integer + 15% float + 15% crypto.

use serde::{Deserialize, Serialize};
use std::hint::black_box;
use std::io;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use super::{throughput_score, timed, try_alloc, weighted_total, Domain, DomainBenchmark, DomainScore};
use crate::scoring::Grade;

const SINGLE_CORE_WEIGHT: f64 = 0.25;
const MULTI_CORE_WEIGHT: f64 = 0.30;
const INTEGER_WEIGHT: f64 = 0.15;
const FLOAT_WEIGHT: f64 = 0.15;
const CRYPTO_WEIGHT: f64 = 0.15;

// Units per second that equal one point.
const PRIMES_PER_POINT: f64 = 400.0;
const MULTI_PRIMES_PER_POINT: f64 = 1_600.0;
const INTEGER_OPS_PER_POINT: f64 = 100_000.0;
const FLOAT_OPS_PER_POINT: f64 = 30_000.0;
const CRYPTO_BYTES_PER_POINT: f64 = 50_000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuResult {
    pub single_core: u32,
    pub multi_core: u32,
    pub integer: u32,
    pub float: u32,
    pub crypto: u32,
    /// Workers used by the multi-core sub-test.
    pub threads: usize,
    pub total_score: u32,
    pub grade: Grade,
}

impl CpuResult {
    pub fn from_sub_scores(
        single_core: u32,
        multi_core: u32,
        integer: u32,
        float: u32,
        crypto: u32,
        threads: usize,
    ) -> Self {
        let total_score = weighted_total(&[
            (single_core, SINGLE_CORE_WEIGHT),
            (multi_core, MULTI_CORE_WEIGHT),
            (integer, INTEGER_WEIGHT),
            (float, FLOAT_WEIGHT),
            (crypto, CRYPTO_WEIGHT),
        ]);
        Self {
            single_core,
            multi_core,
            integer,
            float,
            crypto,
            threads,
            total_score,
            grade: Grade::from_score(total_score),
        }
    }
}

impl DomainScore for CpuResult {
    fn domain(&self) -> Domain {
        Domain::Cpu
    }

    fn total_score(&self) -> u32 {
        self.total_score
    }
}

/// Amount of work per sub-test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuWorkload {
    /// Numbers tested for primality per worker.
    pub prime_limit: u32,
    pub integer_iterations: u64,
    pub float_iterations: u64,
    pub crypto_bytes: usize,
    pub crypto_passes: u32,
}

impl CpuWorkload {
    pub const FULL: CpuWorkload = CpuWorkload {
        prime_limit: 400_000,
        integer_iterations: 200_000_000,
        float_iterations: 60_000_000,
        crypto_bytes: 4 * 1024 * 1024,
        crypto_passes: 16,
    };

    pub const QUICK: CpuWorkload = CpuWorkload {
        prime_limit: 60_000,
        integer_iterations: 20_000_000,
        float_iterations: 6_000_000,
        crypto_bytes: 1024 * 1024,
        crypto_passes: 4,
    };
}

pub struct CpuBenchmark {
    parallelism: usize,
    full: CpuWorkload,
    quick: CpuWorkload,
}

impl CpuBenchmark {
    pub fn new(parallelism: usize) -> Self {
        Self::with_workloads(parallelism, CpuWorkload::FULL, CpuWorkload::QUICK)
    }

    pub fn with_workloads(parallelism: usize, full: CpuWorkload, quick: CpuWorkload) -> Self {
        Self {
            parallelism: parallelism.max(1),
            full,
            quick,
        }
    }

    fn run_workload(&self, workload: &CpuWorkload) -> CpuResult {
        let single_core = single_core_score(workload.prime_limit);
        let multi_core = multi_core_score(workload.prime_limit, self.parallelism);
        let integer = integer_score(workload.integer_iterations);
        let float = float_score(workload.float_iterations);
        let crypto = crypto_score(workload.crypto_bytes, workload.crypto_passes);

        let result = CpuResult::from_sub_scores(
            single_core,
            multi_core,
            integer,
            float,
            crypto,
            self.parallelism,
        );
        debug!(
            single_core,
            multi_core,
            integer,
            float,
            crypto,
            total = result.total_score,
            "CPU benchmark finished"
        );
        result
    }
}

impl DomainBenchmark for CpuBenchmark {
    type Output = CpuResult;

    fn run_full(&self) -> CpuResult {
        self.run_workload(&self.full)
    }

    fn run_quick(&self) -> CpuResult {
        self.run_workload(&self.quick)
    }
}

/// Count primes in `[2, limit)` by trial division.
pub fn count_primes(limit: u32) -> u32 {
    let mut count = 0;
    for n in 2..limit {
        if is_prime(n) {
            count += 1;
        }
    }
    count
}

fn is_prime(n: u32) -> bool {
    if n < 4 {
        return n >= 2;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut d = 3u32;
    while d.saturating_mul(d) <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

fn single_core_score(limit: u32) -> u32 {
    let (primes, elapsed) = timed(|| count_primes(black_box(limit)));
    black_box(primes);
    throughput_score(limit as f64, elapsed, PRIMES_PER_POINT)
}

/// Per-worker outcome, merged only after every worker has joined.
#[derive(Debug, Clone, Copy)]
struct WorkerOutcome {
    numbers_tested: u64,
    primes: u32,
}

#[derive(Debug)]
enum WorkerFailure {
    Spawn(io::Error),
    Panicked,
}

/// Fan the prime workload out to `workers` threads and score total throughput
/// over wall-clock time.
///
/// Workers share only the read-only limit.
fn multi_core_score(limit: u32, workers: usize) -> u32 {
    let workers = workers.max(1);
    let (outcomes, elapsed) = timed(|| {
        thread::scope(|scope| {
            let spawned: Vec<_> = (0..workers)
                .map(|index| {
                    thread::Builder::new()
                        .name(format!("cpu-worker-{index}"))
                        .spawn_scoped(scope, move || WorkerOutcome {
                            numbers_tested: limit as u64,
                            primes: count_primes(black_box(limit)),
                        })
                })
                .collect();

            spawned
                .into_iter()
                .map(|spawned| match spawned {
                    Ok(handle) => handle.join().map_err(|_| WorkerFailure::Panicked),
                    Err(err) => Err(WorkerFailure::Spawn(err)),
                })
                .collect::<Vec<_>>()
        })
    });
    merge_worker_outcomes(outcomes, elapsed)
}

/// A worker that could not be started zeroes the sub-test; a panicked worker
/// contributes no work.
fn merge_worker_outcomes(
    outcomes: Vec<Result<WorkerOutcome, WorkerFailure>>,
    elapsed: Duration,
) -> u32 {
    let mut numbers_tested = 0u64;
    let mut primes = 0u64;
    for outcome in outcomes {
        match outcome {
            Ok(outcome) => {
                numbers_tested += outcome.numbers_tested;
                primes += outcome.primes as u64;
            }
            Err(WorkerFailure::Spawn(err)) => {
                warn!(error = %err, "Could not start CPU multi-core worker; scoring 0");
                return 0;
            }
            Err(WorkerFailure::Panicked) => {
                warn!("CPU multi-core worker panicked; its work is not counted")
            }
        }
    }
    black_box(primes);
    throughput_score(numbers_tested as f64, elapsed, MULTI_PRIMES_PER_POINT)
}

fn integer_score(iterations: u64) -> u32 {
    let (_, elapsed) = timed(|| {
        let mut x: u64 = 0x1234_5678_9abc_def0;
        for _ in 0..iterations {
            x ^= x >> 12;
            x = x.wrapping_mul(0x2545_F491_4F6C_DD1D);
            x ^= x << 25;
            x = x.rotate_left(17);
            if x & 1 == 0 {
                x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
            } else {
                x = x.wrapping_sub(0x517c_c1b7_2722_0a95);
            }
        }
        black_box(x)
    });
    throughput_score(iterations as f64, elapsed, INTEGER_OPS_PER_POINT)
}

fn float_score(iterations: u64) -> u32 {
    let (_, elapsed) = timed(|| {
        let mut a = 1.000_001f64;
        let mut b = 0.5f64;
        let mut acc = 0.0f64;
        for i in 0..iterations {
            a = a.mul_add(1.000_000_1, 1e-9);
            b = (b * 0.999_999 + 0.25).sqrt();
            acc += a * b / (1.0 + (i & 7) as f64);
        }
        black_box(acc)
    });
    throughput_score(iterations as f64, elapsed, FLOAT_OPS_PER_POINT)
}

fn crypto_score(bytes: usize, passes: u32) -> u32 {
    let Some(mut buf) = try_alloc::<u8>(bytes) else {
        warn!(bytes, "CPU crypto buffer allocation failed; scoring 0");
        return 0;
    };
    for (i, b) in buf.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(31).wrapping_add(7);
    }

    let (digest, elapsed) = timed(|| {
        let mut state = [0x6170_7865u32, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];
        for _ in 0..passes {
            for block in buf.chunks_exact(16) {
                for (lane, word) in block.chunks_exact(4).enumerate() {
                    let w = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                    state[lane] = state[lane].wrapping_add(w);
                }
                quarter_round(&mut state);
                quarter_round(&mut state);
            }
        }
        black_box(state)
    });
    black_box(digest);

    let processed = bytes as f64 * passes as f64;
    throughput_score(processed, elapsed, CRYPTO_BYTES_PER_POINT)
}

fn quarter_round(s: &mut [u32; 4]) {
    s[0] = s[0].wrapping_add(s[1]);
    s[3] = (s[3] ^ s[0]).rotate_left(16);
    s[2] = s[2].wrapping_add(s[3]);
    s[1] = (s[1] ^ s[2]).rotate_left(12);
    s[0] = s[0].wrapping_add(s[1]);
    s[3] = (s[3] ^ s[0]).rotate_left(8);
    s[2] = s[2].wrapping_add(s[3]);
    s[1] = (s[1] ^ s[2]).rotate_left(7);
}
