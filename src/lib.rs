//! device-bench: device information and synthetic benchmarking
//!
//! Measures CPU, GPU, memory and storage performance, combines the results into
//! one weighted score and watches for thermal throttling under sustained load.
//! Platform access goes through [`sensors::MetricSource`] and
//! [`bench::RenderBackend`], so the engine itself is platform-agnostic.

pub mod bench;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod run;
pub mod scoring;
pub mod sensors;
pub mod storage;
pub mod sustained;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::{CompositeReport, Coordinator, Phase, RunOutcome, RunState};
pub use error::{BenchError, BenchResult};
pub use run::RunGuard;
pub use sustained::{SustainedConfig, SustainedController, SustainedOutcome, SustainedRunResult};
