//! Benchmark coordinator
//!
//! Drives one full or quick run across domains in a fixed phase order:
//! `Preparing → CPU → GPU → Memory → [Storage] → Finalizing`.
//!
//! - Only one run may be active; the [`RunGuard`] is shared with the sustained-load
//!   controller so neither starts while the other runs.
//! - Cancellation is cooperative and checked at phase boundaries. A domain that
//!   is already running finishes before the cancel takes effect.
//! - A [`CompositeReport`] is built only after every measurement is in, then handed
//!   to the [`ReportSink`] and published to observers. Cancelled runs publish nothing.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bench::{
    BenchmarkSuite, CpuResult, DomainScore, GpuResult, MemoryResult, RunMode, StorageResult,
};
use crate::error::BenchResult;
use crate::run::{lock_recover, CancelToken, ResultSlot, RunGuard};
use crate::scoring::{
    comparison, performance_level, recommendations, Grade, PercentileEstimate, PerformanceLevel,
    ScoreWeights, SCORING_VERSION,
};
use crate::sensors::{DeviceInfo, MetricSource, ThermalLevel};
use crate::throttle::{
    classify_stutter_risk, speed_drop_percent, StutterInputs, StutterRisk, StutterThresholds,
};

/// Ordered run phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preparing,
    Cpu,
    Gpu,
    Memory,
    Storage,
    Finalizing,
}

impl Phase {
    /// Domain phases executed for `mode`, in order.
    pub fn domains(mode: RunMode) -> &'static [Phase] {
        match mode {
            RunMode::Full => &[Phase::Cpu, Phase::Gpu, Phase::Memory, Phase::Storage],
            RunMode::Quick => &[Phase::Cpu, Phase::Gpu, Phase::Memory],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Preparing => "Preparing",
            Phase::Cpu => "CPU",
            Phase::Gpu => "GPU",
            Phase::Memory => "Memory",
            Phase::Storage => "Storage",
            Phase::Finalizing => "Finalizing",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "phase")]
pub enum RunState {
    Idle,
    Running(Phase),
    Completed,
}

/// Progress event. Fractions never decrease within a run and end at exactly 1.0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub fraction: f64,
    pub label: String,
    pub phase: Phase,
}

/// Terminal result of one start request.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Arc<CompositeReport>),
    Cancelled,
    /// Another run held the guard; nothing was started.
    Busy,
}

impl RunOutcome {
    pub fn report(&self) -> Option<&CompositeReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }
}

/// Environment bracketing a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub low_power_mode: bool,
    pub thermal_start: ThermalLevel,
    pub thermal_end: ThermalLevel,
    pub cpu_probe_start: f64,
    pub cpu_probe_end: f64,
    pub speed_drop_percent: f64,
    pub battery_start: u8,
    pub battery_end: u8,
}

/// Immutable result of one completed coordinator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeReport {
    pub id: Uuid,
    pub scoring_version: u32,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub device: DeviceInfo,
    pub environment: EnvironmentSnapshot,
    pub cpu: CpuResult,
    pub gpu: GpuResult,
    pub memory: MemoryResult,
    pub storage: StorageResult,
    pub overall_score: u32,
    pub overall_grade: Grade,
    pub performance_level: PerformanceLevel,
    pub stutter_risk: StutterRisk,
    pub recommendations: Vec<String>,
    pub comparison: PercentileEstimate,
}

impl CompositeReport {
    /// Storage numbers were derived from memory speed rather than measured.
    pub fn storage_is_estimated(&self) -> bool {
        self.storage.estimated
    }
}

impl fmt::Display for CompositeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Benchmark Report ({})", self.mode)?;
        writeln!(f, "  Started: {}", self.started_at.to_rfc3339())?;
        writeln!(f, "  Duration: {:.1}s", self.duration_secs)?;
        writeln!(f, "  CPU:     {:>6} ({})", self.cpu.total_score, self.cpu.grade)?;
        writeln!(f, "  GPU:     {:>6} ({})", self.gpu.total_score, self.gpu.grade)?;
        writeln!(f, "  Memory:  {:>6} ({})", self.memory.total_score, self.memory.grade)?;
        writeln!(
            f,
            "  Storage: {:>6} ({}){}",
            self.storage.total_score,
            self.storage.grade,
            if self.storage_is_estimated() {
                " (estimated)"
            } else {
                ""
            }
        )?;
        writeln!(
            f,
            "  Overall: {:>6} ({}) - {}",
            self.overall_score, self.overall_grade, self.performance_level
        )?;
        writeln!(
            f,
            "  Thermal: {} -> {}",
            self.environment.thermal_start, self.environment.thermal_end
        )?;
        writeln!(
            f,
            "  Speed drop: {:.1}%",
            self.environment.speed_drop_percent
        )?;
        writeln!(f, "  Stutter risk: {}", self.stutter_risk)?;
        for rec in &self.recommendations {
            writeln!(f, "  - {}", rec)?;
        }
        Ok(())
    }
}

/// Receives every completed report exactly once. The coordinator does not retry.
pub trait ReportSink: Send + Sync {
    fn persist(&self, report: &CompositeReport) -> Result<()>;
}

/// Sink that drops reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn persist(&self, _report: &CompositeReport) -> Result<()> {
        Ok(())
    }
}

pub struct Coordinator {
    sensors: Arc<dyn MetricSource>,
    suite: Arc<dyn BenchmarkSuite>,
    sink: Arc<dyn ReportSink>,
    device: DeviceInfo,
    guard: RunGuard,
    weights: ScoreWeights,
    stutter: StutterThresholds,
    state: Mutex<RunState>,
    active: Mutex<Option<CancelToken>>,
    results: ResultSlot<CompositeReport>,
}

/// Measurements gathered at the start of a run.
struct RunStart {
    started_at: DateTime<Utc>,
    timer: Instant,
    low_power_mode: bool,
    thermal: ThermalLevel,
    probe: f64,
    battery: u8,
}

impl Coordinator {
    pub fn new(
        sensors: Arc<dyn MetricSource>,
        suite: Arc<dyn BenchmarkSuite>,
        device: DeviceInfo,
        guard: RunGuard,
    ) -> Self {
        Self {
            sensors,
            suite,
            sink: Arc::new(NullSink),
            device,
            guard,
            weights: ScoreWeights::COMPOSITE,
            stutter: StutterThresholds::default(),
            state: Mutex::new(RunState::Idle),
            active: Mutex::new(None),
            results: ResultSlot::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_stutter_thresholds(mut self, thresholds: StutterThresholds) -> Self {
        self.stutter = thresholds;
        self
    }

    /// Replace the composite weights. Rejected unless they sum to 1.0.
    pub fn with_weights(mut self, weights: ScoreWeights) -> BenchResult<Self> {
        weights.validate()?;
        self.weights = weights;
        Ok(self)
    }

    pub fn state(&self) -> RunState {
        *lock_recover(&self.state)
    }

    /// Latest published report, if any run has completed.
    pub fn latest(&self) -> Option<Arc<CompositeReport>> {
        self.results.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CompositeReport>>> {
        self.results.subscribe()
    }

    pub fn start_full(&self, on_progress: impl FnMut(ProgressUpdate)) -> RunOutcome {
        self.run(RunMode::Full, on_progress)
    }

    pub fn start_quick(&self, on_progress: impl FnMut(ProgressUpdate)) -> RunOutcome {
        self.run(RunMode::Quick, on_progress)
    }

    /// Request cancellation of the active run. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        match lock_recover(&self.active).as_ref() {
            Some(token) => {
                info!("Benchmark cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run all phases for `mode` on the calling thread.
    pub fn run(&self, mode: RunMode, mut on_progress: impl FnMut(ProgressUpdate)) -> RunOutcome {
        let mut active = lock_recover(&self.active);
        let Some(_permit) = self.guard.try_acquire() else {
            debug!(mode = %mode, "Benchmark start ignored; another run is active");
            return RunOutcome::Busy;
        };
        let token = CancelToken::new();
        *active = Some(token.clone());
        drop(active);
        info!(mode = %mode, "Benchmark run started");

        let outcome = self.run_phases(mode, &token, &mut on_progress);

        *lock_recover(&self.active) = None;
        match &outcome {
            RunOutcome::Completed(report) => {
                self.set_state(RunState::Completed);
                info!(
                    overall = report.overall_score,
                    grade = %report.overall_grade,
                    stutter_risk = %report.stutter_risk,
                    "Benchmark run completed"
                );
            }
            _ => {
                self.set_state(RunState::Idle);
                info!(mode = %mode, "Benchmark run cancelled");
            }
        }
        outcome
    }

    fn run_phases(
        &self,
        mode: RunMode,
        token: &CancelToken,
        on_progress: &mut dyn FnMut(ProgressUpdate),
    ) -> RunOutcome {
        let mut progress = ProgressTracker::new(mode, on_progress);

        self.set_state(RunState::Running(Phase::Preparing));
        progress.preparing();
        let start = RunStart {
            started_at: Utc::now(),
            timer: Instant::now(),
            low_power_mode: self.sensors.is_low_power_mode_active(),
            thermal: self.sensors.current_thermal_state(),
            probe: self.sensors.cpu_throughput_probe(),
            battery: self.sensors.battery_level_percent(),
        };
        debug!(
            thermal = %start.thermal,
            probe = start.probe,
            low_power_mode = start.low_power_mode,
            "Captured start snapshot"
        );

        let Some(cpu) = self.run_domain(Phase::Cpu, mode, token, &mut progress, |s| s.cpu(mode))
        else {
            return RunOutcome::Cancelled;
        };
        let Some(gpu) = self.run_domain(Phase::Gpu, mode, token, &mut progress, |s| s.gpu(mode))
        else {
            return RunOutcome::Cancelled;
        };
        let Some(memory) =
            self.run_domain(Phase::Memory, mode, token, &mut progress, |s| s.memory(mode))
        else {
            return RunOutcome::Cancelled;
        };
        let storage = match mode {
            RunMode::Full => {
                let Some(storage) = self.run_domain(Phase::Storage, mode, token, &mut progress, |s| {
                    s.storage(mode)
                }) else {
                    return RunOutcome::Cancelled;
                };
                storage
            }
            RunMode::Quick => {
                debug!("Quick mode: storage estimated from memory speed");
                StorageResult::estimated_from_memory(&memory)
            }
        };

        if token.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        self.set_state(RunState::Running(Phase::Finalizing));
        progress.finalizing();
        let report = self.build_report(mode, start, cpu, gpu, memory, storage);

        if let Err(err) = self.sink.persist(&report) {
            warn!(error = %format!("{err:#}"), report_id = %report.id, "Failed to persist report");
        }
        let report = self.results.publish(report);
        progress.completed();
        RunOutcome::Completed(report)
    }

    fn run_domain<T: DomainScore>(
        &self,
        phase: Phase,
        mode: RunMode,
        token: &CancelToken,
        progress: &mut ProgressTracker<'_>,
        run: impl FnOnce(&dyn BenchmarkSuite) -> T,
    ) -> Option<T> {
        if token.is_cancelled() {
            return None;
        }
        self.set_state(RunState::Running(phase));
        progress.domain_started(phase);
        debug!(phase = %phase, mode = %mode, "Phase started");

        let result = run(self.suite.as_ref());
        debug!(
            domain = result.domain().label(),
            score = result.total_score(),
            grade = %result.grade(),
            "Phase finished"
        );

        progress.domain_finished(phase);
        Some(result)
    }

    fn build_report(
        &self,
        mode: RunMode,
        start: RunStart,
        cpu: CpuResult,
        gpu: GpuResult,
        memory: MemoryResult,
        storage: StorageResult,
    ) -> CompositeReport {
        let thermal_end = self.sensors.current_thermal_state();
        let probe_end = self.sensors.cpu_throughput_probe();
        let battery_end = self.sensors.battery_level_percent();
        let drop = speed_drop_percent(start.probe, probe_end);

        let stutter_risk = classify_stutter_risk(
            &StutterInputs {
                low_power_mode: start.low_power_mode,
                speed_drop_percent: drop,
                thermal_state: thermal_end,
                gpu_stability_percent: gpu.stability_percent,
            },
            &self.stutter,
        );

        let overall_score = self.weights.combine(
            cpu.total_score,
            gpu.total_score,
            memory.total_score,
            storage.total_score,
        );

        CompositeReport {
            id: Uuid::new_v4(),
            scoring_version: SCORING_VERSION,
            mode,
            started_at: start.started_at,
            finished_at: Utc::now(),
            duration_secs: start.timer.elapsed().as_secs_f64(),
            device: self.device.clone(),
            environment: EnvironmentSnapshot {
                low_power_mode: start.low_power_mode,
                thermal_start: start.thermal,
                thermal_end,
                cpu_probe_start: start.probe,
                cpu_probe_end: probe_end,
                speed_drop_percent: drop,
                battery_start: start.battery,
                battery_end,
            },
            recommendations: recommendations(&cpu, &gpu, &memory, &storage),
            comparison: comparison(
                cpu.total_score,
                gpu.total_score,
                memory.total_score,
                storage.total_score,
            ),
            overall_grade: Grade::from_score(overall_score),
            performance_level: performance_level(overall_score),
            overall_score,
            stutter_risk,
            cpu,
            gpu,
            memory,
            storage,
        }
    }

    fn set_state(&self, state: RunState) {
        *lock_recover(&self.state) = state;
    }
}

/// Maps phase transitions onto a non-decreasing fraction.
///
/// Preparing covers `[0, 0.05)`, domains split `[0.05, 0.95]` evenly, finalizing
/// ends at 1.0.
struct ProgressTracker<'a> {
    domains: &'static [Phase],
    last: f64,
    sink: &'a mut dyn FnMut(ProgressUpdate),
}

const PREPARE_SHARE: f64 = 0.05;
const DOMAIN_SHARE: f64 = 0.90;

impl<'a> ProgressTracker<'a> {
    fn new(mode: RunMode, sink: &'a mut dyn FnMut(ProgressUpdate)) -> Self {
        Self {
            domains: Phase::domains(mode),
            last: 0.0,
            sink,
        }
    }

    fn emit(&mut self, fraction: f64, phase: Phase, label: String) {
        let fraction = fraction.clamp(self.last, 1.0);
        self.last = fraction;
        (self.sink)(ProgressUpdate {
            fraction,
            label,
            phase,
        });
    }

    fn domain_fraction(&self, completed: usize) -> f64 {
        let total = self.domains.len().max(1) as f64;
        PREPARE_SHARE + DOMAIN_SHARE * completed as f64 / total
    }

    fn index_of(&self, phase: Phase) -> usize {
        self.domains
            .iter()
            .position(|p| *p == phase)
            .unwrap_or(self.domains.len())
    }

    fn preparing(&mut self) {
        self.emit(0.0, Phase::Preparing, "Preparing".to_string());
    }

    fn domain_started(&mut self, phase: Phase) {
        let fraction = self.domain_fraction(self.index_of(phase));
        self.emit(fraction, phase, format!("Running {} benchmark", phase));
    }

    fn domain_finished(&mut self, phase: Phase) {
        let fraction = self.domain_fraction(self.index_of(phase) + 1);
        self.emit(fraction, phase, format!("{} benchmark complete", phase));
    }

    fn finalizing(&mut self) {
        let fraction = self.domain_fraction(self.domains.len());
        self.emit(fraction, Phase::Finalizing, "Finalizing".to_string());
    }

    fn completed(&mut self) {
        self.emit(1.0, Phase::Finalizing, "Completed".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunGuard;
    use crate::testing::{FixedSuite, RecordingSink, ScriptedSensors};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn coordinator(suite: Arc<FixedSuite>, sensors: ScriptedSensors) -> Coordinator {
        Coordinator::new(
            Arc::new(sensors),
            suite,
            DeviceInfo::placeholder(),
            RunGuard::new(),
        )
    }

    fn collect_progress(updates: &Mutex<Vec<ProgressUpdate>>) -> impl FnMut(ProgressUpdate) + '_ {
        move |update| lock_recover(updates).push(update)
    }

    #[test]
    fn test_full_run_reports_and_reaches_one() {
        let suite = Arc::new(FixedSuite::balanced());
        let sink = Arc::new(RecordingSink::default());
        let coordinator =
            coordinator(Arc::clone(&suite), ScriptedSensors::steady()).with_sink(sink.clone());
        let updates = Mutex::new(Vec::new());

        let outcome = coordinator.start_full(collect_progress(&updates));

        let report = outcome.report().expect("full run should complete");
        assert_eq!(report.mode, RunMode::Full);
        assert_eq!(report.overall_score, 7_750);
        assert_eq!(report.overall_grade, Grade::B);
        assert!(!report.storage_is_estimated());
        assert_eq!(suite.storage_calls(), 1);
        assert_eq!(sink.count(), 1);
        assert_eq!(coordinator.state(), RunState::Completed);
        assert_eq!(coordinator.latest().map(|r| r.id), Some(report.id));

        let updates = updates.into_inner().unwrap();
        assert!(updates.windows(2).all(|w| w[0].fraction <= w[1].fraction));
        assert_eq!(updates.last().map(|u| u.fraction), Some(1.0));
        assert_eq!(updates.first().map(|u| u.phase), Some(Phase::Preparing));
    }

    #[test]
    fn test_phases_run_in_fixed_order() {
        let suite = Arc::new(FixedSuite::balanced());
        let coordinator = coordinator(Arc::clone(&suite), ScriptedSensors::steady());
        let updates = Mutex::new(Vec::new());

        coordinator.start_full(collect_progress(&updates));

        let phases: Vec<Phase> = updates
            .into_inner()
            .unwrap()
            .into_iter()
            .map(|u| u.phase)
            .collect();
        let mut deduped = phases.clone();
        deduped.dedup();
        assert_eq!(
            deduped,
            vec![
                Phase::Preparing,
                Phase::Cpu,
                Phase::Gpu,
                Phase::Memory,
                Phase::Storage,
                Phase::Finalizing
            ]
        );
        assert_eq!(suite.call_order(), vec!["cpu", "gpu", "memory", "storage"]);
    }

    #[test]
    fn test_quick_run_skips_storage_and_flags_estimate() {
        let suite = Arc::new(FixedSuite::balanced());
        let coordinator = coordinator(Arc::clone(&suite), ScriptedSensors::steady());
        let updates = Mutex::new(Vec::new());

        let outcome = coordinator.start_quick(collect_progress(&updates));

        let report = outcome.report().expect("quick run should complete");
        assert_eq!(report.mode, RunMode::Quick);
        assert!(report.storage_is_estimated());
        assert_eq!(suite.storage_calls(), 0);
        assert!(report.to_string().contains("(estimated)"));
        assert!(report.recommendations.iter().any(|r| r.contains("estimated")));

        let updates = updates.into_inner().unwrap();
        assert!(updates.iter().all(|u| u.phase != Phase::Storage));
        assert_eq!(updates.last().map(|u| u.fraction), Some(1.0));
    }

    #[test]
    fn test_cancel_at_phase_boundary_publishes_nothing() {
        let suite = Arc::new(FixedSuite::balanced());
        let sink = Arc::new(RecordingSink::default());
        let coordinator =
            coordinator(Arc::clone(&suite), ScriptedSensors::steady()).with_sink(sink.clone());
        let rx = coordinator.subscribe();

        let outcome = coordinator.start_full(|update| {
            if update.phase == Phase::Cpu && update.fraction > PREPARE_SHARE {
                assert!(coordinator.cancel());
            }
        });

        assert!(outcome.is_cancelled());
        assert_eq!(coordinator.state(), RunState::Idle);
        assert!(coordinator.latest().is_none());
        assert!(rx.borrow().is_none());
        assert_eq!(sink.count(), 0);
        assert_eq!(suite.call_order(), vec!["cpu"]);
        assert!(!coordinator.cancel());

        let again = coordinator.start_quick(|_| {});
        assert!(again.report().is_some());
    }

    #[test]
    fn test_cancel_before_finalizing_still_cancels() {
        let suite = Arc::new(FixedSuite::balanced());
        let coordinator = coordinator(Arc::clone(&suite), ScriptedSensors::steady());

        let outcome = coordinator.start_quick(|update| {
            if update.label == "Memory benchmark complete" {
                coordinator.cancel();
            }
        });

        assert!(outcome.is_cancelled());
        assert!(coordinator.latest().is_none());
    }

    #[test]
    fn test_start_while_guard_held_is_a_no_op() {
        let suite = Arc::new(FixedSuite::balanced());
        let guard = RunGuard::new();
        let coordinator = Coordinator::new(
            Arc::new(ScriptedSensors::steady()),
            suite.clone(),
            DeviceInfo::placeholder(),
            guard.clone(),
        );

        let held = guard.try_acquire().unwrap();
        let mut calls = 0;
        let outcome = coordinator.start_full(|_| calls += 1);
        assert!(matches!(outcome, RunOutcome::Busy));
        assert_eq!(calls, 0);
        assert!(suite.call_order().is_empty());
        assert_eq!(coordinator.state(), RunState::Idle);

        drop(held);
        assert!(coordinator.start_quick(|_| {}).report().is_some());
    }

    #[test]
    fn test_cancel_right_after_start_is_not_lost() {
        let suite = Arc::new(FixedSuite::balanced());
        let guard = RunGuard::new();
        let coordinator = Arc::new(Coordinator::new(
            Arc::new(ScriptedSensors::steady()),
            suite.clone(),
            DeviceInfo::placeholder(),
            guard.clone(),
        ));
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let canceller = {
            let coordinator = Arc::clone(&coordinator);
            thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(5);
                while !guard.is_active() && Instant::now() < deadline {
                    thread::yield_now();
                }
                let accepted = coordinator.cancel();
                let _ = release_tx.send(());
                accepted
            })
        };

        // The first progress update holds the run until the cancel has landed.
        let outcome = coordinator.start_full(|_| {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
        });

        assert!(canceller.join().unwrap());
        assert!(outcome.is_cancelled());
        assert!(suite.call_order().is_empty());
        assert_eq!(coordinator.state(), RunState::Idle);
        assert!(coordinator.latest().is_none());
    }

    #[test]
    fn test_nested_start_from_progress_callback_is_ignored() {
        let suite = Arc::new(FixedSuite::balanced());
        let coordinator = coordinator(suite, ScriptedSensors::steady());
        let mut nested = Vec::new();

        let outcome = coordinator.start_quick(|update| {
            if update.phase == Phase::Gpu && nested.is_empty() {
                nested.push(coordinator.start_full(|_| {}));
            }
        });

        assert!(outcome.report().is_some());
        assert!(matches!(nested.as_slice(), [RunOutcome::Busy]));
    }

    #[test]
    fn test_speed_drop_and_power_mode_feed_stutter_risk() {
        let suite = Arc::new(FixedSuite::balanced());
        let sensors = ScriptedSensors::steady()
            .with_probes(&[100_000.0, 80_000.0])
            .with_thermals(&[ThermalLevel::Nominal, ThermalLevel::Serious]);
        let coordinator = coordinator(suite.clone(), sensors);

        let report = coordinator.start_full(|_| {}).report().cloned().unwrap();
        assert!((report.environment.speed_drop_percent - 20.0).abs() < 1e-9);
        assert_eq!(report.environment.thermal_start, ThermalLevel::Nominal);
        assert_eq!(report.environment.thermal_end, ThermalLevel::Serious);
        assert_eq!(report.stutter_risk, StutterRisk::Medium);

        let low_power = coordinator_with_low_power(suite);
        let report = low_power.start_full(|_| {}).report().cloned().unwrap();
        assert_eq!(report.stutter_risk, StutterRisk::High);
    }

    fn coordinator_with_low_power(suite: Arc<FixedSuite>) -> Coordinator {
        coordinator(suite, ScriptedSensors::steady().with_low_power(true))
    }

    #[test]
    fn test_zero_start_probe_does_not_poison_report() {
        let suite = Arc::new(FixedSuite::balanced());
        let sensors = ScriptedSensors::steady().with_probes(&[0.0, 50_000.0]);
        let coordinator = coordinator(suite, sensors);

        let report = coordinator.start_full(|_| {}).report().cloned().unwrap();
        assert_eq!(report.environment.speed_drop_percent, 0.0);
    }

    #[test]
    fn test_failing_sink_does_not_fail_run() {
        let suite = Arc::new(FixedSuite::balanced());
        let sink = Arc::new(RecordingSink::failing());
        let coordinator = coordinator(suite, ScriptedSensors::steady()).with_sink(sink.clone());

        assert!(coordinator.start_full(|_| {}).report().is_some());
        assert_eq!(sink.count(), 1);
        assert!(coordinator.latest().is_some());
    }

    #[test]
    fn test_invalid_weights_rejected_before_any_run() {
        let suite = Arc::new(FixedSuite::balanced());
        let weights = ScoreWeights {
            cpu: 1.0,
            gpu: 1.0,
            memory: 0.0,
            storage: 0.0,
        };
        assert!(coordinator(suite, ScriptedSensors::steady())
            .with_weights(weights)
            .is_err());
    }

    #[test]
    fn test_custom_weights_change_composite_only() {
        let suite = Arc::new(FixedSuite::balanced());
        let weights = ScoreWeights {
            cpu: 1.0,
            gpu: 0.0,
            memory: 0.0,
            storage: 0.0,
        };
        let coordinator = coordinator(suite, ScriptedSensors::steady())
            .with_weights(weights)
            .unwrap();

        let report = coordinator.start_full(|_| {}).report().cloned().unwrap();
        assert_eq!(report.overall_score, 10_000);
        assert_eq!(report.cpu.total_score, 10_000);
    }
}
