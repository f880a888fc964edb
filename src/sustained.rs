//! Sustained-load controller
//!
//! Repeats a short workload to expose thermal throttling. Each cycle runs the
//! workload, samples the thermal state and reports progress. The loop stops early
//! once `min_cycles` have run and the last `stable_thermal_window` thermal samples
//! agree, otherwise it runs `max_cycles`. Cycles are spaced by a cancellable sleep.
//!
//! Shares its [`RunGuard`] with the coordinator, so a sustained run and a full or
//! quick run never overlap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bench::{DomainBenchmark, GpuBenchmark};
use crate::error::{BenchError, BenchResult};
use crate::run::{lock_recover, CancelToken, ResultSlot, RunGuard};
use crate::sensors::{MetricSource, ThermalLevel};
use crate::throttle::{
    speed_drop_percent, stability_percent, throttling_detected, StabilityVerdict,
    StutterThresholds,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SustainedConfig {
    pub min_cycles: u32,
    pub max_cycles: u32,
    pub interval: Duration,
    /// Number of trailing thermal samples that must agree to stop early.
    pub stable_thermal_window: u32,
}

impl Default for SustainedConfig {
    fn default() -> Self {
        Self {
            min_cycles: 3,
            max_cycles: 10,
            interval: Duration::from_secs(5),
            stable_thermal_window: 3,
        }
    }
}

impl SustainedConfig {
    pub fn validate(&self) -> BenchResult<()> {
        if self.min_cycles == 0 {
            return Err(BenchError::InvalidConfig(
                "sustained min_cycles must be at least 1".to_string(),
            ));
        }
        if self.min_cycles > self.max_cycles {
            return Err(BenchError::InvalidConfig(format!(
                "sustained min_cycles ({}) exceeds max_cycles ({})",
                self.min_cycles, self.max_cycles
            )));
        }
        if self.stable_thermal_window == 0 {
            return Err(BenchError::InvalidConfig(
                "sustained stable_thermal_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One repeatable unit of load. Returns the cycle's score.
pub trait CycleWorkload: Send + Sync {
    fn name(&self) -> &str;
    fn run_cycle(&self) -> u32;
}

/// Quick GPU pass as the per-cycle load.
pub struct GpuProxyWorkload {
    bench: GpuBenchmark,
}

impl GpuProxyWorkload {
    pub fn new(bench: GpuBenchmark) -> Self {
        Self { bench }
    }
}

impl CycleWorkload for GpuProxyWorkload {
    fn name(&self) -> &str {
        "gpu-quick"
    }

    fn run_cycle(&self) -> u32 {
        self.bench.run_quick().total_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SustainedState {
    Idle,
    Running { cycle: u32 },
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleProgress {
    /// 1-based index of the cycle just finished.
    pub cycle: u32,
    pub max_cycles: u32,
    pub fraction: f64,
    pub score: u32,
    pub thermal: ThermalLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SustainedRunResult {
    pub id: Uuid,
    pub workload: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub cycles: u32,
    pub cycle_scores: Vec<u32>,
    pub thermal_history: Vec<ThermalLevel>,
    pub first_score: u32,
    pub last_score: u32,
    pub stability_percent: f64,
    pub verdict: StabilityVerdict,
    pub cpu_probe_start: f64,
    pub cpu_probe_end: f64,
    pub speed_drop_percent: f64,
    pub throttling_detected: bool,
    pub thermal_start: ThermalLevel,
    pub thermal_end: ThermalLevel,
    pub battery_start: u8,
    pub battery_end: u8,
    pub early_stopped: bool,
}

impl fmt::Display for SustainedRunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sustained Load ({})", self.workload)?;
        writeln!(
            f,
            "  Cycles: {}{}",
            self.cycles,
            if self.early_stopped {
                " (thermals settled)"
            } else {
                ""
            }
        )?;
        writeln!(
            f,
            "  Score: {} -> {} ({:.1}% stability, {})",
            self.first_score, self.last_score, self.stability_percent, self.verdict
        )?;
        writeln!(f, "  Speed drop: {:.1}%", self.speed_drop_percent)?;
        writeln!(f, "  Thermal: {} -> {}", self.thermal_start, self.thermal_end)?;
        writeln!(f, "  Battery: {}% -> {}%", self.battery_start, self.battery_end)?;
        writeln!(
            f,
            "  Throttling: {}",
            if self.throttling_detected {
                "detected"
            } else {
                "not detected"
            }
        )
    }
}

#[derive(Debug, Clone)]
pub enum SustainedOutcome {
    Completed(Arc<SustainedRunResult>),
    Cancelled,
    Busy,
}

impl SustainedOutcome {
    pub fn result(&self) -> Option<&SustainedRunResult> {
        match self {
            SustainedOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }
}

/// True once `history` holds at least `window` samples and the trailing `window` are equal.
pub fn thermal_window_is_stable(history: &[ThermalLevel], window: usize) -> bool {
    if window == 0 || history.len() < window {
        return false;
    }
    history[history.len() - window..]
        .windows(2)
        .all(|pair| pair[0] == pair[1])
}

pub struct SustainedController {
    sensors: Arc<dyn MetricSource>,
    workload: Arc<dyn CycleWorkload>,
    guard: RunGuard,
    thresholds: StutterThresholds,
    state: Mutex<SustainedState>,
    active: Mutex<Option<CancelToken>>,
    results: ResultSlot<SustainedRunResult>,
}

impl SustainedController {
    pub fn new(
        sensors: Arc<dyn MetricSource>,
        workload: Arc<dyn CycleWorkload>,
        guard: RunGuard,
    ) -> Self {
        Self {
            sensors,
            workload,
            guard,
            thresholds: StutterThresholds::default(),
            state: Mutex::new(SustainedState::Idle),
            active: Mutex::new(None),
            results: ResultSlot::new(),
        }
    }

    pub fn with_stutter_thresholds(mut self, thresholds: StutterThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn state(&self) -> SustainedState {
        *lock_recover(&self.state)
    }

    pub fn latest(&self) -> Option<Arc<SustainedRunResult>> {
        self.results.latest()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<SustainedRunResult>>> {
        self.results.subscribe()
    }

    /// Request cancellation; an in-progress sleep wakes immediately.
    pub fn cancel(&self) -> bool {
        match lock_recover(&self.active).as_ref() {
            Some(token) => {
                info!("Sustained run cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run the sustained loop on the calling thread.
    ///
    /// Invalid configs are rejected before the guard is touched.
    pub fn start(
        &self,
        config: &SustainedConfig,
        mut on_progress: impl FnMut(CycleProgress),
    ) -> BenchResult<SustainedOutcome> {
        config.validate()?;

        // The token is stored under the same lock as the guard claim so a cancel
        // arriving in between is never dropped.
        let mut active = lock_recover(&self.active);
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("Sustained start ignored; another run is active");
            return Ok(SustainedOutcome::Busy);
        };
        let token = CancelToken::new();
        *active = Some(token.clone());
        drop(active);
        info!(
            workload = self.workload.name(),
            min_cycles = config.min_cycles,
            max_cycles = config.max_cycles,
            interval_ms = config.interval.as_millis() as u64,
            "Sustained run started"
        );

        let outcome = self.run_cycles(config, &token, &mut on_progress);

        *lock_recover(&self.active) = None;
        match &outcome {
            SustainedOutcome::Completed(result) => {
                self.set_state(SustainedState::Completed);
                info!(
                    cycles = result.cycles,
                    stability = result.stability_percent,
                    throttling = result.throttling_detected,
                    early_stopped = result.early_stopped,
                    "Sustained run completed"
                );
            }
            _ => {
                self.set_state(SustainedState::Idle);
                info!("Sustained run cancelled");
            }
        }
        Ok(outcome)
    }

    fn run_cycles(
        &self,
        config: &SustainedConfig,
        token: &CancelToken,
        on_progress: &mut dyn FnMut(CycleProgress),
    ) -> SustainedOutcome {
        let started_at = Utc::now();
        let thermal_start = self.sensors.current_thermal_state();
        let battery_start = self.sensors.battery_level_percent();
        let probe_start = self.sensors.cpu_throughput_probe();

        let mut scores = Vec::new();
        let mut thermals = Vec::new();
        let mut early_stopped = false;

        for index in 0..config.max_cycles {
            if token.is_cancelled() {
                return SustainedOutcome::Cancelled;
            }
            let cycle = index + 1;
            self.set_state(SustainedState::Running { cycle });

            let score = self.workload.run_cycle();
            let thermal = self.sensors.current_thermal_state();
            scores.push(score);
            thermals.push(thermal);
            debug!(cycle, score, thermal = %thermal, "Sustained cycle finished");

            on_progress(CycleProgress {
                cycle,
                max_cycles: config.max_cycles,
                fraction: cycle as f64 / config.max_cycles as f64,
                score,
                thermal,
            });

            if cycle >= config.min_cycles
                && thermal_window_is_stable(&thermals, config.stable_thermal_window as usize)
            {
                debug!(cycle, thermal = %thermal, "Thermal state settled; stopping early");
                early_stopped = true;
                break;
            }

            if cycle < config.max_cycles && token.sleep(config.interval) {
                return SustainedOutcome::Cancelled;
            }
        }

        if token.is_cancelled() {
            return SustainedOutcome::Cancelled;
        }

        let probe_end = self.sensors.cpu_throughput_probe();
        let thermal_end = self.sensors.current_thermal_state();
        let battery_end = self.sensors.battery_level_percent();

        let first_score = scores.first().copied().unwrap_or(0);
        let last_score = scores.last().copied().unwrap_or(0);
        let stability = stability_percent(first_score, last_score);
        let drop = speed_drop_percent(probe_start, probe_end);

        let result = SustainedRunResult {
            id: Uuid::new_v4(),
            workload: self.workload.name().to_string(),
            started_at,
            ended_at: Utc::now(),
            cycles: scores.len() as u32,
            first_score,
            last_score,
            stability_percent: stability,
            verdict: StabilityVerdict::from_percent(stability),
            cpu_probe_start: probe_start,
            cpu_probe_end: probe_end,
            speed_drop_percent: drop,
            throttling_detected: throttling_detected(stability, drop, &self.thresholds),
            thermal_start,
            thermal_end,
            battery_start,
            battery_end,
            early_stopped,
            cycle_scores: scores,
            thermal_history: thermals,
        };
        SustainedOutcome::Completed(self.results.publish(result))
    }

    fn set_state(&self, state: SustainedState) {
        *lock_recover(&self.state) = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Coordinator, Phase, RunOutcome};
    use crate::sensors::DeviceInfo;
    use crate::testing::{FixedSuite, ScriptedSensors, ScriptedWorkload};
    use std::thread;
    use std::time::Instant;

    fn config(min: u32, max: u32) -> SustainedConfig {
        SustainedConfig {
            min_cycles: min,
            max_cycles: max,
            interval: Duration::from_millis(1),
            stable_thermal_window: 3,
        }
    }

    fn controller(
        sensors: ScriptedSensors,
        workload: Arc<ScriptedWorkload>,
    ) -> SustainedController {
        SustainedController::new(Arc::new(sensors), workload, RunGuard::new())
    }

    #[test]
    fn test_stable_thermals_stop_after_min_cycles() {
        let workload = Arc::new(ScriptedWorkload::new(&[8_748, 8_700, 8_520, 8_400]));
        let sensors = ScriptedSensors::steady();
        let controller = controller(sensors, Arc::clone(&workload));
        let mut progress = Vec::new();

        let outcome = controller
            .start(&config(3, 10), |p| progress.push(p))
            .unwrap();

        let result = outcome.result().expect("run should complete");
        assert_eq!(result.cycles, 3);
        assert!(result.early_stopped);
        assert_eq!(workload.runs(), 3);
        assert_eq!(result.cycle_scores, vec![8_748, 8_700, 8_520]);
        assert_eq!(result.cycle_scores.len() as u32, result.cycles);
        assert!((result.stability_percent - 97.39).abs() < 0.01);
        assert_eq!(result.verdict, StabilityVerdict::Excellent);
        assert!(!result.throttling_detected);
        assert_eq!(controller.state(), SustainedState::Completed);

        let fractions: Vec<f64> = progress.iter().map(|p| p.fraction).collect();
        assert_eq!(fractions, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_changing_thermals_keep_running_until_window_agrees() {
        // start sample, then one per cycle, then the end sample
        let sensors = ScriptedSensors::steady().with_thermals(&[
            ThermalLevel::Nominal,
            ThermalLevel::Nominal,
            ThermalLevel::Fair,
            ThermalLevel::Serious,
            ThermalLevel::Serious,
            ThermalLevel::Serious,
        ])
        .with_batteries(&[90, 84]);
        let workload = Arc::new(ScriptedWorkload::new(&[9_000, 8_800, 8_000, 7_500, 7_400]));
        let controller = controller(sensors, Arc::clone(&workload));

        let result = controller
            .start(&config(3, 10), |_| {})
            .unwrap()
            .result()
            .cloned()
            .unwrap();

        assert_eq!(result.cycles, 5);
        assert!(result.early_stopped);
        assert_eq!(
            result.thermal_history,
            vec![
                ThermalLevel::Nominal,
                ThermalLevel::Fair,
                ThermalLevel::Serious,
                ThermalLevel::Serious,
                ThermalLevel::Serious
            ]
        );
        assert_eq!(result.thermal_start, ThermalLevel::Nominal);
        assert_eq!(result.thermal_end, ThermalLevel::Serious);
        assert_eq!((result.battery_start, result.battery_end), (90, 84));
        assert!(result.throttling_detected);
    }

    #[test]
    fn test_never_stable_runs_max_cycles() {
        let pattern: Vec<ThermalLevel> = std::iter::once(ThermalLevel::Nominal)
            .chain(
                [ThermalLevel::Nominal, ThermalLevel::Fair]
                    .into_iter()
                    .cycle()
                    .take(12),
            )
            .collect();
        let sensors = ScriptedSensors::steady().with_thermals(&pattern);
        let workload = Arc::new(ScriptedWorkload::new(&[5_000]));
        let controller = controller(sensors, Arc::clone(&workload));

        let result = controller
            .start(&config(3, 10), |_| {})
            .unwrap()
            .result()
            .cloned()
            .unwrap();

        assert_eq!(result.cycles, 10);
        assert!(!result.early_stopped);
        assert_eq!(workload.runs(), 10);
    }

    #[test]
    fn test_min_equal_to_max_runs_exactly_max() {
        let workload = Arc::new(ScriptedWorkload::new(&[5_000]));
        let controller = controller(ScriptedSensors::steady(), Arc::clone(&workload));

        let result = controller
            .start(&config(4, 4), |_| {})
            .unwrap()
            .result()
            .cloned()
            .unwrap();

        assert_eq!(result.cycles, 4);
        assert_eq!(workload.runs(), 4);
    }

    #[test]
    fn test_zero_first_score_gives_zero_stability() {
        let workload = Arc::new(ScriptedWorkload::new(&[0, 100, 200]));
        let controller = controller(ScriptedSensors::steady(), workload);

        let result = controller
            .start(&config(3, 3), |_| {})
            .unwrap()
            .result()
            .cloned()
            .unwrap();

        assert_eq!(result.stability_percent, 0.0);
        assert_eq!(result.verdict, StabilityVerdict::Poor);
    }

    #[test]
    fn test_invalid_configs_are_rejected_up_front() {
        let workload = Arc::new(ScriptedWorkload::new(&[1]));
        let controller = controller(ScriptedSensors::steady(), Arc::clone(&workload));

        for bad in [
            config(5, 3),
            config(0, 3),
            SustainedConfig {
                stable_thermal_window: 0,
                ..config(1, 3)
            },
        ] {
            assert!(matches!(
                controller.start(&bad, |_| {}),
                Err(BenchError::InvalidConfig(_))
            ));
        }
        assert_eq!(workload.runs(), 0);
        assert_eq!(controller.state(), SustainedState::Idle);
    }

    #[test]
    fn test_cancel_during_sleep_returns_promptly() {
        let workload = Arc::new(ScriptedWorkload::new(&[5_000]));
        let sensors = ScriptedSensors::steady()
            .with_thermals(&[ThermalLevel::Nominal, ThermalLevel::Fair, ThermalLevel::Nominal]);
        let controller = Arc::new(controller(sensors, Arc::clone(&workload)));
        let long = SustainedConfig {
            interval: Duration::from_secs(30),
            ..config(3, 10)
        };

        let runner = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.start(&long, |_| {}))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while workload.runs() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(20));
        let cancelled_at = Instant::now();
        assert!(controller.cancel());

        let outcome = runner.join().unwrap().unwrap();
        assert!(matches!(outcome, SustainedOutcome::Cancelled));
        assert!(cancelled_at.elapsed() < Duration::from_secs(5));
        assert_eq!(workload.runs(), 1);
        assert_eq!(controller.state(), SustainedState::Idle);
        assert!(controller.latest().is_none());
    }

    #[test]
    fn test_cancel_from_progress_stops_before_next_cycle() {
        let workload = Arc::new(ScriptedWorkload::new(&[5_000]));
        let sensors = ScriptedSensors::steady()
            .with_thermals(&[ThermalLevel::Nominal, ThermalLevel::Fair, ThermalLevel::Nominal]);
        let controller = controller(sensors, Arc::clone(&workload));

        let outcome = controller
            .start(&config(3, 10), |p| {
                if p.cycle == 2 {
                    controller.cancel();
                }
            })
            .unwrap();

        assert!(matches!(outcome, SustainedOutcome::Cancelled));
        assert_eq!(workload.runs(), 2);
    }

    #[test]
    fn test_shared_guard_blocks_concurrent_runs() {
        let guard = RunGuard::new();
        let workload = Arc::new(ScriptedWorkload::new(&[1]));
        let controller = SustainedController::new(
            Arc::new(ScriptedSensors::steady()),
            workload.clone(),
            guard.clone(),
        );

        let held = guard.try_acquire().unwrap();
        assert!(matches!(
            controller.start(&config(1, 3), |_| {}),
            Ok(SustainedOutcome::Busy)
        ));
        assert_eq!(workload.runs(), 0);
        drop(held);
        assert!(controller.start(&config(1, 1), |_| {}).unwrap().result().is_some());
    }

    fn wait_for_first_cycle(workload: &ScriptedWorkload) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while workload.runs() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(20));
    }

    #[test]
    fn test_two_sample_window_stops_on_fourth_cycle() {
        use ThermalLevel::*;
        // start sample, then fair, fair, nominal, nominal, nominal
        let sensors =
            ScriptedSensors::steady().with_thermals(&[Nominal, Fair, Fair, Nominal, Nominal, Nominal]);
        let workload = Arc::new(ScriptedWorkload::new(&[6_000]));
        let controller = controller(sensors, Arc::clone(&workload));
        let window_of_two = SustainedConfig {
            stable_thermal_window: 2,
            ..config(3, 8)
        };

        let result = controller
            .start(&window_of_two, |_| {})
            .unwrap()
            .result()
            .cloned()
            .unwrap();

        assert_eq!(result.cycles, 4);
        assert!(result.early_stopped);
        assert_eq!(workload.runs(), 4);
        assert_eq!(result.thermal_history, vec![Fair, Fair, Nominal, Nominal]);
    }

    #[test]
    fn test_huge_max_cycles_still_stops_early() {
        let workload = Arc::new(ScriptedWorkload::new(&[7_000]));
        let controller = controller(ScriptedSensors::steady(), Arc::clone(&workload));
        let open_ended = SustainedConfig {
            min_cycles: 1,
            max_cycles: u32::MAX,
            interval: Duration::ZERO,
            stable_thermal_window: 1,
        };
        let mut fractions = Vec::new();

        let result = controller
            .start(&open_ended, |p| fractions.push(p.fraction))
            .unwrap()
            .result()
            .cloned()
            .unwrap();

        assert_eq!(result.cycles, 1);
        assert!(result.early_stopped);
        assert_eq!(fractions, vec![1.0 / u32::MAX as f64]);
    }

    #[test]
    fn test_interval_past_clock_range_can_be_cancelled() {
        let workload = Arc::new(ScriptedWorkload::new(&[5_000]));
        let controller = Arc::new(controller(ScriptedSensors::steady(), Arc::clone(&workload)));
        let endless = SustainedConfig {
            interval: Duration::from_secs(u64::MAX),
            ..config(3, 10)
        };
        assert!(endless.validate().is_ok());

        let runner = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.start(&endless, |_| {}))
        };
        wait_for_first_cycle(&workload);
        assert!(controller.cancel());

        let outcome = runner.join().unwrap().unwrap();
        assert!(matches!(outcome, SustainedOutcome::Cancelled));
        assert_eq!(workload.runs(), 1);
        assert_eq!(controller.state(), SustainedState::Idle);
        assert!(controller.latest().is_none());
    }

    #[test]
    fn test_cancel_right_after_start_is_not_lost() {
        let guard = RunGuard::new();
        let workload = Arc::new(ScriptedWorkload::new(&[5_000]));
        let controller = Arc::new(SustainedController::new(
            Arc::new(ScriptedSensors::steady()),
            workload.clone(),
            guard.clone(),
        ));
        let long = SustainedConfig {
            interval: Duration::from_secs(30),
            ..config(3, 10)
        };

        let canceller = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(5);
                while !guard.is_active() && Instant::now() < deadline {
                    thread::yield_now();
                }
                controller.cancel()
            })
        };

        let outcome = controller.start(&long, |_| {}).unwrap();
        assert!(canceller.join().unwrap());
        assert!(matches!(outcome, SustainedOutcome::Cancelled));
        assert!(workload.runs() <= 1);
        assert_eq!(controller.state(), SustainedState::Idle);
    }

    #[test]
    fn test_coordinator_and_controller_exclude_each_other() {
        let guard = RunGuard::new();
        let workload = Arc::new(ScriptedWorkload::new(&[5_000]));
        let controller = Arc::new(SustainedController::new(
            Arc::new(ScriptedSensors::steady()),
            workload.clone(),
            guard.clone(),
        ));
        let suite = Arc::new(FixedSuite::balanced());
        let coordinator = Coordinator::new(
            Arc::new(ScriptedSensors::steady()),
            suite.clone(),
            DeviceInfo::placeholder(),
            guard.clone(),
        );

        // A sustained run parked in its inter-cycle sleep blocks the coordinator.
        let long = SustainedConfig {
            interval: Duration::from_secs(30),
            ..config(3, 10)
        };
        let runner = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.start(&long, |_| {}))
        };
        wait_for_first_cycle(&workload);
        assert!(matches!(coordinator.start_quick(|_| {}), RunOutcome::Busy));
        assert!(suite.call_order().is_empty());
        assert!(controller.cancel());
        assert!(matches!(
            runner.join().unwrap().unwrap(),
            SustainedOutcome::Cancelled
        ));

        // A coordinator run blocks the controller.
        let mut nested = Vec::new();
        let outcome = coordinator.start_quick(|update| {
            if update.phase == Phase::Cpu && nested.is_empty() {
                nested.push(controller.start(&config(1, 1), |_| {}));
            }
        });
        assert!(outcome.report().is_some());
        assert!(matches!(nested.as_slice(), [Ok(SustainedOutcome::Busy)]));
        assert_eq!(workload.runs(), 1);
        assert!(!guard.is_active());
    }

    #[test]
    fn test_window_check_requires_enough_samples() {
        use ThermalLevel::*;
        assert!(!thermal_window_is_stable(&[Nominal, Nominal], 3));
        assert!(thermal_window_is_stable(&[Fair, Nominal, Nominal, Nominal], 3));
        assert!(!thermal_window_is_stable(&[Nominal, Nominal, Fair], 3));
        assert!(thermal_window_is_stable(&[Critical], 1));
    }
}
