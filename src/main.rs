//! device-bench - synthetic device benchmarks
//!
//! - `full` / `quick`: CPU, GPU, memory and storage benchmarks with a composite score
//! - `sustained`: repeated GPU load to expose thermal throttling
//! - `detect`: device identity and current sensor readings
//! - `history`: stored reports
//!
//! Ctrl-C cancels the active run at the next phase or cycle boundary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use device_bench::bench::{GpuBenchmark, RunMode, SyntheticSuite};
use device_bench::config::{get_config_path, Config};
use device_bench::coordinator::{NullSink, ProgressUpdate, ReportSink};
use device_bench::sensors::{DeviceInfo, MetricSource, SystemSensors, ThermalLevel};
use device_bench::storage::LocalStorage;
use device_bench::sustained::{CycleProgress, GpuProxyWorkload};
use device_bench::{
    CompositeReport, Coordinator, RunGuard, RunOutcome, SustainedConfig, SustainedController,
    SustainedOutcome,
};

/// device-bench - measure and score device performance
#[derive(Parser)]
#[command(name = "device-bench")]
#[command(version)]
#[command(about = "Benchmark CPU, GPU, memory and storage and detect thermal throttling")]
struct Cli {
    /// Print results as JSON on stdout
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    /// Suppress progress output
    #[arg(short, long, global = true, default_value_t = false)]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every domain benchmark with full workloads
    Full,

    /// Run reduced workloads; storage is estimated from memory speed (default)
    Quick,

    /// Repeat a GPU workload until thermals settle
    Sustained {
        /// Minimum cycles before early stop is allowed
        #[arg(long)]
        min_cycles: Option<u32>,

        /// Hard cap on cycles
        #[arg(long)]
        max_cycles: Option<u32>,

        /// Seconds to wait between cycles
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Matching thermal samples needed to stop early
        #[arg(long)]
        window: Option<u32>,
    },

    /// Show device identity and current sensor readings
    Detect,

    /// List stored reports
    History {
        /// Show one report in full
        #[arg(long)]
        id: Option<String>,

        /// List sustained runs instead of benchmark reports
        #[arg(long, default_value_t = false)]
        sustained: bool,
    },

    /// Show the config file location and contents
    Config {
        /// Write the default config file if none exists
        #[arg(long, default_value_t = false)]
        init: bool,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        "device_bench=debug"
    } else {
        "device_bench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;
    config.validate()?;
    let output = Output {
        json: cli.json,
        progress: !(cli.quiet || cli.json),
    };

    match cli.command.unwrap_or(Commands::Quick) {
        Commands::Full => run_benchmark(&config, RunMode::Full, output).await,
        Commands::Quick => run_benchmark(&config, RunMode::Quick, output).await,
        Commands::Sustained {
            min_cycles,
            max_cycles,
            interval_secs,
            window,
        } => {
            let mut settings = config.sustained.clone();
            if let Some(v) = min_cycles {
                settings.min_cycles = v;
            }
            if let Some(v) = max_cycles {
                settings.max_cycles = v;
            }
            if let Some(v) = interval_secs {
                settings.interval_secs = v;
            }
            if let Some(v) = window {
                settings.stable_thermal_window = v;
            }
            run_sustained(&config, settings.to_config(), output).await
        }
        Commands::Detect => detect(output),
        Commands::History { id, sustained } => history(&config, id, sustained, output),
        Commands::Config { init } => show_config(init, output),
    }
}

#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
    progress: bool,
}

impl Output {
    fn json<T: Serialize>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
        println!("{text}");
        Ok(())
    }
}

fn open_storage(config: &Config) -> Result<LocalStorage> {
    match &config.storage.data_dir {
        Some(dir) => LocalStorage::open(dir.clone()),
        None => LocalStorage::new(),
    }
}

async fn run_benchmark(config: &Config, mode: RunMode, output: Output) -> Result<()> {
    let sensors = Arc::new(SystemSensors::new());
    let suite = Arc::new(SyntheticSuite::new(
        sensors.available_parallelism(),
        config.storage.scratch_root(),
    ));
    let sink: Arc<dyn ReportSink> = match open_storage(config) {
        Ok(storage) => Arc::new(storage),
        Err(err) => {
            warn!(error = %format!("{err:#}"), "Report history unavailable; results will not be saved");
            Arc::new(NullSink)
        }
    };
    let coordinator = Arc::new(
        Coordinator::new(sensors, suite, DeviceInfo::detect(), RunGuard::new())
            .with_sink(sink)
            .with_stutter_thresholds(config.stutter),
    );

    if output.progress {
        println!();
        println!(
            "{} {}",
            "Running benchmark:".bright_white().bold(),
            mode.description()
        );
    }

    let worker = {
        let coordinator = Arc::clone(&coordinator);
        let show = output.progress;
        tokio::task::spawn_blocking(move || {
            coordinator.run(mode, |update| {
                if show {
                    render_progress(&update);
                }
            })
        })
    };
    let outcome = wait_or_cancel(worker, || {
        coordinator.cancel();
    })
    .await?;

    match outcome {
        RunOutcome::Completed(report) => print_report(&report, output),
        RunOutcome::Cancelled => {
            println!("{}", "Benchmark cancelled. No results were saved.".bright_yellow());
            Ok(())
        }
        RunOutcome::Busy => {
            println!("{}", "Another benchmark is already running.".bright_yellow());
            Ok(())
        }
    }
}

async fn run_sustained(
    config: &Config,
    sustained: SustainedConfig,
    output: Output,
) -> Result<()> {
    sustained.validate()?;

    let controller = Arc::new(
        SustainedController::new(
            Arc::new(SystemSensors::new()),
            Arc::new(GpuProxyWorkload::new(GpuBenchmark::detect())),
            RunGuard::new(),
        )
        .with_stutter_thresholds(config.stutter),
    );

    if output.progress {
        println!();
        println!(
            "{} up to {} cycles, {}s apart",
            "Sustained load:".bright_white().bold(),
            sustained.max_cycles,
            sustained.interval.as_secs()
        );
    }

    let worker = {
        let controller = Arc::clone(&controller);
        let show = output.progress;
        tokio::task::spawn_blocking(move || {
            controller.start(&sustained, |progress| {
                if show {
                    render_cycle(&progress);
                }
            })
        })
    };
    let outcome = wait_or_cancel(worker, || {
        controller.cancel();
    })
    .await??;

    match outcome {
        SustainedOutcome::Completed(result) => {
            match open_storage(config).and_then(|storage| storage.save_sustained(&result)) {
                Ok(_) => {}
                Err(err) => warn!(error = %format!("{err:#}"), "Failed to save sustained result"),
            }
            if output.json {
                output.json(&*result)
            } else {
                println!();
                print!("{}", result);
                Ok(())
            }
        }
        SustainedOutcome::Cancelled => {
            println!("{}", "Sustained run cancelled.".bright_yellow());
            Ok(())
        }
        SustainedOutcome::Busy => {
            println!("{}", "Another benchmark is already running.".bright_yellow());
            Ok(())
        }
    }
}

/// Wait for a blocking run. The first Ctrl-C requests a cooperative cancel; a
/// second one exits without waiting for the current step.
async fn wait_or_cancel<T>(worker: JoinHandle<T>, cancel: impl FnOnce()) -> Result<T> {
    match wait_with_interrupts(worker, cancel, tokio::signal::ctrl_c).await? {
        Some(value) => Ok(value),
        None => {
            eprintln!("{}", "Interrupted again; exiting now.".bright_red());
            std::process::exit(130);
        }
    }
}

/// `None` when a second interrupt arrives before the worker finishes.
async fn wait_with_interrupts<T, F, Fut>(
    mut worker: JoinHandle<T>,
    cancel: impl FnOnce(),
    mut interrupt: F,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut cancel = Some(cancel);
    loop {
        tokio::select! {
            joined = &mut worker => return joined.map(Some).context("Benchmark worker failed"),
            signal = interrupt() => match signal {
                Err(err) => {
                    warn!(error = %err, "Failed to listen for Ctrl-C");
                    return worker.await.map(Some).context("Benchmark worker failed");
                }
                Ok(()) => match cancel.take() {
                    Some(cancel) => {
                        eprintln!(
                            "{}",
                            "Cancelling after the current step... (Ctrl-C again to quit)"
                                .bright_yellow()
                        );
                        cancel();
                    }
                    None => return Ok(None),
                },
            },
        }
    }
}

fn render_progress(update: &ProgressUpdate) {
    let width = 26usize;
    let filled = (update.fraction * width as f64).round() as usize;
    let bar = format!(
        "{}{}",
        "#".repeat(filled.min(width)),
        "-".repeat(width.saturating_sub(filled))
    );
    let percent = (update.fraction * 100.0).round() as u64;

    println!(
        "   [{}] {:>3}% {}",
        bar.bright_cyan(),
        percent,
        update.label.bright_white()
    );
}

fn render_cycle(progress: &CycleProgress) {
    let width = 26usize;
    let filled = (progress.fraction * width as f64).round() as usize;
    let bar = format!(
        "{}{}",
        "#".repeat(filled.min(width)),
        "-".repeat(width.saturating_sub(filled))
    );

    println!(
        "   [{}] cycle {}/{} score {} thermal {}",
        bar.bright_cyan(),
        progress.cycle,
        progress.max_cycles,
        progress.score.to_string().bright_white(),
        thermal_colored(progress.thermal)
    );
}

fn thermal_colored(level: ThermalLevel) -> ColoredString {
    match level {
        ThermalLevel::Nominal => level.label().bright_green(),
        ThermalLevel::Fair => level.label().bright_yellow(),
        ThermalLevel::Serious => level.label().bright_red(),
        ThermalLevel::Critical => level.label().red().bold(),
    }
}

fn print_report(report: &CompositeReport, output: Output) -> Result<()> {
    if output.json {
        return output.json(report);
    }

    println!();
    println!("{}", "=".repeat(50).bright_blue());
    println!(
        "   {} {} ({})",
        "Overall score:".bright_white().bold(),
        report.overall_score.to_string().bright_cyan().bold(),
        report.overall_grade
    );
    println!("{}", "=".repeat(50).bright_blue());
    print!("{}", report);
    println!("   Saved as {}", report.id.to_string().dimmed());
    Ok(())
}

#[derive(Serialize)]
struct SensorSnapshot {
    thermal: ThermalLevel,
    battery_percent: u8,
    low_power_mode: bool,
    parallelism: usize,
}

#[derive(Serialize)]
struct DetectOutput {
    device: DeviceInfo,
    sensors: SensorSnapshot,
}

fn detect(output: Output) -> Result<()> {
    let sensors = SystemSensors::new();
    let detected = DetectOutput {
        device: DeviceInfo::detect(),
        sensors: SensorSnapshot {
            thermal: sensors.current_thermal_state(),
            battery_percent: sensors.battery_level_percent(),
            low_power_mode: sensors.is_low_power_mode_active(),
            parallelism: sensors.available_parallelism(),
        },
    };

    if output.json {
        return output.json(&detected);
    }
    println!("{}", detected.device);
    println!("  Thermal: {}", thermal_colored(detected.sensors.thermal));
    println!("  Battery: {}%", detected.sensors.battery_percent);
    println!(
        "  Low power mode: {}",
        if detected.sensors.low_power_mode {
            "on"
        } else {
            "off"
        }
    );
    println!("  Parallelism: {}", detected.sensors.parallelism);
    Ok(())
}

fn history(config: &Config, id: Option<String>, sustained: bool, output: Output) -> Result<()> {
    let storage = open_storage(config)?;

    if let Some(id) = id {
        let report = storage.load_report(&id)?;
        return print_report(&report, output);
    }

    if sustained {
        let results = storage.list_sustained()?;
        if output.json {
            return output.json(&results);
        }
        if results.is_empty() {
            println!("No sustained runs stored yet.");
        }
        for result in &results {
            println!(
                "{}  {}  {} cycles  {:.1}% stability  {}",
                result.started_at.format("%Y-%m-%d %H:%M"),
                result.id.to_string().dimmed(),
                result.cycles,
                result.stability_percent,
                result.verdict
            );
        }
        return Ok(());
    }

    let reports = storage.list_reports()?;
    if output.json {
        return output.json(&reports);
    }
    if reports.is_empty() {
        println!("No reports stored yet. Run `device-bench quick` to create one.");
    }
    for summary in &reports {
        println!(
            "{}  {}  {:<5}  {:>6} ({}){}",
            summary.started_at.format("%Y-%m-%d %H:%M"),
            summary.id.to_string().dimmed(),
            summary.mode.profile_key(),
            summary.overall_score.to_string().bright_cyan(),
            summary.overall_grade,
            if summary.storage_estimated {
                "  storage estimated"
            } else {
                ""
            }
        );
    }
    Ok(())
}

fn show_config(init: bool, output: Output) -> Result<()> {
    let config = if init { Config::init()? } else { Config::load()? };
    if output.json {
        return output.json(&config);
    }
    println!("{} {}", "Config file:".bright_white().bold(), get_config_path()?);
    print!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to serialize config to TOML")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_worker_result_returned_without_interrupt() {
        let mut cancels = 0;
        let worker = tokio::spawn(async { 7u32 });

        let waited = wait_with_interrupts(worker, || cancels += 1, || {
            std::future::pending::<std::io::Result<()>>()
        })
        .await
        .unwrap();

        assert_eq!(waited, Some(7));
        assert_eq!(cancels, 0);
    }

    #[tokio::test]
    async fn test_first_interrupt_cancels_and_waits_for_worker() {
        let (tx, rx) = oneshot::channel::<()>();
        let worker = tokio::spawn(async move { rx.await.is_ok() });
        let mut calls = 0;

        let waited = wait_with_interrupts(
            worker,
            move || {
                let _ = tx.send(());
            },
            move || {
                calls += 1;
                let first = calls == 1;
                async move {
                    if first {
                        Ok(())
                    } else {
                        std::future::pending::<std::io::Result<()>>().await
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(waited, Some(true));
    }

    #[tokio::test]
    async fn test_second_interrupt_abandons_the_wait() {
        let mut cancels = 0;
        let worker = tokio::spawn(std::future::pending::<u32>());

        let waited = wait_with_interrupts(worker, || cancels += 1, || async { Ok(()) })
            .await
            .unwrap();

        assert_eq!(waited, None);
        assert_eq!(cancels, 1);
    }
}
