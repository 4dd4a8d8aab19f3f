// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::path::PathBuf;

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate, validate_config};
use crate::engine::{
    LoggingListener, PipelineEvent, PipelineMachine, PipelineReport, PipelineStatus, Runtime,
    StageResult,
};
use crate::exec::Supervisor;
use crate::types::{format_elapsed, parse_duration};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (+ CLI overrides)
/// - the subprocess supervisor
/// - the pipeline state machine and its runtime
/// - Ctrl-C handling (graceful stop)
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = apply_overrides(load_and_validate(&config_path)?, &args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let (plan, options) = cfg.into_parts();
    info!(
        poll_interval_ms = options.poll_interval.as_millis() as u64,
        stop_timeout_ms = options.stop_timeout.as_millis() as u64,
        "starting pipeline"
    );

    // Pipeline event channel: supervisor polls + driver stop requests.
    let (rt_tx, rt_rx) = mpsc::channel::<PipelineEvent>(64);

    let supervisor = Supervisor::spawn(rt_tx.clone(), options);

    // Ctrl-C → stop the running stage.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
                if tx.send(PipelineEvent::StopRequested).await.is_err() {
                    return;
                }
            }
        });
    }

    let core = PipelineMachine::new(plan).with_listener(Box::new(LoggingListener));
    let runtime = Runtime::new(core, rt_rx, supervisor);
    let report = runtime.run().await?;

    print_summary(&report);

    match report.status {
        PipelineStatus::Done => Ok(()),
        PipelineStatus::Failed { stage } => bail!("pipeline failed at stage '{stage}'"),
        PipelineStatus::Cancelled { stage } => bail!("pipeline cancelled during stage '{stage}'"),
        other => bail!("pipeline stopped without reaching a terminal stage ({other:?})"),
    }
}

/// Apply `--poll-interval` / `--stop-timeout` and re-validate.
fn apply_overrides(cfg: ConfigFile, args: &CliArgs) -> Result<ConfigFile> {
    let mut options = cfg.options();
    if let Some(ref s) = args.poll_interval {
        options.poll_interval = parse_duration(s).map_err(anyhow::Error::msg)?;
    }
    if let Some(ref s) = args.stop_timeout {
        options.stop_timeout = parse_duration(s).map_err(anyhow::Error::msg)?;
    }

    let cfg = cfg.with_options(options);
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Dry-run output: stage order, commands and timings.
fn print_dry_run(cfg: &ConfigFile) {
    let options = cfg.options();
    println!("rnaflow dry-run");
    println!("  config.poll_interval = {:?}", options.poll_interval);
    println!("  config.initial_delay = {:?}", options.initial_delay);
    println!("  config.stop_timeout = {:?}", options.stop_timeout);
    if let Some(dir) = cfg.workdir() {
        println!("  config.workdir = {}", dir.display());
    }
    println!();

    println!("stages ({}):", cfg.plan().iter().count());
    for (stage, command) in cfg.plan().iter() {
        println!("  {}. {stage}", stage.position().unwrap_or(0));
        println!("      program: {}", command.program());
        if !command.arguments().is_empty() {
            println!("      args: {:?}", command.arguments());
        }
    }

    debug!("dry-run complete (no execution)");
}

fn print_summary(report: &PipelineReport) {
    println!("rnaflow summary:");
    for record in &report.history {
        let result = match record.result {
            StageResult::Succeeded => "ok".to_string(),
            StageResult::Failed(code) => format!("failed (exit code {code})"),
            StageResult::LaunchFailed(ref reason) => format!("launch failed: {reason}"),
            StageResult::Cancelled => "cancelled".to_string(),
            StageResult::Aborted(ref reason) => format!("aborted: {reason}"),
        };
        println!(
            "  {:<14} {:>10}  {result}",
            record.stage.name(),
            format_elapsed(record.elapsed)
        );
    }
    println!("  total          {:>10}", format_elapsed(report.total_elapsed()));
}
