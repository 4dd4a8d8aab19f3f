// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile, StageConfig};
use crate::engine::StagePlan;
use crate::errors::{Result, RnaflowError};
use crate::exec::{Command, SupervisorOptions};
use crate::types::{StageId, parse_duration};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::RnaflowError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let options = validate_timing(&raw)?;
        let plan = build_plan(&raw)?;
        let plan = match raw.config.workdir {
            Some(ref dir) => apply_workdir(plan, dir),
            None => plan,
        };
        Ok(ConfigFile::new_unchecked(plan, options, raw.config.workdir))
    }
}

/// Validate an already-built config (used after CLI overrides).
pub fn validate_config(cfg: &ConfigFile) -> Result<()> {
    let missing = cfg.plan().missing();
    if !missing.is_empty() {
        return Err(missing_stages_error(&missing));
    }
    validate_options(&cfg.options())
}

fn validate_timing(cfg: &RawConfigFile) -> Result<SupervisorOptions> {
    let options = SupervisorOptions {
        initial_delay: duration_field("initial_delay", &cfg.config.initial_delay)?,
        poll_interval: duration_field("poll_interval", &cfg.config.poll_interval)?,
        stop_timeout: duration_field("stop_timeout", &cfg.config.stop_timeout)?,
    };
    validate_options(&options)?;
    Ok(options)
}

fn validate_options(options: &SupervisorOptions) -> Result<()> {
    if options.poll_interval == Duration::ZERO {
        return Err(RnaflowError::ConfigError(
            "[config].poll_interval must be > 0".to_string(),
        ));
    }
    if options.stop_timeout == Duration::ZERO {
        return Err(RnaflowError::ConfigError(
            "[config].stop_timeout must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn duration_field(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| RnaflowError::ConfigError(format!("[config].{name}: {e}")))
}

fn build_plan(cfg: &RawConfigFile) -> Result<StagePlan> {
    let mut seen: BTreeMap<StageId, &str> = BTreeMap::new();
    let mut plan = StagePlan::new();

    for (name, stage_cfg) in cfg.stage.iter() {
        let stage: StageId = name
            .parse()
            .map_err(|e: String| RnaflowError::ConfigError(format!("[stage.{name}]: {e}")))?;

        if stage.is_terminal() {
            return Err(RnaflowError::ConfigError(format!(
                "[stage.{name}]: '{stage}' is a terminal state and cannot run a command"
            )));
        }
        if let Some(previous) = seen.insert(stage, name.as_str()) {
            return Err(RnaflowError::ConfigError(format!(
                "stage '{stage}' is configured twice ([stage.{previous}] and [stage.{name}])"
            )));
        }

        plan.insert(stage, stage_command(name, stage_cfg)?);
    }

    let missing = plan.missing();
    if !missing.is_empty() {
        return Err(missing_stages_error(&missing));
    }

    Ok(plan)
}

fn stage_command(name: &str, cfg: &StageConfig) -> Result<Command> {
    match (&cfg.cmd, &cfg.program) {
        (Some(_), Some(_)) => Err(RnaflowError::ConfigError(format!(
            "[stage.{name}] sets both `cmd` and `program`; use exactly one"
        ))),
        (None, None) => Err(RnaflowError::ConfigError(format!(
            "[stage.{name}] needs either `cmd` or `program`"
        ))),
        (Some(cmd), None) => {
            if cmd.trim().is_empty() {
                return Err(RnaflowError::ConfigError(format!(
                    "[stage.{name}].cmd must not be empty"
                )));
            }
            if !cfg.args.is_empty() {
                return Err(RnaflowError::ConfigError(format!(
                    "[stage.{name}].args is only valid together with `program`"
                )));
            }
            Ok(Command::shell(cmd.as_str()))
        }
        (None, Some(program)) => {
            if program.trim().is_empty() {
                return Err(RnaflowError::ConfigError(format!(
                    "[stage.{name}].program must not be empty"
                )));
            }
            Ok(Command::new(program.as_str()).args(cfg.args.iter().cloned()))
        }
    }
}

fn apply_workdir(plan: StagePlan, dir: &std::path::Path) -> StagePlan {
    let mut with_dir = StagePlan::new();
    for (stage, command) in plan.iter() {
        with_dir.insert(stage, command.clone().current_dir(dir));
    }
    with_dir
}

fn missing_stages_error(missing: &[StageId]) -> RnaflowError {
    let names: Vec<&str> = missing.iter().map(|s| s.name()).collect();
    RnaflowError::ConfigError(format!(
        "missing [stage.<name>] sections for: {}",
        names.join(", ")
    ))
}
