#![allow(dead_code)]

use std::collections::BTreeMap;

use rnaflow::config::{ConfigFile, ConfigSection, RawConfigFile, StageConfig};
use rnaflow::engine::StagePlan;
use rnaflow::exec::Command;
use rnaflow::types::StageId;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts with every pipeline stage mapped to `true` and millisecond
/// timings, so tests only spell out what they care about.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut stage = BTreeMap::new();
        for id in StageId::PIPELINE {
            stage.insert(id.name().to_string(), StageConfigBuilder::program("true").build());
        }
        Self {
            config: RawConfigFile {
                config: ConfigSection {
                    poll_interval: "20ms".to_string(),
                    initial_delay: "0ms".to_string(),
                    stop_timeout: "500ms".to_string(),
                    workdir: None,
                },
                stage,
            },
        }
    }

    pub fn with_stage(mut self, stage: StageId, cfg: StageConfig) -> Self {
        self.config.stage.insert(stage.name().to_string(), cfg);
        self
    }

    pub fn without_stage(mut self, stage: StageId) -> Self {
        self.config.stage.remove(stage.name());
        self
    }

    pub fn poll_interval(mut self, value: &str) -> Self {
        self.config.config.poll_interval = value.to_string();
        self
    }

    pub fn stop_timeout(mut self, value: &str) -> Self {
        self.config.config.stop_timeout = value.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StageConfig`.
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn shell(cmd: &str) -> Self {
        Self {
            stage: StageConfig {
                cmd: Some(cmd.to_string()),
                program: None,
                args: vec![],
            },
        }
    }

    pub fn program(program: &str) -> Self {
        Self {
            stage: StageConfig {
                cmd: None,
                program: Some(program.to_string()),
                args: vec![],
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.stage.args.push(arg.to_string());
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}

/// A plan where every stage runs a program named after the stage.
///
/// Pairs with `ScriptedSupervisor`, which keys its scripts by program name.
pub fn named_plan() -> StagePlan {
    StageId::PIPELINE
        .into_iter()
        .fold(StagePlan::new(), |plan, id| plan.with(id, Command::new(id.name())))
}
