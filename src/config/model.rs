// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::engine::StagePlan;
use crate::exec::SupervisorOptions;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// poll_interval = "5s"
/// stop_timeout = "2s"
///
/// [stage.mkdir]
/// cmd = "mkdir -p out"
///
/// [stage.kallisto]
/// program = "kallisto"
/// args = ["quant", "-i", "index.idx", "-o", "out"]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Timing and working-directory settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All stages from `[stage.<name>]`, keyed by the name as written.
    #[serde(default)]
    pub stage: BTreeMap<String, StageConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// How often the supervisor polls the running command.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Delay before the first poll of each command.
    #[serde(default = "default_initial_delay")]
    pub initial_delay: String,

    /// Graceful-stop window before the command is killed.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: String,

    /// Working directory for every stage command. Relative paths are
    /// resolved against the directory containing the config file.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

fn default_poll_interval() -> String {
    "5s".to_string()
}

fn default_initial_delay() -> String {
    "0s".to_string()
}

fn default_stop_timeout() -> String {
    "2s".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            initial_delay: default_initial_delay(),
            stop_timeout: default_stop_timeout(),
            workdir: None,
        }
    }
}

/// `[stage.<name>]` section. Exactly one of `cmd` or `program` is set.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StageConfig {
    /// Shell command line, run through `sh -c` (or `cmd /C` on Windows).
    #[serde(default)]
    pub cmd: Option<String>,

    /// Executable to run directly, without a shell.
    #[serde(default)]
    pub program: Option<String>,

    /// Arguments for `program`.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Validated configuration.
///
/// Built through `TryFrom<RawConfigFile>`; every working stage has a command.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    plan: StagePlan,
    options: SupervisorOptions,
    workdir: Option<PathBuf>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        plan: StagePlan,
        options: SupervisorOptions,
        workdir: Option<PathBuf>,
    ) -> Self {
        Self {
            plan,
            options,
            workdir,
        }
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn options(&self) -> SupervisorOptions {
        self.options
    }

    pub fn workdir(&self) -> Option<&std::path::Path> {
        self.workdir.as_deref()
    }

    /// Override the timing options (e.g. from CLI flags).
    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn into_parts(self) -> (StagePlan, SupervisorOptions) {
        (self.plan, self.options)
    }
}
