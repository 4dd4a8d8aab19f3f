// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `rnaflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rnaflow",
    version,
    about = "Run the RNA-seq analysis pipeline stage by stage, supervising each command.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Rnaflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Rnaflow.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RNAFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the stage plan, but don't execute any commands.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[config].poll_interval` (e.g. "500ms", "5s").
    #[arg(long, value_name = "DURATION")]
    pub poll_interval: Option<String>,

    /// Override `[config].stop_timeout` (e.g. "2s").
    #[arg(long, value_name = "DURATION")]
    pub stop_timeout: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
