// tests/config_loading.rs
mod common;
use crate::common::{
    TestResult,
    builders::{ConfigFileBuilder, StageConfigBuilder},
};

use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use rnaflow::config::{ConfigFile, load_and_validate, validate_config};
use rnaflow::errors::RnaflowError;
use rnaflow::exec::Command;
use rnaflow::types::StageId;

const STAGES: &str = r#"
[stage.mkdir]
cmd = "mkdir -p out"

[stage.obtain_rnaseq]
program = "fasterq-dump"
args = ["SRR000001", "-O", "out"]

[stage.trx-index]
cmd = "kallisto index -i out/index.idx transcripts.fa"

[stage.kallisto]
cmd = "kallisto quant -i out/index.idx -o out/quant reads.fq"

[stage.sleuth]
cmd = "Rscript sleuth.R"

[stage.bowtie2]
cmd = "bowtie2 -x ref -U reads.fq -S out/aln.sam"

[stage.blast]
cmd = "blastn -query out/unmapped.fa -db nt"
"#;

fn write_config(contents: &str) -> std::io::Result<(TempDir, std::path::PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Rnaflow.toml");
    fs::write(&path, contents)?;
    Ok((dir, path))
}

fn config_error(result: rnaflow::errors::Result<ConfigFile>) -> String {
    match result {
        Err(RnaflowError::ConfigError(msg)) => msg,
        Err(other) => panic!("expected a config error, got {other}"),
        Ok(_) => panic!("expected a config error, got a valid config"),
    }
}

#[test]
fn loads_a_complete_config() -> TestResult {
    let contents = format!(
        "[config]\npoll_interval = \"250ms\"\nstop_timeout = \"3s\"\n{STAGES}"
    );
    let (_dir, path) = write_config(&contents)?;

    let cfg = load_and_validate(&path)?;

    let options = cfg.options();
    assert_eq!(options.poll_interval, Duration::from_millis(250));
    assert_eq!(options.stop_timeout, Duration::from_secs(3));
    assert_eq!(options.initial_delay, Duration::ZERO);
    assert!(cfg.plan().missing().is_empty());

    assert_eq!(
        cfg.plan().command_for(StageId::ObtainRnaseq),
        Some(&Command::new("fasterq-dump").args(["SRR000001", "-O", "out"]))
    );
    assert_eq!(
        cfg.plan().command_for(StageId::Mkdir),
        Some(&Command::shell("mkdir -p out"))
    );
    Ok(())
}

#[test]
fn timing_defaults_apply_without_a_config_section() -> TestResult {
    let (_dir, path) = write_config(STAGES)?;

    let options = load_and_validate(&path)?.options();

    assert_eq!(options.poll_interval, Duration::from_secs(5));
    assert_eq!(options.stop_timeout, Duration::from_secs(2));
    assert_eq!(options.initial_delay, Duration::ZERO);
    Ok(())
}

#[test]
fn missing_stage_is_rejected() {
    let raw = ConfigFileBuilder::new().without_stage(StageId::Sleuth).raw();

    let msg = config_error(ConfigFile::try_from(raw));

    assert!(msg.contains("missing"), "{msg}");
    assert!(msg.contains("sleuth"), "{msg}");
}

#[test]
fn unknown_stage_is_rejected() {
    let mut raw = ConfigFileBuilder::new().raw();
    raw.stage
        .insert("star".to_string(), StageConfigBuilder::shell("STAR").build());

    let msg = config_error(ConfigFile::try_from(raw));

    assert!(msg.contains("unknown stage"), "{msg}");
}

#[test]
fn terminal_stage_cannot_have_a_command() {
    let mut raw = ConfigFileBuilder::new().raw();
    raw.stage
        .insert("done".to_string(), StageConfigBuilder::shell("echo done").build());

    let msg = config_error(ConfigFile::try_from(raw));

    assert!(msg.contains("terminal"), "{msg}");
}

#[test]
fn same_stage_under_two_spellings_is_rejected() {
    let mut raw = ConfigFileBuilder::new().raw();
    raw.stage.insert(
        "obtain_rnaseq".to_string(),
        StageConfigBuilder::program("true").build(),
    );

    let msg = config_error(ConfigFile::try_from(raw));

    assert!(msg.contains("configured twice"), "{msg}");
}

#[test]
fn stage_needs_exactly_one_of_cmd_or_program() {
    let mut both = StageConfigBuilder::shell("echo hi").build();
    both.program = Some("echo".to_string());
    let raw = ConfigFileBuilder::new().with_stage(StageId::Kallisto, both).raw();
    let msg = config_error(ConfigFile::try_from(raw));
    assert!(msg.contains("both"), "{msg}");

    let neither = rnaflow::config::StageConfig::default();
    let raw = ConfigFileBuilder::new()
        .with_stage(StageId::Kallisto, neither)
        .raw();
    let msg = config_error(ConfigFile::try_from(raw));
    assert!(msg.contains("needs either"), "{msg}");
}

#[test]
fn args_require_program() {
    let mut cfg = StageConfigBuilder::shell("echo").build();
    cfg.args = vec!["hi".to_string()];
    let raw = ConfigFileBuilder::new().with_stage(StageId::Blast, cfg).raw();

    let msg = config_error(ConfigFile::try_from(raw));

    assert!(msg.contains("args"), "{msg}");
}

#[test]
fn empty_command_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_stage(StageId::Mkdir, StageConfigBuilder::shell("   ").build())
        .raw();

    let msg = config_error(ConfigFile::try_from(raw));

    assert!(msg.contains("must not be empty"), "{msg}");
}

#[test]
fn bad_duration_is_rejected() {
    let raw = ConfigFileBuilder::new().poll_interval("soon").raw();
    let msg = config_error(ConfigFile::try_from(raw));
    assert!(msg.contains("poll_interval"), "{msg}");

    let raw = ConfigFileBuilder::new().stop_timeout("10 parsecs").raw();
    let msg = config_error(ConfigFile::try_from(raw));
    assert!(msg.contains("stop_timeout"), "{msg}");
}

#[test]
fn oversized_duration_is_a_config_error() {
    let raw = ConfigFileBuilder::new().poll_interval("5124095576030432h").raw();

    let msg = config_error(ConfigFile::try_from(raw));

    assert!(msg.contains("poll_interval"), "{msg}");
    assert!(msg.contains("too large"), "{msg}");
}

#[test]
fn zero_poll_interval_is_rejected() {
    let raw = ConfigFileBuilder::new().poll_interval("0s").raw();

    let msg = config_error(ConfigFile::try_from(raw));

    assert!(msg.contains("poll_interval must be > 0"), "{msg}");
}

#[test]
fn overridden_options_are_revalidated() {
    let cfg = ConfigFileBuilder::new().build();
    let mut options = cfg.options();
    options.stop_timeout = Duration::ZERO;

    let result = validate_config(&cfg.with_options(options));

    assert!(matches!(result, Err(RnaflowError::ConfigError(ref msg)) if msg.contains("stop_timeout")));
}

#[test]
fn relative_workdir_resolves_against_the_config_directory() -> TestResult {
    let contents = format!("[config]\nworkdir = \"data\"\n{STAGES}");
    let (dir, path) = write_config(&contents)?;

    let cfg = load_and_validate(&path)?;

    let expected = dir.path().join("data");
    assert_eq!(cfg.workdir(), Some(expected.as_path()));
    for (_, command) in cfg.plan().iter() {
        assert_eq!(command.cwd(), Some(expected.as_path()));
    }
    Ok(())
}

#[test]
fn malformed_toml_is_a_parse_error() -> TestResult {
    let (_dir, path) = write_config("[stage.mkdir\ncmd = ")?;

    let result = load_and_validate(&path);

    assert!(matches!(result, Err(RnaflowError::TomlError(_))));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let result = load_and_validate("/nonexistent/rnaflow/Rnaflow.toml");

    assert!(matches!(result, Err(RnaflowError::IoError(_))));
}
