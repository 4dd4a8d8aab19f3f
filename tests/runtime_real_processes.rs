// tests/runtime_real_processes.rs
#![cfg(unix)]

mod common;
use crate::common::{
    RecordingListener, TestResult,
    builders::{ConfigFileBuilder, StageConfigBuilder},
    init_tracing, with_timeout,
};

use tokio::sync::mpsc;

use rnaflow::engine::{PipelineMachine, PipelineReport, PipelineStatus, Runtime};
use rnaflow::exec::Supervisor;
use rnaflow::types::StageId;

async fn run_pipeline(
    builder: ConfigFileBuilder,
    listener: RecordingListener,
) -> Result<PipelineReport, Box<dyn std::error::Error>> {
    let (plan, options) = builder.build().into_parts();
    let (tx, rx) = mpsc::channel(64);
    let supervisor = Supervisor::spawn(tx, options);
    let machine = PipelineMachine::new(plan).with_listener(Box::new(listener));

    Ok(Runtime::new(machine, rx, supervisor).run().await?)
}

#[tokio::test]
async fn trivial_commands_reach_done() -> TestResult {
    init_tracing();
    let listener = RecordingListener::new();

    let report = with_timeout(run_pipeline(ConfigFileBuilder::new(), listener.clone())).await?;

    assert_eq!(report.status, PipelineStatus::Done);
    assert_eq!(report.history.len(), StageId::PIPELINE.len());
    assert_eq!(listener.states().last(), Some(&StageId::Done));
    Ok(())
}

#[tokio::test]
async fn failing_command_fails_the_pipeline() -> TestResult {
    init_tracing();
    let listener = RecordingListener::new();
    let builder = ConfigFileBuilder::new()
        .with_stage(StageId::TrxIndex, StageConfigBuilder::shell("exit 4").build());

    let report = with_timeout(run_pipeline(builder, listener.clone())).await?;

    assert_eq!(
        report.status,
        PipelineStatus::Failed {
            stage: StageId::TrxIndex
        }
    );
    // mkdir, obtain-rnaseq, trx-index
    assert_eq!(report.history.len(), 3);
    assert!(
        listener
            .states()
            .iter()
            .all(|s| !matches!(s, StageId::Kallisto | StageId::Done))
    );
    Ok(())
}

#[tokio::test]
async fn stage_commands_run_in_the_configured_workdir() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let mut raw = ConfigFileBuilder::new()
        .with_stage(StageId::Mkdir, StageConfigBuilder::shell("mkdir -p out").build())
        .with_stage(StageId::Blast, StageConfigBuilder::shell("touch out/blast.done").build())
        .raw();
    raw.config.workdir = Some(dir.path().to_path_buf());

    let (plan, options) = rnaflow::config::ConfigFile::try_from(raw)?.into_parts();
    let (tx, rx) = mpsc::channel(64);
    let supervisor = Supervisor::spawn(tx, options);
    let machine = PipelineMachine::new(plan);

    let report = with_timeout(Runtime::new(machine, rx, supervisor).run()).await?;

    assert_eq!(report.status, PipelineStatus::Done);
    assert!(dir.path().join("out").join("blast.done").exists());
    Ok(())
}
