// tests/runtime_scripted_supervisor.rs
mod common;
use crate::common::{
    Observed, RecordingListener, Script, ScriptedSupervisor, TestResult, builders::named_plan,
    init_tracing, with_timeout,
};

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use rnaflow::engine::{PipelineEvent, PipelineMachine, PipelineStatus, Runtime, StageResult};
use rnaflow::exec::Command;
use rnaflow::types::StageId;

fn machine_with_listener() -> (PipelineMachine, RecordingListener) {
    let listener = RecordingListener::new();
    let machine = PipelineMachine::new(named_plan()).with_listener(Box::new(listener.clone()));
    (machine, listener)
}

fn programs(launched: &Arc<Mutex<Vec<Command>>>) -> Vec<String> {
    launched
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.program().to_string())
        .collect()
}

#[tokio::test]
async fn runs_every_stage_to_done() -> TestResult {
    init_tracing();
    let (tx, rx) = mpsc::channel(64);
    let supervisor = ScriptedSupervisor::new(tx.clone())
        .script("trx-index", Script::Exit { polls: 3, code: 0 })
        .script("kallisto", Script::Exit { polls: 2, code: 0 });
    let launched = supervisor.launched();
    let (machine, listener) = machine_with_listener();

    let report = with_timeout(Runtime::new(machine, rx, supervisor).run()).await?;

    assert_eq!(report.status, PipelineStatus::Done);
    let expected: Vec<String> = StageId::PIPELINE.iter().map(|s| s.name().to_string()).collect();
    assert_eq!(programs(&launched), expected);
    assert_eq!(listener.states().last(), Some(&StageId::Done));
    assert!(listener.polls() >= 5, "scripted still-running ticks should reach the listener");
    assert_eq!(listener.completions().len(), StageId::PIPELINE.len());
    Ok(())
}

#[tokio::test]
async fn failing_stage_stops_the_pipeline() -> TestResult {
    init_tracing();
    let (tx, rx) = mpsc::channel(64);
    let supervisor =
        ScriptedSupervisor::new(tx.clone()).script("obtain-rnaseq", Script::Exit { polls: 1, code: 1 });
    let launched = supervisor.launched();
    let (machine, listener) = machine_with_listener();

    let report = with_timeout(Runtime::new(machine, rx, supervisor).run()).await?;

    assert_eq!(
        report.status,
        PipelineStatus::Failed {
            stage: StageId::ObtainRnaseq
        }
    );
    assert_eq!(programs(&launched), vec!["mkdir".to_string(), "obtain-rnaseq".to_string()]);
    assert_eq!(
        report.history.last().map(|r| &r.result),
        Some(&StageResult::Failed(1))
    );

    // Failed is the last state notified, and only once.
    let states = listener.states();
    assert_eq!(states.last(), Some(&StageId::Failed));
    assert_eq!(states.iter().filter(|s| **s == StageId::Failed).count(), 1);
    Ok(())
}

#[tokio::test]
async fn stop_request_cancels_the_running_stage() -> TestResult {
    init_tracing();
    let (tx, rx) = mpsc::channel(64);
    let supervisor = ScriptedSupervisor::new(tx.clone()).script("kallisto", Script::Hang);
    let stops = supervisor.stop_count();
    let launched = supervisor.launched();
    let (machine, listener) = machine_with_listener();

    let handle = tokio::spawn(Runtime::new(machine, rx, supervisor).run());

    // Wait until kallisto has reported progress, then ask to stop.
    let watcher = listener.clone();
    with_timeout(async move {
        while !watcher
            .events()
            .iter()
            .any(|e| matches!(e, Observed::Poll(StageId::Kallisto, _)))
        {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    tx.send(PipelineEvent::StopRequested).await?;

    let report = with_timeout(handle).await??;

    assert_eq!(
        report.status,
        PipelineStatus::Cancelled {
            stage: StageId::Kallisto
        }
    );
    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(programs(&launched).last().map(String::as_str), Some("kallisto"));
    assert!(listener.events().contains(&Observed::Stop(StageId::Kallisto)));

    let last = report.history.last().expect("cancelled stage should be recorded");
    assert_eq!(last.stage, StageId::Kallisto);
    assert_eq!(last.result, StageResult::Cancelled);
    assert!(last.elapsed > Duration::ZERO);
    Ok(())
}

#[tokio::test]
async fn launch_error_fails_the_pipeline() -> TestResult {
    init_tracing();
    let (tx, rx) = mpsc::channel(64);
    let supervisor = ScriptedSupervisor::new(tx.clone()).script("sleuth", Script::LaunchError);
    let launched = supervisor.launched();
    let (machine, listener) = machine_with_listener();

    let report = with_timeout(Runtime::new(machine, rx, supervisor).run()).await?;

    assert_eq!(
        report.status,
        PipelineStatus::Failed {
            stage: StageId::Sleuth
        }
    );
    // The failing launch never reached the process table.
    assert_eq!(programs(&launched).last().map(String::as_str), Some("kallisto"));
    assert!(matches!(
        report.history.last().map(|r| &r.result),
        Some(StageResult::LaunchFailed(_))
    ));
    assert_eq!(listener.states().last(), Some(&StageId::Failed));
    Ok(())
}

#[tokio::test]
async fn stop_after_completion_is_ignored() -> TestResult {
    init_tracing();
    let (tx, rx) = mpsc::channel(64);
    let supervisor = ScriptedSupervisor::new(tx.clone());
    let stops = supervisor.stop_count();
    let (machine, _listener) = machine_with_listener();

    let report = with_timeout(Runtime::new(machine, rx, supervisor).run()).await?;
    assert_eq!(report.status, PipelineStatus::Done);

    // The runtime has returned; a late stop has nowhere to go and costs nothing.
    assert!(tx.send(PipelineEvent::StopRequested).await.is_err());
    assert_eq!(stops.load(Ordering::SeqCst), 0);
    Ok(())
}
