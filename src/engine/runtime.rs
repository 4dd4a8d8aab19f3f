// src/engine/runtime.rs

use std::collections::VecDeque;
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::exec::{SupervisorBackend, SupervisorError};

use super::core::{PipelineMachine, PipelineReport};
use super::{CoreCommand, CoreStep, PipelineEvent};

/// Drives the pipeline state machine in response to `PipelineEvent`s and
/// delegates process control to a `SupervisorBackend`.
///
/// This is a pure IO shell around `PipelineMachine`, which contains all the
/// sequencing semantics.
pub struct Runtime<S: SupervisorBackend> {
    core: PipelineMachine,
    event_rx: mpsc::Receiver<PipelineEvent>,
    supervisor: S,
}

impl<S: SupervisorBackend> fmt::Debug for Runtime<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<S: SupervisorBackend> Runtime<S> {
    pub fn new(
        core: PipelineMachine,
        event_rx: mpsc::Receiver<PipelineEvent>,
        supervisor: S,
    ) -> Self {
        Self {
            core,
            event_rx,
            supervisor,
        }
    }

    /// Start the pipeline and run it to a terminal stage.
    ///
    /// - Starts the first stage.
    /// - Consumes `PipelineEvent`s from `event_rx` and feeds them to the core.
    /// - Executes the commands returned by the core (launch, stop).
    pub async fn run(mut self) -> Result<PipelineReport> {
        info!("pipeline runtime started");

        let step = self.core.start();
        let mut keep_running = self.drive(step).await?;

        while keep_running {
            let Some(event) = self.event_rx.recv().await else {
                warn!("pipeline event channel closed before a terminal stage");
                break;
            };

            debug!(?event, "runtime received event");
            let step = self.core.step(event);
            keep_running = self.drive(step).await?;
        }

        let report = self.core.report();
        info!(status = ?report.status, "pipeline runtime exiting");
        Ok(report)
    }

    /// Execute a step's commands, including any follow-up steps they cause.
    async fn drive(&mut self, step: CoreStep) -> Result<bool> {
        let mut keep_running = step.keep_running;
        let mut pending: VecDeque<CoreCommand> = step.commands.into();

        while let Some(command) = pending.pop_front() {
            if let Some(follow) = self.execute_command(command).await? {
                keep_running = follow.keep_running;
                pending.extend(follow.commands);
            }
        }

        Ok(keep_running)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<Option<CoreStep>> {
        match command {
            CoreCommand::Launch { stage, command } => {
                debug!(stage = %stage, command = %command, "launching stage command");
                match self.supervisor.start(command).await {
                    Ok(invocation) => {
                        self.core.launched(stage, invocation);
                        Ok(None)
                    }
                    Err(err @ SupervisorError::Launch { .. }) => {
                        warn!(stage = %stage, error = %err, "stage command could not be launched");
                        Ok(Some(self.core.launch_failed(stage, &err.to_string())))
                    }
                    Err(err @ SupervisorError::AlreadyRunning { .. }) => {
                        // Sequencing bug: never leave the pipeline hanging on it.
                        error!(stage = %stage, error = %err, "supervisor already busy");
                        Ok(Some(self.core.launch_failed(stage, &err.to_string())))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            CoreCommand::StopProcess => {
                let report = self.supervisor.stop().await?;
                info!(
                    termination = ?report.termination,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "stage command stopped"
                );
                Ok(Some(self.core.stopped(report.elapsed)))
            }
        }
    }
}
