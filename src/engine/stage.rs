// src/engine/stage.rs

//! One pipeline phase and its reactions to supervisor events.

use std::time::Duration;

use crate::engine::core::StageResult;
use crate::engine::listener::Progress;
use crate::engine::{InvocationId, ProcessOutcome};
use crate::exec::Command;
use crate::types::{StageId, format_elapsed};

/// What a stage may ask of the state machine.
///
/// Transitions are requests: the machine applies them once the stage hook
/// has returned, constructing the next stage and notifying the listener.
pub trait StateView {
    /// Hand `command` to the supervisor on behalf of `stage`.
    fn launch(&mut self, stage: StageId, command: &Command);

    /// Move to the successor of `from` in the transition table.
    fn to_next_state(&mut self, from: StageId);

    /// Move to the `failed` terminal, recording why.
    fn to_failed_state(&mut self, from: StageId, result: StageResult);

    fn on_poll(&mut self, stage: StageId, elapsed: Duration);

    fn on_complete(&mut self, stage: StageId, outcome: ProcessOutcome, elapsed: Duration);

    fn print_progress(&mut self, progress: &Progress);

    fn write_to_log(&mut self, stage: StageId, message: &str);
}

/// The current phase of the pipeline.
///
/// A stage is created when the machine enters it and dropped on the next
/// transition; it is never reused.
#[derive(Debug, Clone)]
pub struct Stage {
    id: StageId,
    command: Option<Command>,
    invocation: Option<InvocationId>,
    elapsed: Duration,
}

impl Stage {
    pub fn new(id: StageId, command: Option<Command>) -> Self {
        Self {
            id,
            command,
            invocation: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    /// Supervisor invocation running this stage's command, once launched.
    pub fn invocation(&self) -> Option<InvocationId> {
        self.invocation
    }

    /// Elapsed time of this stage's command as last reported.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub(crate) fn attach(&mut self, invocation: InvocationId) {
        self.invocation = Some(invocation);
    }

    pub(crate) fn freeze_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    /// Invoked once when the stage becomes current.
    pub fn on_start(&mut self, view: &mut dyn StateView) {
        if self.id.is_terminal() {
            return;
        }
        match self.command {
            Some(ref command) => {
                view.write_to_log(self.id, &format!("launching: {command}"));
                view.launch(self.id, command);
            }
            None => {
                view.write_to_log(self.id, "no command configured");
                view.to_failed_state(
                    self.id,
                    StageResult::Aborted("no command configured".to_string()),
                );
            }
        }
    }

    /// Invoked on each still-running poll. Never transitions.
    pub fn on_poll(&mut self, elapsed: Duration, view: &mut dyn StateView) {
        self.observe(elapsed);
        view.on_poll(self.id, self.elapsed);

        if let Some(position) = self.id.position() {
            view.print_progress(&Progress {
                stage: self.id,
                position,
                total: StageId::PIPELINE.len(),
                elapsed: self.elapsed,
            });
        }
    }

    /// Invoked once when the stage's command exits.
    pub fn on_complete(
        &mut self,
        outcome: ProcessOutcome,
        elapsed: Duration,
        view: &mut dyn StateView,
    ) {
        self.observe(elapsed);
        view.on_complete(self.id, outcome, self.elapsed);

        match outcome {
            ProcessOutcome::Success => {
                view.write_to_log(
                    self.id,
                    &format!("completed in {}", format_elapsed(self.elapsed)),
                );
                view.to_next_state(self.id);
            }
            ProcessOutcome::Failed(code) => {
                view.write_to_log(
                    self.id,
                    &format!(
                        "exited with code {code} after {}",
                        format_elapsed(self.elapsed)
                    ),
                );
                view.to_failed_state(self.id, StageResult::Failed(code));
            }
        }
    }

    // Reported elapsed never goes backwards.
    fn observe(&mut self, elapsed: Duration) {
        self.elapsed = self.elapsed.max(elapsed);
    }
}
