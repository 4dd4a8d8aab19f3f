// src/engine/core.rs

//! Pure pipeline state machine.
//!
//! [`PipelineMachine`] consumes supervisor events and driver requests and
//! returns [`CoreStep`]s describing what the async shell should do next. It
//! owns no channels, no Tokio types and performs no IO, so every transition
//! can be exercised directly in tests.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::engine::listener::{PipelineListener, Progress};
use crate::engine::stage::{Stage, StateView};
use crate::engine::step::{CoreCommand, CoreStep};
use crate::engine::{InvocationId, PipelineEvent, PollEvent, ProcessOutcome};
use crate::exec::Command;
use crate::types::StageId;

/// Command configured for each working stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagePlan {
    commands: BTreeMap<StageId, Command>,
}

impl StagePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: StageId, command: Command) -> Self {
        self.insert(stage, command);
        self
    }

    pub fn insert(&mut self, stage: StageId, command: Command) {
        self.commands.insert(stage, command);
    }

    pub fn command_for(&self, stage: StageId) -> Option<&Command> {
        self.commands.get(&stage)
    }

    /// Working stages with no command, in pipeline order.
    pub fn missing(&self) -> Vec<StageId> {
        StageId::PIPELINE
            .into_iter()
            .filter(|s| !self.commands.contains_key(s))
            .collect()
    }

    /// Configured stages in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (StageId, &Command)> {
        self.commands.iter().map(|(s, c)| (*s, c))
    }
}

/// How a retired stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Succeeded,
    /// Command exited non-zero.
    Failed(i32),
    /// Command could not be started.
    LaunchFailed(String),
    /// Stopped by the driver.
    Cancelled,
    /// Failed for a reason unrelated to the command's exit status.
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: StageId,
    pub result: StageResult,
    pub elapsed: Duration,
}

/// Answer to a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    NotStarted,
    Running(StageId),
    Done,
    /// `stage` is the working stage that failed.
    Failed { stage: StageId },
    /// `stage` is the working stage that was current when stop was requested.
    Cancelled { stage: StageId },
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Done | PipelineStatus::Failed { .. } | PipelineStatus::Cancelled { .. }
        )
    }
}

/// Final summary produced by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub status: PipelineStatus,
    pub history: Vec<StageRecord>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.status == PipelineStatus::Done
    }

    pub fn total_elapsed(&self) -> Duration {
        self.history.iter().map(|r| r.elapsed).sum()
    }
}

type Transition = (StageId, StageResult);

/// [`StateView`] handed to stage hooks: forwards observer calls to the
/// listener and collects launches and at most one transition request.
struct MachineView<'a> {
    listener: Option<&'a mut Box<dyn PipelineListener>>,
    commands: &'a mut Vec<CoreCommand>,
    transition: Option<Transition>,
}

impl<'a> MachineView<'a> {
    fn new(
        listener: Option<&'a mut Box<dyn PipelineListener>>,
        commands: &'a mut Vec<CoreCommand>,
    ) -> Self {
        Self {
            listener,
            commands,
            transition: None,
        }
    }

    fn request(&mut self, from: StageId, transition: Transition) {
        if let Some((pending, _)) = &self.transition {
            warn!(
                stage = %from,
                pending = %pending,
                requested = %transition.0,
                "stage requested a second transition; keeping the first"
            );
            return;
        }
        self.transition = Some(transition);
    }

    fn take_transition(self) -> Option<Transition> {
        self.transition
    }
}

impl StateView for MachineView<'_> {
    fn launch(&mut self, stage: StageId, command: &Command) {
        if let Some(listener) = self.listener.as_mut() {
            listener.action_start(stage);
        }
        self.commands.push(CoreCommand::Launch {
            stage,
            command: command.clone(),
        });
    }

    fn to_next_state(&mut self, from: StageId) {
        self.request(from, (from.next_on_success(), StageResult::Succeeded));
    }

    fn to_failed_state(&mut self, from: StageId, result: StageResult) {
        self.request(from, (StageId::Failed, result));
    }

    fn on_poll(&mut self, stage: StageId, elapsed: Duration) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_poll(stage, elapsed);
        }
    }

    fn on_complete(&mut self, stage: StageId, outcome: ProcessOutcome, elapsed: Duration) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_complete(stage, outcome, elapsed);
        }
    }

    fn print_progress(&mut self, progress: &Progress) {
        if let Some(listener) = self.listener.as_mut() {
            listener.print_progress(progress);
        }
    }

    fn write_to_log(&mut self, stage: StageId, message: &str) {
        if let Some(listener) = self.listener.as_mut() {
            listener.write_to_log(stage, message);
        }
    }
}

/// Holds the current stage and sequences the pipeline.
pub struct PipelineMachine {
    plan: StagePlan,
    current: Option<Stage>,
    listener: Option<Box<dyn PipelineListener>>,
    history: Vec<StageRecord>,
    started: bool,
    stopping: bool,
}

impl std::fmt::Debug for PipelineMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMachine")
            .field("current", &self.current_stage())
            .field("started", &self.started)
            .field("stopping", &self.stopping)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl PipelineMachine {
    pub fn new(plan: StagePlan) -> Self {
        Self {
            plan,
            current: None,
            listener: None,
            history: Vec::new(),
            started: false,
            stopping: false,
        }
    }

    /// Register the (single) listener, replacing any previous one.
    pub fn set_listener(&mut self, listener: Box<dyn PipelineListener>) {
        self.listener = Some(listener);
    }

    pub fn with_listener(mut self, listener: Box<dyn PipelineListener>) -> Self {
        self.set_listener(listener);
        self
    }

    /// Enter the first stage without launching anything yet.
    pub fn init(&mut self) {
        if self.current.is_some() {
            warn!("init called on an already initialised pipeline; ignoring");
            return;
        }
        if let Some(listener) = self.listener.as_mut() {
            listener.action_init();
        }
        let first = StageId::PIPELINE[0];
        self.current = Some(Stage::new(first, self.plan.command_for(first).cloned()));
        self.notify_state(first);
    }

    /// Start the current stage (initialising first if needed).
    pub fn start(&mut self) -> CoreStep {
        if self.current.is_none() {
            self.init();
        }
        if self.started {
            warn!("start called twice; ignoring");
            return CoreStep::idle(!self.is_terminal());
        }
        self.started = true;

        let mut commands = Vec::new();
        let transition = match self.current.as_mut() {
            Some(stage) => {
                let mut view = MachineView::new(self.listener.as_mut(), &mut commands);
                stage.on_start(&mut view);
                view.take_transition()
            }
            None => None,
        };
        self.apply(commands, transition)
    }

    /// Handle one event from the runtime channel.
    pub fn step(&mut self, event: PipelineEvent) -> CoreStep {
        match event {
            PipelineEvent::Polled { invocation, event } => self.handle_poll(invocation, event),
            PipelineEvent::StopRequested => self.request_stop(),
        }
    }

    /// Record that `stage`'s command is now running as `invocation`.
    pub fn launched(&mut self, stage: StageId, invocation: InvocationId) {
        match self.current.as_mut() {
            Some(current) if current.id() == stage => current.attach(invocation),
            _ => warn!(
                stage = %stage,
                invocation,
                "launch confirmation for a stage that is no longer current"
            ),
        }
    }

    /// The supervisor could not start `stage`'s command.
    pub fn launch_failed(&mut self, stage: StageId, reason: &str) -> CoreStep {
        if self.current_stage() != Some(stage) || self.is_terminal() {
            warn!(stage = %stage, "launch failure for a stage that is no longer current");
            return CoreStep::idle(!self.is_terminal());
        }
        self.write_to_log(stage, &format!("launch failed: {reason}"));
        self.apply(
            Vec::new(),
            Some((StageId::Failed, StageResult::LaunchFailed(reason.to_string()))),
        )
    }

    /// The supervisor finished stopping; force the current stage to
    /// `cancelled` with its elapsed time frozen at `elapsed`.
    pub fn stopped(&mut self, elapsed: Duration) -> CoreStep {
        self.stopping = false;
        if self.is_terminal() {
            return CoreStep::idle(false);
        }
        if let Some(stage) = self.current.as_mut() {
            stage.freeze_elapsed(elapsed);
        }
        self.apply(Vec::new(), Some((StageId::Cancelled, StageResult::Cancelled)))
    }

    pub fn status(&self) -> PipelineStatus {
        let Some(current) = self.current.as_ref() else {
            return PipelineStatus::NotStarted;
        };
        let last_working = self.history.last().map(|r| r.stage).unwrap_or(current.id());
        match current.id() {
            StageId::Done => PipelineStatus::Done,
            StageId::Failed => PipelineStatus::Failed {
                stage: last_working,
            },
            StageId::Cancelled => PipelineStatus::Cancelled {
                stage: last_working,
            },
            stage => PipelineStatus::Running(stage),
        }
    }

    pub fn current_stage(&self) -> Option<StageId> {
        self.current.as_ref().map(Stage::id)
    }

    /// Elapsed time of the current stage's command.
    pub fn elapsed_time(&self) -> Duration {
        self.current.as_ref().map(Stage::elapsed).unwrap_or_default()
    }

    pub fn is_terminal(&self) -> bool {
        self.current_stage().is_some_and(StageId::is_terminal)
    }

    pub fn history(&self) -> &[StageRecord] {
        &self.history
    }

    pub fn report(&self) -> PipelineReport {
        PipelineReport {
            status: self.status(),
            history: self.history.clone(),
        }
    }

    fn handle_poll(&mut self, invocation: InvocationId, event: PollEvent) -> CoreStep {
        if self.stopping {
            debug!(invocation, "stop in progress; ignoring poll event");
            return CoreStep::idle(true);
        }

        let mut commands = Vec::new();
        let transition = {
            let Some(stage) = self.current.as_mut() else {
                debug!(invocation, "poll event before init; ignoring");
                return CoreStep::idle(true);
            };
            if stage.id().is_terminal() {
                debug!(stage = %stage.id(), invocation, "pipeline is terminal; ignoring poll event");
                return CoreStep::idle(false);
            }
            if stage.invocation() != Some(invocation) {
                debug!(
                    stage = %stage.id(),
                    invocation,
                    current = ?stage.invocation(),
                    "poll event for another invocation; ignoring"
                );
                return CoreStep::idle(true);
            }

            let mut view = MachineView::new(self.listener.as_mut(), &mut commands);
            match event {
                PollEvent::StillRunning { elapsed } => stage.on_poll(elapsed, &mut view),
                PollEvent::Completed { outcome, elapsed } => {
                    stage.on_complete(outcome, elapsed, &mut view)
                }
            }
            view.take_transition()
        };

        self.apply(commands, transition)
    }

    fn request_stop(&mut self) -> CoreStep {
        let Some(stage) = self.current_stage() else {
            debug!("stop requested before init; nothing to stop");
            return CoreStep::idle(true);
        };
        if stage.is_terminal() {
            debug!(stage = %stage, "stop requested on a terminal pipeline; ignoring");
            return CoreStep::idle(false);
        }
        if self.stopping {
            debug!(stage = %stage, "stop already in progress");
            return CoreStep::idle(true);
        }

        if let Some(listener) = self.listener.as_mut() {
            listener.action_stop(stage);
        }

        if !self.started {
            // Nothing was launched; cancel in place.
            return self.apply(Vec::new(), Some((StageId::Cancelled, StageResult::Cancelled)));
        }

        self.stopping = true;
        CoreStep {
            commands: vec![CoreCommand::StopProcess],
            keep_running: true,
        }
    }

    /// Apply transition requests until a stage starts without requesting one.
    fn apply(&mut self, mut commands: Vec<CoreCommand>, mut pending: Option<Transition>) -> CoreStep {
        while let Some((requested, result)) = pending.take() {
            let Some(retired) = self.current.take() else {
                break;
            };
            let from = retired.id();
            if from.is_terminal() {
                warn!(from = %from, to = %requested, "transition out of a terminal stage refused");
                self.current = Some(retired);
                break;
            }

            let to = if from.can_transition_to(requested) {
                requested
            } else {
                error!(from = %from, to = %requested, "illegal stage transition; failing pipeline");
                StageId::Failed
            };

            debug!(from = %from, to = %to, ?result, "stage transition");
            self.history.push(StageRecord {
                stage: from,
                result,
                elapsed: retired.elapsed(),
            });

            let mut next = Stage::new(to, self.plan.command_for(to).cloned());
            self.notify_state(to);

            let mut view = MachineView::new(self.listener.as_mut(), &mut commands);
            next.on_start(&mut view);
            pending = view.take_transition();
            self.current = Some(next);
        }

        CoreStep {
            commands,
            keep_running: !self.is_terminal(),
        }
    }

    fn notify_state(&mut self, stage: StageId) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_state_update(stage);
        }
    }

    fn write_to_log(&mut self, stage: StageId, message: &str) {
        if let Some(listener) = self.listener.as_mut() {
            listener.write_to_log(stage, message);
        }
    }
}
