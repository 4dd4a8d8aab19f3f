// src/engine/step.rs

//! Commands produced by the pure core, executed by the async shell.

use crate::exec::Command;
use crate::types::StageId;

/// Side effect requested by [`PipelineMachine`](super::PipelineMachine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Hand this stage's command to the supervisor.
    Launch { stage: StageId, command: Command },
    /// Stop the supervised process (graceful, then forced).
    StopProcess,
}

/// Decision returned by the core after handling a single input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// False once the machine has reached a terminal stage.
    pub keep_running: bool,
}

impl CoreStep {
    pub(crate) fn idle(keep_running: bool) -> Self {
        Self {
            commands: Vec::new(),
            keep_running,
        }
    }
}
