// src/engine/listener.rs

//! Observer contract for UI / logging collaborators.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::ProcessOutcome;
use crate::types::{StageId, format_elapsed};

/// Progress snapshot handed to [`PipelineListener::print_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: StageId,
    /// 1-based position of `stage` among the working stages.
    pub position: usize,
    pub total: usize,
    pub elapsed: Duration,
}

/// Receives every observable output of the state machine.
///
/// Only `on_state_update` is required; everything else defaults to a no-op.
/// Calls are made synchronously from the machine, in transition order.
pub trait PipelineListener: Send {
    /// The current stage changed to `stage`.
    fn on_state_update(&mut self, stage: StageId);

    /// A still-running poll was observed for `stage`.
    fn on_poll(&mut self, _stage: StageId, _elapsed: Duration) {}

    /// The command of `stage` exited.
    fn on_complete(&mut self, _stage: StageId, _outcome: ProcessOutcome, _elapsed: Duration) {}

    /// The machine was initialised and is about to enter its first stage.
    fn action_init(&mut self) {}

    /// `stage` issued its command to the supervisor.
    fn action_start(&mut self, _stage: StageId) {}

    /// A stop request is being propagated while `stage` is current.
    fn action_stop(&mut self, _stage: StageId) {}

    fn print_progress(&mut self, _progress: &Progress) {}

    fn write_to_log(&mut self, _stage: StageId, _message: &str) {}
}

/// Listener that renders everything through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl PipelineListener for LoggingListener {
    fn on_state_update(&mut self, stage: StageId) {
        match stage {
            StageId::Done => info!("pipeline finished"),
            StageId::Failed => warn!("pipeline failed"),
            StageId::Cancelled => warn!("pipeline cancelled"),
            _ => info!(stage = %stage, code = stage.code(), "entering stage"),
        }
    }

    fn action_stop(&mut self, stage: StageId) {
        info!(stage = %stage, "stop requested; terminating stage command");
    }

    fn print_progress(&mut self, progress: &Progress) {
        info!(
            "[{}/{}] {} running for {}",
            progress.position,
            progress.total,
            progress.stage,
            format_elapsed(progress.elapsed)
        );
    }

    fn write_to_log(&mut self, stage: StageId, message: &str) {
        debug!(stage = %stage, "{}", message);
    }
}
