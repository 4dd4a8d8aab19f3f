// src/engine/mod.rs

//! Pipeline state machine.
//!
//! - [`stage`] holds the per-stage reactions and the [`StateView`] contract
//!   stages use to request launches and transitions.
//! - [`core`] is the synchronous, IO-free [`PipelineMachine`]: it owns the
//!   current stage, applies transitions and notifies the listener.
//! - [`listener`] defines the observer contract plus a tracing-backed
//!   implementation.
//! - [`runtime`] is the async shell that feeds supervisor events into the
//!   machine and executes the commands it returns.

use std::time::Duration;

/// Identifier of one `start` on the supervisor.
pub type InvocationId = u64;

/// Exit status of a stage command as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Success,
    /// Non-zero exit code, or `-1` when the process died from a signal.
    Failed(i32),
}

/// Liveness signal produced on each supervisor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    StillRunning {
        elapsed: Duration,
    },
    Completed {
        outcome: ProcessOutcome,
        elapsed: Duration,
    },
}

/// Events flowing into the runtime from the supervisor and the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The supervisor polled the process started as `invocation`.
    Polled {
        invocation: InvocationId,
        event: PollEvent,
    },
    /// The driver asked the pipeline to stop (e.g. Ctrl-C).
    StopRequested,
}

pub mod core;
pub mod listener;
pub mod runtime;
pub mod stage;
pub mod step;

pub use core::{PipelineMachine, PipelineReport, PipelineStatus, StagePlan, StageRecord, StageResult};
pub use listener::{LoggingListener, PipelineListener, Progress};
pub use runtime::Runtime;
pub use stage::{Stage, StateView};
pub use step::{CoreCommand, CoreStep};
