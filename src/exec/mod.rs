// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] describes an external program invocation.
//! - [`timer`] is the recurring timer that paces polling.
//! - [`supervisor`] owns the single running child process: start, poll,
//!   graceful-then-forceful stop.
//! - [`backend`] provides the `SupervisorBackend` trait the runtime drives,
//!   implemented by the real supervisor and by fakes in tests.

pub mod backend;
pub mod command;
pub mod supervisor;
pub mod timer;

pub use backend::{BackendFuture, SupervisorBackend};
pub use command::Command;
pub use supervisor::{
    StopReport, Supervisor, SupervisorError, SupervisorOptions, SupervisorStatus, Termination,
};
pub use timer::{RecurringTimer, ScheduleId, TaskFlow, TimerTask};
