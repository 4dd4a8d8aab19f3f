// src/exec/backend.rs

//! Pluggable supervisor backend abstraction.
//!
//! The runtime talks to a `SupervisorBackend` instead of the concrete
//! [`Supervisor`] handle. Production code uses the real supervisor; tests can
//! provide an implementation that never spawns processes and emits scripted
//! `PipelineEvent`s instead.

use std::future::Future;
use std::pin::Pin;

use crate::engine::InvocationId;
use crate::exec::command::Command;
use crate::exec::supervisor::{StopReport, Supervisor, SupervisorError};

/// Boxed future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SupervisorError>> + Send + 'a>>;

/// Process control used by the pipeline runtime.
pub trait SupervisorBackend: Send {
    /// Launch `command`; poll events for it carry the returned invocation id.
    fn start(&mut self, command: Command) -> BackendFuture<'_, InvocationId>;

    /// Stop whatever is running. Must be safe to call when nothing is.
    fn stop(&mut self) -> BackendFuture<'_, StopReport>;
}

impl SupervisorBackend for Supervisor {
    fn start(&mut self, command: Command) -> BackendFuture<'_, InvocationId> {
        Box::pin(Supervisor::start(self, command))
    }

    fn stop(&mut self) -> BackendFuture<'_, StopReport> {
        Box::pin(Supervisor::stop(self))
    }
}
