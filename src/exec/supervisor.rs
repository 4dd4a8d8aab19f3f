// src/exec/supervisor.rs

//! Subprocess supervisor: owns at most one external process at a time.
//!
//! All mutable state (child handle, timestamps, timer) lives inside a single
//! Tokio task. The public [`Supervisor`] handle talks to it over a request
//! channel, and the recurring timer only posts tick messages into a second
//! channel, so polling and stopping are serialized on one execution context:
//!
//! - `stop` cancels the timer before signalling the child, so no tick
//!   scheduled after the stop request can observe the process.
//! - a poll already being processed runs to completion before `stop` starts.
//! - ticks still queued from an earlier invocation are recognised by their
//!   invocation id and dropped.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

use crate::engine::{InvocationId, PipelineEvent, PollEvent, ProcessOutcome};
use crate::exec::command::Command;
use crate::exec::timer::{RecurringTimer, TaskFlow};

/// Default polling cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default graceful-stop window before escalating to a kill.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("a process is already running (pid {pid:?})")]
    AlreadyRunning { pid: Option<u32> },

    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("supervisor loop is no longer running")]
    Disconnected,
}

/// Timing knobs for polling and termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub initial_delay: Duration,
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// How a `stop` request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Nothing was running; no signal was sent.
    NotRunning,
    /// The process exited within the graceful window.
    Graceful,
    /// The graceful window elapsed and the process was killed.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    pub termination: Termination,
    /// Elapsed time of the last invocation, frozen at the stop timestamp.
    pub elapsed: Duration,
}

/// Snapshot returned by [`Supervisor::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub invocation: Option<InvocationId>,
    pub elapsed: Duration,
}

enum Request {
    Start {
        command: Command,
        reply: oneshot::Sender<Result<InvocationId, SupervisorError>>,
    },
    Stop {
        reply: oneshot::Sender<StopReport>,
    },
    Status {
        reply: oneshot::Sender<SupervisorStatus>,
    },
}

/// Handle to the supervisor task.
///
/// Cloning is cheap; every clone talks to the same process slot. Dropping
/// the last clone shuts the task down (and kills any child on drop).
#[derive(Debug, Clone)]
pub struct Supervisor {
    tx: mpsc::Sender<Request>,
}

impl Supervisor {
    /// Spawn the supervisor loop. Poll events are delivered to `events_tx`.
    pub fn spawn(events_tx: mpsc::Sender<PipelineEvent>, options: SupervisorOptions) -> Self {
        let (tx, rx) = mpsc::channel::<Request>(16);
        // Capacity 1: ticks that pile up while a poll is pending are coalesced.
        let (tick_tx, tick_rx) = mpsc::channel::<InvocationId>(1);

        let state = SupervisorLoop {
            options,
            events_tx,
            tick_tx,
            timer: RecurringTimer::new(),
            process: None,
            next_invocation: 0,
            started_at: None,
            last_seen: None,
        };
        tokio::spawn(state.run(rx, tick_rx));

        Self { tx }
    }

    /// Launch `command`. Fails if a process is already in flight or the
    /// executable cannot be started.
    pub async fn start(&self, command: Command) -> Result<InvocationId, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Start { command, reply }).await?;
        rx.await.map_err(|_| SupervisorError::Disconnected)?
    }

    /// Stop the running process, if any: SIGTERM, bounded wait, then kill.
    pub async fn stop(&self) -> Result<StopReport, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Stop { reply }).await?;
        rx.await.map_err(|_| SupervisorError::Disconnected)
    }

    pub async fn status(&self) -> Result<SupervisorStatus, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.request(Request::Status { reply }).await?;
        rx.await.map_err(|_| SupervisorError::Disconnected)
    }

    /// `last observed - start` of the current or most recent invocation.
    pub async fn elapsed_time(&self) -> Result<Duration, SupervisorError> {
        Ok(self.status().await?.elapsed)
    }

    async fn request(&self, request: Request) -> Result<(), SupervisorError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| SupervisorError::Disconnected)
    }
}

struct RunningProcess {
    invocation: InvocationId,
    pid: Option<u32>,
    program: String,
    child: Child,
}

struct SupervisorLoop {
    options: SupervisorOptions,
    events_tx: mpsc::Sender<PipelineEvent>,
    tick_tx: mpsc::Sender<InvocationId>,
    timer: RecurringTimer,
    process: Option<RunningProcess>,
    next_invocation: InvocationId,
    started_at: Option<Instant>,
    last_seen: Option<Instant>,
}

impl SupervisorLoop {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut ticks: mpsc::Receiver<InvocationId>,
    ) {
        debug!("supervisor loop started");

        loop {
            tokio::select! {
                // Requests first: a pending stop wins over a pending tick.
                biased;

                request = requests.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    self.handle_request(request).await;
                }
                Some(invocation) = ticks.recv() => {
                    self.poll(invocation).await;
                }
            }
        }

        self.timer.cancel();
        debug!("supervisor loop finished (handle dropped)");
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Start { command, reply } => {
                let _ = reply.send(self.start(command));
            }
            Request::Stop { reply } => {
                let report = self.stop().await;
                let _ = reply.send(report);
            }
            Request::Status { reply } => {
                let _ = reply.send(SupervisorStatus {
                    running: self.process.is_some(),
                    pid: self.process.as_ref().and_then(|p| p.pid),
                    invocation: self.process.as_ref().map(|p| p.invocation),
                    elapsed: self.elapsed(),
                });
            }
        }
    }

    fn start(&mut self, command: Command) -> Result<InvocationId, SupervisorError> {
        if let Some(ref running) = self.process {
            error!(
                pid = ?running.pid,
                program = %running.program,
                requested = %command,
                "start requested while a process is already running"
            );
            return Err(SupervisorError::AlreadyRunning { pid: running.pid });
        }

        let mut child = command
            .to_process()
            .spawn()
            .map_err(|source| SupervisorError::Launch {
                program: command.program().to_string(),
                source,
            })?;

        self.next_invocation += 1;
        let invocation = self.next_invocation;
        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, invocation, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, invocation, "stderr");
        }

        let now = Instant::now();
        self.started_at = Some(now);
        self.last_seen = Some(now);
        self.process = Some(RunningProcess {
            invocation,
            pid,
            program: command.program().to_string(),
            child,
        });

        let tick_tx = self.tick_tx.clone();
        self.timer.schedule(
            self.options.initial_delay,
            self.options.poll_interval,
            move || -> anyhow::Result<TaskFlow> {
                match tick_tx.try_send(invocation) {
                    // A full slot means a tick is already pending.
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(TaskFlow::Continue),
                    Err(mpsc::error::TrySendError::Closed(_)) => Ok(TaskFlow::Finished),
                }
            },
        );

        info!(invocation, ?pid, command = %command, "process started");
        Ok(invocation)
    }

    async fn poll(&mut self, invocation: InvocationId) {
        let Some(process) = self.process.as_mut() else {
            debug!(invocation, "tick with no running process; ignoring");
            return;
        };
        if process.invocation != invocation {
            debug!(
                invocation,
                current = process.invocation,
                "stale tick from a previous invocation; ignoring"
            );
            return;
        }

        let status = process.child.try_wait();
        self.last_seen = Some(Instant::now());

        let outcome = match status {
            Ok(None) => {
                let event = PipelineEvent::Polled {
                    invocation,
                    event: PollEvent::StillRunning {
                        elapsed: self.elapsed(),
                    },
                };
                // Progress is best effort; a busy consumer just misses a tick.
                if let Err(err) = self.events_tx.try_send(event) {
                    debug!(invocation, error = %err, "dropping still-running event");
                }
                return;
            }
            Ok(Some(status)) => {
                let code = status.code().unwrap_or(-1);
                info!(
                    invocation,
                    pid = ?process.pid,
                    exit_code = code,
                    success = status.success(),
                    "process exited"
                );
                if status.success() {
                    ProcessOutcome::Success
                } else {
                    ProcessOutcome::Failed(code)
                }
            }
            Err(err) => {
                error!(invocation, error = %err, "failed to query process status");
                ProcessOutcome::Failed(-1)
            }
        };

        // Completed: stop polling this handle and release it before reporting,
        // so the completion can only ever be delivered once.
        self.timer.cancel();
        self.process = None;

        let event = PipelineEvent::Polled {
            invocation,
            event: PollEvent::Completed {
                outcome,
                elapsed: self.elapsed(),
            },
        };
        if self.events_tx.send(event).await.is_err() {
            warn!(invocation, "event receiver dropped; completion not delivered");
        }
    }

    async fn stop(&mut self) -> StopReport {
        // Disarm first: nothing scheduled from here on may poll the child.
        self.timer.cancel();

        let Some(mut process) = self.process.take() else {
            debug!("stop requested with no running process");
            return StopReport {
                termination: Termination::NotRunning,
                elapsed: self.elapsed(),
            };
        };

        info!(invocation = process.invocation, pid = ?process.pid, "stopping process");
        request_termination(&mut process);

        let termination = match timeout(self.options.stop_timeout, process.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(invocation = process.invocation, ?status, "process exited after termination request");
                Termination::Graceful
            }
            Ok(Err(err)) => {
                warn!(invocation = process.invocation, error = %err, "waiting for process failed; killing");
                force_kill(&mut process).await;
                Termination::Forced
            }
            Err(_elapsed) => {
                warn!(
                    invocation = process.invocation,
                    timeout_ms = self.options.stop_timeout.as_millis() as u64,
                    "termination timeout; escalating to kill"
                );
                force_kill(&mut process).await;
                Termination::Forced
            }
        };

        self.last_seen = Some(Instant::now());
        StopReport {
            termination,
            elapsed: self.elapsed(),
        }
    }

    fn elapsed(&self) -> Duration {
        match (self.started_at, self.last_seen) {
            (Some(start), Some(seen)) => seen.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }
}

#[cfg(unix)]
fn request_termination(process: &mut RunningProcess) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = process.pid.and_then(|p| i32::try_from(p).ok()) else {
        // Already reaped; nothing to signal.
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, error = %err, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn request_termination(process: &mut RunningProcess) {
    if let Err(err) = process.child.start_kill() {
        debug!(error = %err, "termination request failed");
    }
}

async fn force_kill(process: &mut RunningProcess) {
    if let Err(err) = process.child.kill().await {
        warn!(
            invocation = process.invocation,
            error = %err,
            "failed to kill child process"
        );
    }
}

fn forward_lines<R>(reader: R, invocation: InvocationId, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(invocation, stream, "{}", line);
        }
    });
}
