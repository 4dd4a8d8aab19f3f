use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep};

use rnaflow::engine::{InvocationId, PipelineEvent, PollEvent, ProcessOutcome};
use rnaflow::exec::{
    BackendFuture, Command, StopReport, SupervisorBackend, SupervisorError, Termination,
};

/// How a scripted "process" behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Report `polls` still-running ticks, then exit with `code`.
    Exit { polls: u32, code: i32 },
    /// Keep reporting still-running until stopped.
    Hang,
    /// Refuse to launch, as if the executable did not exist.
    LaunchError,
}

struct Active {
    started: Instant,
    cancel: oneshot::Sender<()>,
}

/// A fake supervisor that:
/// - records every launched command
/// - plays back a per-program script as `PipelineEvent`s on a fixed tick
/// - counts stop requests.
///
/// Programs without a script exit 0 on their first tick.
pub struct ScriptedSupervisor {
    events_tx: mpsc::Sender<PipelineEvent>,
    scripts: HashMap<String, Script>,
    tick: Duration,
    launched: Arc<Mutex<Vec<Command>>>,
    stops: Arc<AtomicUsize>,
    next_invocation: InvocationId,
    active: Option<Active>,
}

impl ScriptedSupervisor {
    pub fn new(events_tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            events_tx,
            scripts: HashMap::new(),
            tick: Duration::from_millis(5),
            launched: Arc::new(Mutex::new(Vec::new())),
            stops: Arc::new(AtomicUsize::new(0)),
            next_invocation: 0,
            active: None,
        }
    }

    pub fn script(mut self, program: &str, script: Script) -> Self {
        self.scripts.insert(program.to_string(), script);
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Shared view of launched commands, usable after the runtime took ownership.
    pub fn launched(&self) -> Arc<Mutex<Vec<Command>>> {
        Arc::clone(&self.launched)
    }

    pub fn stop_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.stops)
    }
}

impl SupervisorBackend for ScriptedSupervisor {
    fn start(&mut self, command: Command) -> BackendFuture<'_, InvocationId> {
        let script = self
            .scripts
            .get(command.program())
            .copied()
            .unwrap_or(Script::Exit { polls: 0, code: 0 });

        Box::pin(async move {
            if script == Script::LaunchError {
                return Err(SupervisorError::Launch {
                    program: command.program().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted launch error"),
                });
            }

            self.launched.lock().unwrap().push(command);
            self.next_invocation += 1;
            let invocation = self.next_invocation;

            let (cancel, mut cancel_rx) = oneshot::channel::<()>();
            let started = Instant::now();
            self.active = Some(Active { started, cancel });

            let tx = self.events_tx.clone();
            let tick = self.tick;
            tokio::spawn(async move {
                let mut polls = 0;
                loop {
                    tokio::select! {
                        _ = &mut cancel_rx => return,
                        _ = sleep(tick) => {}
                    }
                    let elapsed = started.elapsed();
                    let event = match script {
                        Script::Exit { polls: n, code } if polls >= n => PollEvent::Completed {
                            outcome: if code == 0 {
                                ProcessOutcome::Success
                            } else {
                                ProcessOutcome::Failed(code)
                            },
                            elapsed,
                        },
                        _ => PollEvent::StillRunning { elapsed },
                    };
                    let done = matches!(event, PollEvent::Completed { .. });
                    if tx.send(PipelineEvent::Polled { invocation, event }).await.is_err() || done {
                        return;
                    }
                    polls += 1;
                }
            });

            Ok(invocation)
        })
    }

    fn stop(&mut self) -> BackendFuture<'_, StopReport> {
        Box::pin(async move {
            self.stops.fetch_add(1, Ordering::SeqCst);
            let report = match self.active.take() {
                Some(active) => {
                    let elapsed = active.started.elapsed();
                    let _ = active.cancel.send(());
                    StopReport {
                        termination: Termination::Graceful,
                        elapsed,
                    }
                }
                None => StopReport {
                    termination: Termination::NotRunning,
                    elapsed: Duration::ZERO,
                },
            };
            Ok(report)
        })
    }
}
