// src/exec/timer.rs

//! Recurring timer used to drive supervisor polling.
//!
//! Each call to [`RecurringTimer::schedule`] spawns its own Tokio task, so the
//! scheduled closure runs concurrently with the caller. Active schedules are
//! tracked in an owned registry; an entry disappears when its task finishes
//! on its own or when [`RecurringTimer::cancel`] is called.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, warn};

/// What a timer task wants after a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFlow {
    /// Re-arm for another interval.
    Continue,
    /// Stop this schedule; it is removed from the registry.
    Finished,
}

/// Work executed on every firing.
///
/// An `Err` or a panic is logged and the schedule keeps firing.
pub trait TimerTask: Send + 'static {
    fn run(&mut self) -> anyhow::Result<TaskFlow>;
}

impl<F> TimerTask for F
where
    F: FnMut() -> anyhow::Result<TaskFlow> + Send + 'static,
{
    fn run(&mut self) -> anyhow::Result<TaskFlow> {
        self()
    }
}

/// Identifier of one schedule on a timer.
pub type ScheduleId = u64;

struct ScheduleEntry {
    id: ScheduleId,
    cancel: oneshot::Sender<()>,
}

type Registry = Arc<Mutex<Vec<ScheduleEntry>>>;

#[derive(Default)]
pub struct RecurringTimer {
    schedules: Registry,
    next_id: ScheduleId,
}

impl std::fmt::Debug for RecurringTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecurringTimer")
            .field("active_schedules", &self.active_schedules())
            .finish()
    }
}

impl RecurringTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `initial_delay`, then again `interval` after
    /// each run, until cancelled or the task reports [`TaskFlow::Finished`].
    ///
    /// Scheduling twice yields two independent firing sequences.
    pub fn schedule<T: TimerTask>(
        &mut self,
        initial_delay: Duration,
        interval: Duration,
        mut task: T,
    ) -> ScheduleId {
        self.next_id += 1;
        let id = self.next_id;
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        // Register before spawning so a task that finishes on its first
        // firing still finds (and removes) its own entry.
        lock(&self.schedules).push(ScheduleEntry {
            id,
            cancel: cancel_tx,
        });

        let registry = Arc::clone(&self.schedules);
        tokio::spawn(async move {
            // Dropped on every exit path, including an aborted task.
            let _entry = EntryGuard { registry, id };
            let mut delay = initial_delay;
            loop {
                // A dropped sender counts as cancellation too.
                tokio::select! {
                    _ = &mut cancel_rx => {
                        debug!(schedule = id, "timer schedule cancelled");
                        break;
                    }
                    _ = sleep(delay) => {}
                }

                match catch_unwind(AssertUnwindSafe(|| task.run())) {
                    Ok(Ok(TaskFlow::Continue)) => {}
                    Ok(Ok(TaskFlow::Finished)) => {
                        debug!(schedule = id, "timer task finished");
                        break;
                    }
                    Ok(Err(err)) => {
                        warn!(
                            schedule = id,
                            error = %err,
                            "timer task failed; keeping schedule alive"
                        );
                    }
                    Err(payload) => {
                        warn!(
                            schedule = id,
                            panic = panic_message(payload.as_ref()),
                            "timer task panicked; keeping schedule alive"
                        );
                    }
                }
                delay = interval;
            }
        });

        id
    }

    /// Stop all outstanding and future firings. Idempotent.
    pub fn cancel(&mut self) {
        let entries: Vec<ScheduleEntry> = lock(&self.schedules).drain(..).collect();
        if entries.is_empty() {
            return;
        }
        debug!(count = entries.len(), "cancelling timer schedules");
        for entry in entries {
            // The task may already be on its way out.
            let _ = entry.cancel.send(());
        }
    }

    /// Number of schedules that have not finished or been cancelled.
    pub fn active_schedules(&self) -> usize {
        lock(&self.schedules).len()
    }
}

impl Drop for RecurringTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Removes its schedule from the registry when dropped.
struct EntryGuard {
    registry: Registry,
    id: ScheduleId,
}

impl Drop for EntryGuard {
    fn drop(&mut self) {
        let id = self.id;
        lock(&self.registry).retain(|entry| entry.id != id);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn lock(registry: &Registry) -> std::sync::MutexGuard<'_, Vec<ScheduleEntry>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}
