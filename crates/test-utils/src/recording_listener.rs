use std::sync::{Arc, Mutex};
use std::time::Duration;

use rnaflow::engine::{PipelineListener, ProcessOutcome, Progress};
use rnaflow::types::StageId;

/// Everything a listener can observe, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Init,
    StateUpdate(StageId),
    Start(StageId),
    Stop(StageId),
    Poll(StageId, Duration),
    Complete(StageId, ProcessOutcome),
    Progress(Progress),
    Log(StageId, String),
}

/// Listener that appends every callback to a shared log.
#[derive(Clone, Default)]
pub struct RecordingListener {
    log: Arc<Mutex<Vec<Observed>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Observed> {
        self.log.lock().unwrap().clone()
    }

    /// Only the `on_state_update` notifications.
    pub fn states(&self) -> Vec<StageId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::StateUpdate(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn polls(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Observed::Poll(..)))
            .count()
    }

    pub fn completions(&self) -> Vec<(StageId, ProcessOutcome)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Complete(s, o) => Some((s, o)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Observed) {
        self.log.lock().unwrap().push(event);
    }
}

impl PipelineListener for RecordingListener {
    fn on_state_update(&mut self, stage: StageId) {
        self.push(Observed::StateUpdate(stage));
    }

    fn on_poll(&mut self, stage: StageId, elapsed: Duration) {
        self.push(Observed::Poll(stage, elapsed));
    }

    fn on_complete(&mut self, stage: StageId, outcome: ProcessOutcome, _elapsed: Duration) {
        self.push(Observed::Complete(stage, outcome));
    }

    fn action_init(&mut self) {
        self.push(Observed::Init);
    }

    fn action_start(&mut self, stage: StageId) {
        self.push(Observed::Start(stage));
    }

    fn action_stop(&mut self, stage: StageId) {
        self.push(Observed::Stop(stage));
    }

    fn print_progress(&mut self, progress: &Progress) {
        self.push(Observed::Progress(*progress));
    }

    fn write_to_log(&mut self, stage: StageId, message: &str) {
        self.push(Observed::Log(stage, message.to_string()));
    }
}
