// tests/transition_properties.rs
mod common;
use crate::common::{RecordingListener, builders::named_plan};

use std::time::Duration;

use proptest::prelude::*;

use rnaflow::engine::{
    CoreCommand, CoreStep, PipelineEvent, PipelineMachine, PipelineStatus, PollEvent,
    ProcessOutcome,
};
use rnaflow::types::StageId;

/// One scripted stage: how many still-running polls, then its exit code.
fn stage_script() -> impl Strategy<Value = (u8, i32)> {
    (
        0..4u8,
        prop_oneof![4 => Just(0), 1 => 1..=255i32],
    )
}

fn launched(step: &CoreStep) -> Option<StageId> {
    step.commands.iter().find_map(|c| match c {
        CoreCommand::Launch { stage, .. } => Some(*stage),
        CoreCommand::StopProcess => None,
    })
}

/// Drive the machine with `scripts[i]` for the i-th launched stage.
fn drive(scripts: &[(u8, i32)]) -> (PipelineMachine, RecordingListener) {
    let listener = RecordingListener::new();
    let mut machine = PipelineMachine::new(named_plan()).with_listener(Box::new(listener.clone()));

    let mut step = machine.start();
    let mut invocation = 0;
    while let Some(stage) = launched(&step) {
        let (polls, code) = scripts[invocation as usize];
        invocation += 1;
        machine.launched(stage, invocation);

        for i in 0..polls {
            machine.step(PipelineEvent::Polled {
                invocation,
                event: PollEvent::StillRunning {
                    elapsed: Duration::from_millis(u64::from(i) * 10),
                },
            });
        }

        let outcome = if code == 0 {
            ProcessOutcome::Success
        } else {
            ProcessOutcome::Failed(code)
        };
        step = machine.step(PipelineEvent::Polled {
            invocation,
            event: PollEvent::Completed {
                outcome,
                elapsed: Duration::from_millis(u64::from(polls) * 10),
            },
        });
    }

    (machine, listener)
}

proptest! {
    #[test]
    fn states_only_move_forward(scripts in proptest::collection::vec(stage_script(), 7)) {
        let (_machine, listener) = drive(&scripts);
        let states = listener.states();

        for pair in states.windows(2) {
            prop_assert!(
                pair[0].can_transition_to(pair[1]),
                "illegal transition {} -> {}", pair[0], pair[1]
            );
        }
    }

    #[test]
    fn done_iff_every_stage_exits_zero(scripts in proptest::collection::vec(stage_script(), 7)) {
        let (machine, listener) = drive(&scripts);
        let first_failure = scripts.iter().position(|(_, code)| *code != 0);

        match first_failure {
            None => {
                prop_assert_eq!(machine.status(), PipelineStatus::Done);
                prop_assert_eq!(listener.states().len(), StageId::PIPELINE.len() + 1);
            }
            Some(index) => {
                let stage = StageId::PIPELINE[index];
                prop_assert_eq!(machine.status(), PipelineStatus::Failed { stage });
                // Stages after the failing one are never entered.
                prop_assert_eq!(listener.states().len(), index + 2);
            }
        }
    }

    #[test]
    fn terminal_is_notified_last_and_once(scripts in proptest::collection::vec(stage_script(), 7)) {
        let (machine, listener) = drive(&scripts);
        let states = listener.states();

        let terminals: Vec<&StageId> = states.iter().filter(|s| s.is_terminal()).collect();
        prop_assert_eq!(terminals.len(), 1);
        prop_assert!(states.last().is_some_and(|s| s.is_terminal()));
        prop_assert_eq!(machine.history().len(), states.len() - 1);
    }

    #[test]
    fn late_events_never_change_a_terminal_pipeline(
        scripts in proptest::collection::vec(stage_script(), 7),
        code in -1..=3i32,
    ) {
        let (mut machine, listener) = drive(&scripts);
        let status = machine.status();
        let seen = listener.events().len();

        let outcome = if code == 0 { ProcessOutcome::Success } else { ProcessOutcome::Failed(code) };
        for invocation in 0..10 {
            let step = machine.step(PipelineEvent::Polled {
                invocation,
                event: PollEvent::Completed { outcome, elapsed: Duration::ZERO },
            });
            prop_assert!(!step.keep_running);
            prop_assert!(step.commands.is_empty());
        }
        let step = machine.step(PipelineEvent::StopRequested);
        prop_assert!(step.commands.is_empty());

        prop_assert_eq!(machine.status(), status);
        prop_assert_eq!(listener.events().len(), seen);
    }
}
