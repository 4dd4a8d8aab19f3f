#![allow(dead_code, unused_imports)]

pub use rnaflow_test_utils::builders;
pub use rnaflow_test_utils::recording_listener::{Observed, RecordingListener};
pub use rnaflow_test_utils::scripted_supervisor::{Script, ScriptedSupervisor};
pub use rnaflow_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
