//! Core value types: tasks, samples, stage outcomes and reports.

mod outcome;
mod report;
mod sample;
mod task;

use std::collections::HashMap;

pub use outcome::{OutcomeStatus, StageOutcome};
pub use report::Report;
pub use sample::{SampleFormat, SampleHandle, SampleMetadata};
pub use task::{FailureCause, Task, TaskId, TaskState};

/// The field map produced by a single stage execution.
pub type StageData = HashMap<String, serde_json::Value>;
