//! Batch consultation controller
//!
//! - `JobController`: job lifecycle state machine, issues engine commands
//! - `ResultAggregator`: folds the engine event stream into the job
//! - `ControllerRuntime`: single-consumer loop serializing user requests and engine events

pub mod aggregator;
pub mod job_controller;
pub mod runtime;

pub use aggregator::{Aggregation, DiscardReason, ResultAggregator};
pub use job_controller::JobController;
pub use runtime::{ControllerRuntime, RuntimeHandle, UserCommand};

use crate::domain::JobState;

/// Controller-level rejections. Engine and per-item failures never surface here;
/// they become `UserNotice`s on the job instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("Submission rejected: no parcel codes were provided")]
    EmptySubmission,

    #[error("A consultation is already {state}; cancel it before submitting a new one")]
    JobInProgress { state: JobState },

    #[error("Cannot {action} while the job is {state}")]
    InvalidTransition { action: &'static str, state: JobState },

    #[error("Controller runtime is no longer running")]
    RuntimeClosed,
}

/// Split user text into identifiers: one per line, trimmed, blank lines dropped.
#[must_use]
pub fn parse_identifiers(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}
