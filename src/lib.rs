//! parcel-consult - batch consultation of rural parcel codes
//!
//! A submitted list of parcel codes is handed to a sequential lookup engine;
//! the `JobController` tracks the job lifecycle (running, paused, completed,
//! cancelled), folds generation-tagged engine events into an ordered output
//! buffer and publishes snapshots to observers.

// Module declarations
pub mod controller;
pub mod domain;
pub mod engine;
pub mod infrastructure;

#[cfg(test)]
mod test_utils;

pub use controller::{ControllerError, ControllerRuntime, JobController, RuntimeHandle, UserCommand};
pub use domain::{BatchJob, ControllerEvent, Generation, JobSnapshot, JobState, ParcelRecord, UserNotice};
pub use engine::{ConsultWorker, EngineHandle, ParcelFetcher, SigefFetcher, WorkerHandle};
