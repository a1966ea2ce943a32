//! Domain module - batch consultation entities and messages
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod events;
pub mod job;
pub mod parcel;

pub use events::{
    ConsultPayload, ControllerEvent, EngineCommand, EngineEvent, JobSnapshot, NoticeKind,
    ParcelResult, UserNotice,
};
pub use job::{BatchJob, Generation, JobState};
pub use parcel::{output_header_line, ParcelRecord, FIELD_SEPARATOR, OUTPUT_HEADER};
