//! VisionQ Common Types
//!
//! Shared types used by the backend service and the client CLI.

pub mod detection;
pub mod protocol;
pub mod task;

pub use detection::{BoundingBox, Detection, ItemOutcome};
pub use protocol::{
    ErrorResponse, InvalidImage, StartTaskResponse, TaskResultResponse, TaskStatusResponse,
};
pub use task::{
    ImageItem, TaskEnvelope, TaskError, TaskErrorKind, TaskRecord, TaskResult, TaskState,
};
