//! Task envelopes and lifecycle state.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detection::ItemOutcome;

/// Lifecycle state of a submitted task.
///
/// The wire format uses the upper-case names clients poll for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Created, not yet picked up by a worker.
    Pending,
    /// A worker has begun detection.
    Started,
    /// Terminal, result present.
    Success,
    /// Terminal, error present.
    Failure,
}

impl TaskState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Started => "STARTED",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

/// A named image waiting to be processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageItem {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// The unit of submitted work carried from the gateway to a worker.
///
/// The payload is never mutated after creation; item names are unique within
/// one envelope (the gateway rejects duplicates before enqueue).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub id: Uuid,
    pub items: Vec<ImageItem>,
    pub created_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(items: Vec<ImageItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            items,
            created_at: Utc::now(),
        }
    }

    /// Names of all payload items, in submission order.
    pub fn item_names(&self) -> Vec<String> {
        self.items.iter().map(|i| i.name.clone()).collect()
    }
}

/// Error classification for failed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// Bad payload detected at worker time.
    Validation,
    /// The detection backend failed for the batch.
    Inference,
    /// Detection exceeded the per-task deadline.
    Timeout,
    /// The broker redelivered the task too many times.
    MaxRetriesExceeded,
}

/// Why a task ended in `Failure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Per-item outcomes keyed by submitted image name.
pub type TaskResult = HashMap<String, ItemOutcome>;

/// Current state and outcome of a task as held by the result store.
///
/// Exactly one of `result`/`error` is populated once the state is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Fresh `Pending` record for a newly submitted envelope.
    pub fn pending(envelope: &TaskEnvelope) -> Self {
        Self {
            id: envelope.id,
            state: TaskState::Pending,
            result: None,
            error: None,
            created_at: envelope.created_at,
            started_at: None,
            finished_at: None,
        }
    }
}
