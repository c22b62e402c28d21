//! Wire protocol for the HTTP gateway.
//!
//! Responses are constructed once from store records rather than assembled
//! incrementally, so every field the client may see is spelled out here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{TaskError, TaskRecord, TaskResult, TaskState};

/// Rejected member of a multipart submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidImage {
    pub filename: String,
    pub error: String,
}

/// 202 body for `POST /start_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTaskResponse {
    pub task_id: Uuid,
    /// Names of the images that were accepted into the task.
    pub images: Vec<String>,
    pub status: TaskState,
    /// Batch members rejected at validation time, excluded from the task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_images: Vec<InvalidImage>,
}

/// 200 body for `GET /task_status/{task_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: TaskState,
}

/// 200 body for `GET /task_result/{task_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultResponse {
    pub task_id: Uuid,
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}

impl TaskResultResponse {
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            task_id: record.id,
            status: record.state,
            result: record.result.clone(),
            error: record.error.clone(),
        }
    }
}

/// 4xx/5xx body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ImageItem, TaskEnvelope};

    #[test]
    fn test_pending_result_response_omits_result_and_error() {
        let envelope = TaskEnvelope::new(vec![ImageItem {
            name: "dog.jpg".to_string(),
            bytes: vec![0xff],
        }]);
        let record = TaskRecord::pending(&envelope);

        let response = TaskResultResponse::from_record(&record);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "PENDING");
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_start_task_response_hides_empty_invalid_list() {
        let response = StartTaskResponse {
            task_id: Uuid::new_v4(),
            images: vec!["dog.jpg".to_string()],
            status: TaskState::Pending,
            invalid_images: vec![],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("invalid_images").is_none());
    }
}
