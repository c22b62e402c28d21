//! In-memory result store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;
use visionq_common::{TaskError, TaskRecord, TaskResult, TaskState};

use super::{ResultStore, StoreError};

/// `RwLock`-guarded map from task id to record. Polls vastly outnumber
/// writes once tasks settle, so readers should not contend with each other.
pub struct InMemoryResultStore {
    records: RwLock<HashMap<Uuid, TaskRecord>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryResultStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn create(&self, record: TaskRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id));
        }
        records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<TaskRecord, StoreError> {
        let records = self.records.read().await;
        records.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn mark_started(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if record.state.is_terminal() {
            return Ok(false);
        }
        record.state = TaskState::Started;
        if record.started_at.is_none() {
            record.started_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn complete(&self, id: Uuid, result: TaskResult) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if record.state.is_terminal() {
            return Err(StoreError::AlreadyTerminal(id));
        }
        record.state = TaskState::Success;
        record.result = Some(result);
        record.error = None;
        record.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: TaskError) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if record.state.is_terminal() {
            return Err(StoreError::AlreadyTerminal(id));
        }
        record.state = TaskState::Failure;
        record.error = Some(error);
        record.result = None;
        record.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.remove(&id).map(|_| ()).ok_or(StoreError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visionq_common::{ImageItem, TaskEnvelope, TaskErrorKind};

    fn pending_record() -> TaskRecord {
        let envelope = TaskEnvelope::new(vec![ImageItem {
            name: "cat.jpg".to_string(),
            bytes: vec![1, 2, 3],
        }]);
        TaskRecord::pending(&envelope)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryResultStore::new();
        let record = pending_record();
        let id = record.id;

        store.create(record).await.unwrap();

        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.state, TaskState::Pending);
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_not_found() {
        let store = InMemoryResultStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let store = InMemoryResultStore::new();
        let record = pending_record();
        let id = record.id;

        store.create(record.clone()).await.unwrap();
        assert_eq!(
            store.create(record).await,
            Err(StoreError::AlreadyExists(id))
        );
    }

    #[tokio::test]
    async fn test_lifecycle_pending_started_success() {
        let store = InMemoryResultStore::new();
        let record = pending_record();
        let id = record.id;
        store.create(record).await.unwrap();

        assert!(store.mark_started(id).await.unwrap());
        let started = store.get(id).await.unwrap();
        assert_eq!(started.state, TaskState::Started);
        assert!(started.started_at.is_some());

        store.complete(id, TaskResult::new()).await.unwrap();
        let done = store.get(id).await.unwrap();
        assert_eq!(done.state, TaskState::Success);
        assert!(done.result.is_some());
        assert!(done.error.is_none());
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_records_are_frozen() {
        let store = InMemoryResultStore::new();
        let record = pending_record();
        let id = record.id;
        store.create(record).await.unwrap();

        store.mark_started(id).await.unwrap();
        store
            .fail(id, TaskError::new(TaskErrorKind::Inference, "model crashed"))
            .await
            .unwrap();

        // Redelivered work must observe the terminal state and back off.
        assert!(!store.mark_started(id).await.unwrap());

        // Duplicate terminal writes are rejected and change nothing.
        assert_eq!(
            store.complete(id, TaskResult::new()).await,
            Err(StoreError::AlreadyTerminal(id))
        );
        assert_eq!(
            store
                .fail(id, TaskError::new(TaskErrorKind::Timeout, "late"))
                .await,
            Err(StoreError::AlreadyTerminal(id))
        );

        let fetched = store.get(id).await.unwrap();
        assert_eq!(fetched.state, TaskState::Failure);
        let error = fetched.error.unwrap();
        assert_eq!(error.kind, TaskErrorKind::Inference);
        assert_eq!(error.message, "model crashed");
        assert!(fetched.result.is_none());
    }

    #[tokio::test]
    async fn test_remove_rolls_back_pending_record() {
        let store = InMemoryResultStore::new();
        let record = pending_record();
        let id = record.id;

        store.create(record).await.unwrap();
        store.remove(id).await.unwrap();

        assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
        assert_eq!(store.remove(id).await, Err(StoreError::NotFound(id)));
    }
}
