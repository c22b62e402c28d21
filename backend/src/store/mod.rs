//! Keyed result store shared by the gateway (reader) and worker pool (writer).
//!
//! The store is the only synchronization point between submission and
//! consumption: the gateway writes the initial `Pending` record, workers
//! write every transition after that, and polls read whatever is current.
//! State monotonicity is enforced here rather than trusted to callers.

mod memory;

pub use memory::InMemoryResultStore;

use async_trait::async_trait;
use uuid::Uuid;
use visionq_common::{TaskError, TaskRecord, TaskResult};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Unknown task id. Distinct from a `Pending` record.
    #[error("task {0} not found")]
    NotFound(Uuid),
    #[error("task {0} already exists")]
    AlreadyExists(Uuid),
    /// Rejected terminal write against an already-terminal record.
    #[error("task {0} is already in a terminal state")]
    AlreadyTerminal(Uuid),
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Establish the initial `Pending` record at submission time.
    async fn create(&self, record: TaskRecord) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<TaskRecord, StoreError>;

    /// Move a task to `Started`. Returns `false` without touching the record
    /// when the task is already terminal, so redeliveries become no-ops.
    async fn mark_started(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Terminal success write: the state and the full result map land
    /// together, so a reader never observes `Success` without its result.
    async fn complete(&self, id: Uuid, result: TaskResult) -> Result<(), StoreError>;

    /// Terminal failure write.
    async fn fail(&self, id: Uuid, error: TaskError) -> Result<(), StoreError>;

    /// Drop a record. Used by the gateway to roll back when publishing the
    /// envelope fails, so no orphaned `Pending` record survives.
    async fn remove(&self, id: Uuid) -> Result<(), StoreError>;
}
