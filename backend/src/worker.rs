//! Worker pool: consumes envelopes, runs detection, writes outcomes.
//!
//! Each worker is an independent tokio task looping consume → mark started →
//! detect → write terminal state → ack. Workers share nothing but the broker,
//! the store and the detector handle, all of which synchronize internally.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use visionq_common::{ItemOutcome, TaskEnvelope, TaskError, TaskErrorKind, TaskResult};

use crate::broker::{BrokerChannel, Delivery};
use crate::detector::{Detector, ItemDetections};
use crate::store::{ResultStore, StoreError};

/// Tuning for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Per-task detection deadline; overrun becomes `Failure/Timeout`.
    pub task_timeout: Duration,
    /// A delivery beyond this count is dead-lettered instead of processed.
    pub max_deliveries: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(60),
            max_deliveries: 3,
        }
    }
}

/// Handle to a group of running workers.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers sharing the broker, store and detector handles.
    pub fn spawn(
        n: usize,
        broker: Arc<dyn BrokerChannel>,
        store: Arc<dyn ResultStore>,
        detector: Arc<dyn Detector>,
        settings: WorkerSettings,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let broker = Arc::clone(&broker);
            let store = Arc::clone(&store);
            let detector = Arc::clone(&detector);
            let settings = settings.clone();
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, broker, store, detector, settings, &mut rx).await;
            }));
        }

        info!("Worker pool started with {} workers", n);
        Self { shutdown_tx, joins }
    }

    /// Stop taking new deliveries. In-flight detection calls finish first.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    broker: Arc<dyn BrokerChannel>,
    store: Arc<dyn ResultStore>,
    detector: Arc<dyn Detector>,
    settings: WorkerSettings,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let delivery = tokio::select! {
            _ = shutdown_rx.changed() => continue,
            delivery = broker.consume() => delivery,
        };

        process_delivery(
            worker_id,
            &delivery,
            store.as_ref(),
            detector.as_ref(),
            &settings,
        )
        .await;

        // Every path through processing leaves the record consistent, so the
        // delivery is always completed here.
        broker.ack(delivery.envelope.id).await;
    }
    debug!("worker {} stopped", worker_id);
}

/// Handle one delivery end to end.
///
/// Failures in here are recorded on the task, never raised: one bad task must
/// not affect another task's processing or kill the worker.
async fn process_delivery(
    worker_id: usize,
    delivery: &Delivery,
    store: &dyn ResultStore,
    detector: &dyn Detector,
    settings: &WorkerSettings,
) {
    let task_id = delivery.envelope.id;

    match store.mark_started(task_id).await {
        Ok(true) => {}
        Ok(false) => {
            // At-least-once delivery: a finished task came around again.
            debug!("task {} is already terminal, ignoring redelivery", task_id);
            return;
        }
        Err(e) => {
            warn!("task {}: cannot mark started: {}", task_id, e);
            return;
        }
    }

    if delivery.attempt > settings.max_deliveries {
        warn!(
            "task {} was delivered {} times (max {}), dead-lettering",
            task_id, delivery.attempt, settings.max_deliveries
        );
        let err = TaskError::new(
            TaskErrorKind::MaxRetriesExceeded,
            format!(
                "task was delivered {} times without completing",
                delivery.attempt
            ),
        );
        record_failure(store, task_id, err).await;
        return;
    }

    // Gateway validation normally guarantees a non-empty payload; a broker
    // feeding us something else is a task-level failure, not a crash.
    if delivery.envelope.items.is_empty() {
        let err = TaskError::new(TaskErrorKind::Validation, "envelope has no payload items");
        record_failure(store, task_id, err).await;
        return;
    }

    debug!(
        "worker {} processing task {} ({} image(s), attempt {})",
        worker_id,
        task_id,
        delivery.envelope.items.len(),
        delivery.attempt
    );

    let outcome =
        tokio::time::timeout(settings.task_timeout, detector.detect(&delivery.envelope.items))
            .await;

    match outcome {
        Err(_) => {
            let err = TaskError::new(
                TaskErrorKind::Timeout,
                format!(
                    "detection did not finish within {}s",
                    settings.task_timeout.as_secs()
                ),
            );
            record_failure(store, task_id, err).await;
        }
        Ok(Err(e)) => {
            error!("worker {}: detection failed for task {}: {}", worker_id, task_id, e);
            record_failure(
                store,
                task_id,
                TaskError::new(TaskErrorKind::Inference, e.to_string()),
            )
            .await;
        }
        Ok(Ok(detections)) => {
            let result = assemble_result(&delivery.envelope, detections);
            match store.complete(task_id, result).await {
                Ok(()) => debug!("worker {} completed task {}", worker_id, task_id),
                // Lost the race against another delivery of the same task.
                Err(e) => debug!("task {}: result write rejected: {}", task_id, e),
            }
        }
    }
}

/// Pair detector output with the submitted item names. Every submitted name
/// gets an entry even if the detector dropped it from its response.
fn assemble_result(envelope: &TaskEnvelope, detections: Vec<ItemDetections>) -> TaskResult {
    let mut by_name: HashMap<String, ItemOutcome> = detections
        .into_iter()
        .map(|d| {
            let outcome = match d.outcome {
                Ok(found) => ItemOutcome::Detections(found),
                Err(error) => ItemOutcome::Failed { error },
            };
            (d.name, outcome)
        })
        .collect();

    envelope
        .items
        .iter()
        .map(|item| {
            let outcome = by_name.remove(&item.name).unwrap_or(ItemOutcome::Failed {
                error: "no result returned for this image".to_string(),
            });
            (item.name.clone(), outcome)
        })
        .collect()
}

async fn record_failure(store: &dyn ResultStore, task_id: Uuid, error: TaskError) {
    match store.fail(task_id, error).await {
        Ok(()) => {}
        Err(StoreError::AlreadyTerminal(_)) => {
            debug!("task {} already terminal, keeping first outcome", task_id)
        }
        Err(e) => warn!("task {}: failure write rejected: {}", task_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use visionq_common::{ImageItem, TaskRecord, TaskState};

    use crate::broker::{BrokerSettings, InMemoryBroker};
    use crate::store::InMemoryResultStore;
    use crate::test_util::stub_detector::{StubDetector, StubMode};

    fn envelope(names: &[&str]) -> TaskEnvelope {
        TaskEnvelope::new(
            names
                .iter()
                .map(|name| ImageItem {
                    name: name.to_string(),
                    bytes: vec![0u8; 8],
                })
                .collect(),
        )
    }

    async fn submit(
        broker: &InMemoryBroker,
        store: &InMemoryResultStore,
        envelope: TaskEnvelope,
    ) -> Uuid {
        let id = envelope.id;
        store.create(TaskRecord::pending(&envelope)).await.unwrap();
        broker.publish(envelope).await.unwrap();
        id
    }

    async fn wait_for_terminal(store: &InMemoryResultStore, id: Uuid) -> TaskRecord {
        for _ in 0..200 {
            let record = store.get(id).await.unwrap();
            if record.state.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never reached a terminal state", id);
    }

    fn pool(
        broker: &Arc<InMemoryBroker>,
        store: &Arc<InMemoryResultStore>,
        detector: StubDetector,
        settings: WorkerSettings,
    ) -> WorkerPool {
        WorkerPool::spawn(
            2,
            broker.clone(),
            store.clone(),
            Arc::new(detector),
            settings,
        )
    }

    #[tokio::test]
    async fn test_success_path_covers_every_item() {
        let broker = Arc::new(InMemoryBroker::new(BrokerSettings::default()));
        let store = Arc::new(InMemoryResultStore::new());
        let pool = pool(
            &broker,
            &store,
            StubDetector::new(StubMode::Succeed),
            WorkerSettings::default(),
        );

        let id = submit(&broker, &store, envelope(&["a.jpg", "b.jpg", "c.jpg"])).await;
        let record = wait_for_terminal(&store, id).await;

        assert_eq!(record.state, TaskState::Success);
        assert!(record.error.is_none());
        assert!(record.started_at.is_some());
        assert!(record.finished_at.is_some());

        let result = record.result.unwrap();
        assert_eq!(result.len(), 3);
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            let outcome = result.get(name).unwrap();
            let found = outcome.detections().unwrap();
            assert_eq!(found.len(), 1);
            assert!(found[0].confidence >= 0.0 && found[0].confidence <= 1.0);
        }

        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn test_item_failure_does_not_fail_the_envelope() {
        let broker = Arc::new(InMemoryBroker::new(BrokerSettings::default()));
        let store = Arc::new(InMemoryResultStore::new());
        let pool = pool(
            &broker,
            &store,
            StubDetector::new(StubMode::FailItemsMatching("bad".to_string())),
            WorkerSettings::default(),
        );

        let id = submit(&broker, &store, envelope(&["good.jpg", "bad.jpg"])).await;
        let record = wait_for_terminal(&store, id).await;

        assert_eq!(record.state, TaskState::Success);
        let result = record.result.unwrap();
        assert!(!result.get("good.jpg").unwrap().is_failed());
        assert!(result.get("bad.jpg").unwrap().is_failed());

        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn test_batch_failure_is_terminal_inference_error() {
        let broker = Arc::new(InMemoryBroker::new(BrokerSettings::default()));
        let store = Arc::new(InMemoryResultStore::new());
        let pool = pool(
            &broker,
            &store,
            StubDetector::new(StubMode::FailBatch("model exploded".to_string())),
            WorkerSettings::default(),
        );

        let id = submit(&broker, &store, envelope(&["a.jpg"])).await;
        let record = wait_for_terminal(&store, id).await;

        assert_eq!(record.state, TaskState::Failure);
        assert!(record.result.is_none());
        let error = record.error.unwrap();
        assert_eq!(error.kind, TaskErrorKind::Inference);
        assert!(error.message.contains("model exploded"));

        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn test_slow_detection_times_out() {
        let broker = Arc::new(InMemoryBroker::new(BrokerSettings::default()));
        let store = Arc::new(InMemoryResultStore::new());
        let pool = pool(
            &broker,
            &store,
            StubDetector::new(StubMode::Delay(Duration::from_secs(10))),
            WorkerSettings {
                task_timeout: Duration::from_millis(50),
                max_deliveries: 3,
            },
        );

        let id = submit(&broker, &store, envelope(&["slow.jpg"])).await;
        let record = wait_for_terminal(&store, id).await;

        assert_eq!(record.state, TaskState::Failure);
        assert_eq!(record.error.unwrap().kind, TaskErrorKind::Timeout);

        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn test_redelivery_of_terminal_task_is_a_no_op() {
        let broker = Arc::new(InMemoryBroker::new(BrokerSettings::default()));
        let store = Arc::new(InMemoryResultStore::new());

        // Pre-complete the task, then deliver it: workers must leave the
        // recorded result alone.
        let env = envelope(&["done.jpg"]);
        let id = env.id;
        store.create(TaskRecord::pending(&env)).await.unwrap();
        store.mark_started(id).await.unwrap();
        let mut result = TaskResult::new();
        result.insert("done.jpg".to_string(), ItemOutcome::Detections(vec![]));
        store.complete(id, result).await.unwrap();

        let pool = pool(
            &broker,
            &store,
            StubDetector::new(StubMode::FailBatch("should never run".to_string())),
            WorkerSettings::default(),
        );
        broker.publish(env).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let record = store.get(id).await.unwrap();
        assert_eq!(record.state, TaskState::Success);
        assert!(record.error.is_none());

        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn test_empty_payload_fails_validation() {
        let broker = Arc::new(InMemoryBroker::new(BrokerSettings::default()));
        let store = Arc::new(InMemoryResultStore::new());
        let pool = pool(
            &broker,
            &store,
            StubDetector::new(StubMode::Succeed),
            WorkerSettings::default(),
        );

        let id = submit(&broker, &store, TaskEnvelope::new(vec![])).await;
        let record = wait_for_terminal(&store, id).await;

        assert_eq!(record.state, TaskState::Failure);
        assert_eq!(record.error.unwrap().kind, TaskErrorKind::Validation);

        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn test_exhausted_deliveries_are_dead_lettered() {
        // Detection outlives the visibility timeout, so the task keeps being
        // redelivered until the attempt cap converts it into a failure.
        let broker = Arc::new(InMemoryBroker::new(BrokerSettings {
            capacity: 8,
            visibility_timeout: Duration::from_millis(30),
        }));
        let store = Arc::new(InMemoryResultStore::new());
        let pool = pool(
            &broker,
            &store,
            StubDetector::new(StubMode::Delay(Duration::from_millis(500))),
            WorkerSettings {
                task_timeout: Duration::from_secs(60),
                max_deliveries: 1,
            },
        );

        let id = submit(&broker, &store, envelope(&["stuck.jpg"])).await;
        let record = wait_for_terminal(&store, id).await;

        assert_eq!(record.state, TaskState::Failure);
        assert_eq!(record.error.unwrap().kind, TaskErrorKind::MaxRetriesExceeded);

        pool.shutdown_and_join().await;
    }
}
