//! Broker channel between the gateway and the worker pool.
//!
//! Delivery is at-least-once: a consumed delivery that is never acked comes
//! back after the visibility timeout with its attempt counter bumped. The
//! worker pool bounds redelivery and dead-letters tasks that keep coming back.

mod memory;

pub use memory::{BrokerSettings, InMemoryBroker};

use async_trait::async_trait;
use uuid::Uuid;
use visionq_common::TaskEnvelope;

/// Transport failures at publish time. Surfaced to the submitting client,
/// which decides whether to resubmit; the gateway never retries silently.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Broker queue is full")]
    QueueFull,
}

/// A message handed to exactly one worker.
///
/// `attempt` starts at 1 and increases on every redelivery of the same
/// envelope.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub envelope: TaskEnvelope,
    pub attempt: u32,
}

/// Message transport decoupling submission from execution.
///
/// Implementations internalize all synchronization; callers share a handle
/// across arbitrarily many producers and consumers without extra locking.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Enqueue an envelope for pickup by one worker. Never blocks beyond
    /// internal synchronization; a full queue is a `TransportError`.
    async fn publish(&self, envelope: TaskEnvelope) -> Result<(), TransportError>;

    /// Block until a delivery is available.
    async fn consume(&self) -> Delivery;

    /// Complete a delivery so it is not redelivered.
    async fn ack(&self, task_id: Uuid);
}
