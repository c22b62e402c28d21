//! In-memory broker implementation.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};
use uuid::Uuid;
use visionq_common::TaskEnvelope;

use super::{BrokerChannel, Delivery, TransportError};

/// Tuning knobs for the in-memory broker.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Maximum queued (not yet consumed) envelopes.
    pub capacity: usize,
    /// How long a consumed delivery may stay unacked before redelivery.
    pub visibility_timeout: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            visibility_timeout: Duration::from_secs(120),
        }
    }
}

struct InFlight {
    envelope: TaskEnvelope,
    attempt: u32,
    deadline: Instant,
}

#[derive(Default)]
struct BrokerState {
    /// Envelopes awaiting pickup, with their attempt counter.
    ready: VecDeque<(TaskEnvelope, u32)>,
    /// Consumed but not yet acked, keyed by task id.
    in_flight: HashMap<Uuid, InFlight>,
}

/// Bounded in-memory queue with visibility-timeout redelivery.
///
/// Arrival order is preserved for first deliveries; redeliveries join the
/// back of the queue. Neither is contractual for the `BrokerChannel` trait.
pub struct InMemoryBroker {
    settings: BrokerSettings,
    state: Mutex<BrokerState>,
    notify: Notify,
}

impl InMemoryBroker {
    pub fn new(settings: BrokerSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(BrokerState::default()),
            notify: Notify::new(),
        }
    }

    /// Requeue in-flight deliveries whose visibility timeout has expired.
    fn requeue_expired(state: &mut BrokerState, now: Instant) {
        let expired: Vec<Uuid> = state
            .in_flight
            .iter()
            .filter(|(_, flight)| flight.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(flight) = state.in_flight.remove(&id) {
                warn!(
                    "visibility timeout expired for task {}, redelivering (attempt {})",
                    id,
                    flight.attempt + 1
                );
                state.ready.push_back((flight.envelope, flight.attempt + 1));
            }
        }
    }
}

#[async_trait]
impl BrokerChannel for InMemoryBroker {
    async fn publish(&self, envelope: TaskEnvelope) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().await;
            if state.ready.len() >= self.settings.capacity {
                return Err(TransportError::QueueFull);
            }
            debug!("queued task {}", envelope.id);
            state.ready.push_back((envelope, 1));
        }

        // Notify outside the lock
        self.notify.notify_one();
        Ok(())
    }

    async fn consume(&self) -> Delivery {
        loop {
            let next_deadline = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                Self::requeue_expired(&mut state, now);

                if let Some((envelope, attempt)) = state.ready.pop_front() {
                    let delivery = Delivery {
                        envelope: envelope.clone(),
                        attempt,
                    };
                    state.in_flight.insert(
                        envelope.id,
                        InFlight {
                            envelope,
                            attempt,
                            deadline: now + self.settings.visibility_timeout,
                        },
                    );
                    return delivery;
                }

                // Nothing ready; the earliest in-flight deadline bounds the wait.
                state.in_flight.values().map(|f| f.deadline).min()
            };

            match next_deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = tokio::time::sleep_until(deadline.into()) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    async fn ack(&self, task_id: Uuid) {
        let mut state = self.state.lock().await;
        if state.in_flight.remove(&task_id).is_none() {
            debug!("ack for unknown or already-expired delivery {}", task_id);
        }
    }
}
