//! VisionQ backend - async object detection over HTTP.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use visionq_backend::broker::{BrokerChannel, BrokerSettings, InMemoryBroker};
use visionq_backend::detector::HttpDetector;
use visionq_backend::store::{InMemoryResultStore, ResultStore};
use visionq_backend::{app, AppState, Config, WorkerPool, WorkerSettings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!("Starting VisionQ backend");

    // Shared pipeline components. The broker and the result store are the
    // only state shared between the gateway and the workers.
    let broker: Arc<dyn BrokerChannel> = Arc::new(InMemoryBroker::new(BrokerSettings {
        capacity: config.queue.capacity,
        visibility_timeout: config.queue.visibility_timeout(),
    }));
    let results: Arc<dyn ResultStore> = Arc::new(InMemoryResultStore::new());

    let detector = Arc::new(HttpDetector::new(
        &config.detector.endpoint,
        config.detector.confidence,
        config.detector.request_timeout(),
    ));
    tracing::info!("Using detector endpoint {}", config.detector.endpoint);

    // Spawn the worker pool
    let pool = WorkerPool::spawn(
        config.worker.count,
        broker.clone(),
        results.clone(),
        detector,
        WorkerSettings {
            task_timeout: config.worker.task_timeout(),
            max_deliveries: config.queue.max_deliveries,
        },
    );

    let state = Arc::new(AppState::new(config, broker, results));
    let router = app(state.clone());

    // Start server
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    pool.shutdown_and_join().await;
    Ok(())
}
