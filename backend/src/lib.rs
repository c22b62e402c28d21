pub mod broker;
pub mod config;
pub mod detector;
pub mod error;
pub mod routes;
pub mod store;
pub mod test_util;
pub mod validate;
pub mod worker;

pub use config::Config;
pub use error::ApiError;
pub use worker::{WorkerPool, WorkerSettings};

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::broker::BrokerChannel;
use crate::store::ResultStore;

/// Shared application state.
///
/// The gateway only ever touches the broker (publish) and the result store
/// (read, initial create); it never talks to a worker directly.
pub struct AppState {
    pub config: Config,
    pub broker: Arc<dyn BrokerChannel>,
    pub results: Arc<dyn ResultStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        broker: Arc<dyn BrokerChannel>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            config,
            broker,
            results,
        }
    }
}

/// Build the full HTTP router for the service.
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.upload.max_request_bytes;

    Router::new()
        .merge(routes::health::router())
        .merge(routes::tasks::router(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
