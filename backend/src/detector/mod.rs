//! Object detection abstraction layer.
//!
//! The model itself runs behind an HTTP endpoint; the `Detector` trait keeps
//! the worker pool decoupled from how detections are produced. Each worker
//! pool shares one detector handle constructed at startup, so whatever the
//! implementation loads (connections, model weights) is loaded once and
//! reused across tasks.

mod http;

pub use http::HttpDetector;

use async_trait::async_trait;
use visionq_common::{Detection, ImageItem};

/// Detection failures at the batch level. Item-level failures travel inside
/// [`ItemDetections`] instead and do not fail the batch.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Detector request failed: {0}")]
    RequestFailed(String),
    #[error("Detector returned an invalid response: {0}")]
    InvalidResponse(String),
    #[error("Detector error: {0}")]
    Backend(String),
}

/// Per-image result of a batch detection call.
#[derive(Debug, Clone)]
pub struct ItemDetections {
    pub name: String,
    pub outcome: Result<Vec<Detection>, String>,
}

/// Primary trait for detection backends.
///
/// One call covers a whole envelope. Implementations that cannot batch may
/// loop internally, but per-item outcomes must be reported independently.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, items: &[ImageItem]) -> Result<Vec<ItemDetections>, DetectorError>;
}
