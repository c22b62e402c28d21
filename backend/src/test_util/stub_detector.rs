//! Scriptable detector used by unit and integration tests.

use std::time::Duration;

use async_trait::async_trait;
use visionq_common::{BoundingBox, Detection, ImageItem};

use crate::detector::{Detector, DetectorError, ItemDetections};

/// Canned behavior for [`StubDetector`].
#[derive(Debug, Clone)]
pub enum StubMode {
    /// Return one sample detection for every item.
    Succeed,
    /// Fail the whole batch.
    FailBatch(String),
    /// Succeed, but report an item-level error for names containing the
    /// marker.
    FailItemsMatching(String),
    /// Sleep before answering, then succeed.
    Delay(Duration),
}

pub struct StubDetector {
    mode: StubMode,
}

impl StubDetector {
    pub fn new(mode: StubMode) -> Self {
        Self { mode }
    }

    /// A plausible single detection in the model server's shape.
    pub fn sample_detection() -> Detection {
        Detection {
            name: "person".to_string(),
            class: 0,
            confidence: 0.87,
            bbox: BoundingBox {
                x1: 10.0,
                y1: 20.0,
                x2: 110.0,
                y2: 220.0,
            },
        }
    }
}

#[async_trait]
impl Detector for StubDetector {
    async fn detect(&self, items: &[ImageItem]) -> Result<Vec<ItemDetections>, DetectorError> {
        match &self.mode {
            StubMode::FailBatch(msg) => return Err(DetectorError::Backend(msg.clone())),
            StubMode::Delay(delay) => tokio::time::sleep(*delay).await,
            _ => {}
        }

        Ok(items
            .iter()
            .map(|item| {
                let failed = matches!(
                    &self.mode,
                    StubMode::FailItemsMatching(marker) if item.name.contains(marker.as_str())
                );
                ItemDetections {
                    name: item.name.clone(),
                    outcome: if failed {
                        Err("inference failed for this image".to_string())
                    } else {
                        Ok(vec![Self::sample_detection()])
                    },
                }
            })
            .collect())
    }
}
