//! Structured object detection results.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// A single detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label, e.g. "person".
    pub name: String,
    /// Numeric class id.
    pub class: u32,
    /// Confidence score in [0, 1].
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// Outcome for one image inside a task result.
///
/// A successful item serializes as a bare detection list; an item-level
/// failure carries its error message. Item failures do not fail the
/// enclosing task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemOutcome {
    Detections(Vec<Detection>),
    Failed { error: String },
}

impl ItemOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ItemOutcome::Failed { .. })
    }

    pub fn detections(&self) -> Option<&[Detection]> {
        match self {
            ItemOutcome::Detections(found) => Some(found),
            ItemOutcome::Failed { .. } => None,
        }
    }
}
