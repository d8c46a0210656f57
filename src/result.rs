//! Normalized detection results.

use serde::{Deserialize, Serialize};

/// Upper bound on detections kept from a single cycle.
pub const MAX_DETECTIONS: usize = 20;
/// Labels longer than this are truncated during normalization.
pub const MAX_LABEL_LEN: usize = 63;

/// One detected object. Coordinates are normalized to `[0, 1]` relative to
/// the frame that was analyzed, so they survive downscaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Tracker-assigned id, `-1` when no tracker is attached.
    pub track_id: i32,
    /// Zone the detection fell in, empty when zones are not configured.
    pub zone: String,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            track_id: -1,
            zone: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Highest confidence in the result, 0.0 when empty.
    pub fn top_confidence(&self) -> f32 {
        self.detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0, f32::max)
    }
}
