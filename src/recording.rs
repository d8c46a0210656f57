//! Detection-driven recording decisions.
//!
//! A recording runs while anything above the stream's threshold was seen in
//! the last [`MAX_DETECTION_AGE_SECS`] seconds. The window is evaluated
//! against the database, not in-process state, so the hysteresis survives
//! worker restarts; it also means every cycle's result must be stored
//! before the decision is made.

use std::path::PathBuf;
use std::sync::Arc;

use crate::db::NvrDatabase;
use crate::error::Result;
use crate::result::DetectionResult;
use crate::streams::{MediaPipeline, StreamSettings};

/// How long a detection keeps a recording alive.
pub const MAX_DETECTION_AGE_SECS: i64 = 30;

pub struct RecordingManager {
    db: Arc<dyn NvrDatabase>,
    pipeline: Arc<dyn MediaPipeline>,
    storage_root: PathBuf,
    max_detection_age: i64,
}

impl RecordingManager {
    pub fn new(
        db: Arc<dyn NvrDatabase>,
        pipeline: Arc<dyn MediaPipeline>,
        storage_root: PathBuf,
    ) -> Self {
        Self {
            db,
            pipeline,
            storage_root,
            max_detection_age: MAX_DETECTION_AGE_SECS,
        }
    }

    pub fn with_window(mut self, max_detection_age: i64) -> Self {
        self.max_detection_age = max_detection_age;
        self
    }

    /// Persist one cycle's result and reconcile recording state. `at` is
    /// the frame time in unix seconds; `threshold` is the stream's
    /// effective confidence floor.
    pub fn process(
        &self,
        settings: &StreamSettings,
        at: i64,
        threshold: f32,
        result: &DetectionResult,
    ) -> Result<()> {
        if !settings.detection_enabled {
            return Ok(());
        }
        let stream = settings.name.as_str();
        self.db.store_result(stream, at, result)?;

        let triggered_now = result.detections.iter().any(|d| d.confidence >= threshold);
        let should_record = triggered_now || {
            self.db
                .recent_detections(stream, at, self.max_detection_age)?
                .iter()
                .any(|d| d.confidence >= threshold)
        };
        let active = self.db.recording_active(stream)?;

        if should_record && !active {
            let dir = self.storage_root.join(stream).join("recordings");
            std::fs::create_dir_all(&dir).map_err(|e| {
                crate::error::DetectError::DetectionFailed(format!(
                    "recording dir {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            let output = dir.join(format!("{}_{}.mp4", stream, at));
            log::info!("recording: starting for {} -> {}", stream, output.display());
            self.pipeline.start_recording(stream, &output)?;
            self.db
                .set_recording_active(stream, true, Some(&output.to_string_lossy()))?;
        } else if !should_record && active {
            log::info!("recording: stopping for {}", stream);
            self.pipeline.stop_recording(stream)?;
            self.db.set_recording_active(stream, false, None)?;
        }
        Ok(())
    }
}
