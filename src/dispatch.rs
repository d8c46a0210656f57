//! Detection dispatch: one entry point from a frame to a normalized result.
//!
//! The dispatcher is pure routing. It picks the runtime for the handle's
//! kind, resolves the remote-API sentinel against global configuration, and
//! normalizes whatever the backend returned: confidences clamped to
//! `[0, 1]`, boxes clamped into the frame, labels capped, and the result
//! capped at [`MAX_DETECTIONS`].

use std::sync::Arc;

use crate::backend::{BackendSet, Query, RawDetection};
use crate::error::{DetectError, Result};
use crate::frame::Frame;
use crate::model::{BackendKind, ModelHandle, API_DETECTION_SENTINEL};
use crate::result::{Detection, DetectionResult, MAX_DETECTIONS, MAX_LABEL_LEN};

pub struct Dispatcher {
    backends: Arc<BackendSet>,
    api_detection_url: Option<String>,
}

impl Dispatcher {
    pub fn new(backends: Arc<BackendSet>, api_detection_url: Option<String>) -> Self {
        Self {
            backends,
            api_detection_url,
        }
    }

    /// Run one frame through the handle's backend. `threshold` is the
    /// effective per-cycle confidence floor (device policy already applied).
    pub fn detect(&self, handle: &ModelHandle, frame: &Frame, threshold: f32) -> Result<DetectionResult> {
        let runtime = self.backends.get(handle.kind)?;
        let endpoint = self.resolve_endpoint(handle)?;
        let query = Query {
            threshold,
            endpoint: endpoint.as_deref(),
        };
        let raw = runtime.infer(&handle.state, frame, &query)?;
        Ok(normalize(raw, threshold))
    }

    /// Remote backends get their endpoint resolved here: the sentinel maps
    /// to the configured URL, a literal URL passes through, local kinds get
    /// none.
    fn resolve_endpoint(&self, handle: &ModelHandle) -> Result<Option<String>> {
        if handle.kind != BackendKind::RemoteApi {
            return Ok(None);
        }
        if handle.path == API_DETECTION_SENTINEL {
            match &self.api_detection_url {
                Some(url) => Ok(Some(url.clone())),
                None => Err(DetectError::DetectionFailed(
                    "api-detection configured but no detection endpoint set".into(),
                )),
            }
        } else {
            Ok(Some(handle.path.clone()))
        }
    }
}

/// Clamp and cap backend output into a [`DetectionResult`]. Detections
/// under the threshold are dropped here regardless of backend filtering.
pub fn normalize(raw: Vec<RawDetection>, threshold: f32) -> DetectionResult {
    let mut detections = Vec::new();
    for r in raw {
        if !r.confidence.is_finite() || r.confidence < threshold {
            continue;
        }
        let x = r.x.clamp(0.0, 1.0);
        let y = r.y.clamp(0.0, 1.0);
        let width = r.width.clamp(0.0, 1.0 - x);
        let height = r.height.clamp(0.0, 1.0 - y);
        let mut label = r.label;
        if label.len() > MAX_LABEL_LEN {
            let mut cut = MAX_LABEL_LEN;
            while cut > 0 && !label.is_char_boundary(cut) {
                cut -= 1;
            }
            label.truncate(cut);
        }
        detections.push(Detection {
            label,
            confidence: r.confidence.clamp(0.0, 1.0),
            x,
            y,
            width,
            height,
            track_id: -1,
            zone: String::new(),
        });
        if detections.len() >= MAX_DETECTIONS {
            log::warn!("dispatch: result truncated at {} detections", MAX_DETECTIONS);
            break;
        }
    }
    DetectionResult { detections }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendRuntime, StubBackend};
    use crate::frame::PixelFormat;
    use crate::model::BackendState;

    fn frame() -> Frame {
        Frame::new(vec![0; 4], 2, 2, PixelFormat::Gray8, 0).unwrap()
    }

    fn handle(kind: BackendKind, path: &str, state: BackendState) -> ModelHandle {
        ModelHandle {
            kind,
            path: path.to_string(),
            threshold: 0.5,
            file_size: 0,
            is_large: false,
            state,
        }
    }

    fn raw(label: &str, confidence: f32) -> RawDetection {
        RawDetection {
            label: label.to_string(),
            confidence,
            x: 0.0,
            y: 0.0,
            width: 0.5,
            height: 0.5,
        }
    }

    #[test]
    fn normalization_clamps_everything() {
        let out = normalize(
            vec![RawDetection {
                label: "x".repeat(100),
                confidence: 1.7,
                x: 0.8,
                y: -0.2,
                width: 0.9,
                height: 1.5,
            }],
            0.0,
        );
        let d = &out.detections[0];
        assert_eq!(d.label.len(), MAX_LABEL_LEN);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.x, 0.8);
        assert_eq!(d.y, 0.0);
        assert!((d.width - 0.2).abs() < 1e-6);
        assert_eq!(d.height, 1.0);
        assert_eq!(d.track_id, -1);
    }

    #[test]
    fn normalization_caps_count_and_filters_threshold() {
        let mut many: Vec<RawDetection> = (0..40).map(|_| raw("person", 0.9)).collect();
        many.push(raw("ghost", 0.1));
        let out = normalize(many, 0.5);
        assert_eq!(out.len(), MAX_DETECTIONS);
        assert!(out.detections.iter().all(|d| d.label == "person"));
    }

    #[test]
    fn sentinel_resolves_to_configured_url() {
        let remote = Arc::new(StubBackend::new(BackendKind::RemoteApi));
        let mut set = BackendSet::new();
        set.register(remote.clone() as Arc<dyn crate::backend::BackendRuntime>);
        let set = Arc::new(set);

        let state = remote.load(API_DETECTION_SENTINEL, 0.5).unwrap();
        let h = handle(BackendKind::RemoteApi, API_DETECTION_SENTINEL, state);

        let without = Dispatcher::new(Arc::clone(&set), None);
        assert!(matches!(
            without.detect(&h, &frame(), 0.5),
            Err(DetectError::DetectionFailed(_))
        ));

        let with = Dispatcher::new(set, Some("http://127.0.0.1:9000/api/detect".into()));
        assert!(with.detect(&h, &frame(), 0.5).is_ok());
    }

    #[test]
    fn unregistered_kind_fails_as_load_error() {
        let set = Arc::new(BackendSet::new());
        let d = Dispatcher::new(set, None);
        let stub = StubBackend::new(BackendKind::Cnn);
        let state = stub.load("/m/a.sod", 0.5).unwrap();
        let h = handle(BackendKind::Cnn, "/m/a.sod", state);
        assert!(matches!(
            d.detect(&h, &frame(), 0.5),
            Err(DetectError::ModelLoadFailed(_))
        ));
    }
}
