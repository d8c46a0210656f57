//! Backend runtime capabilities.
//!
//! Each inference engine (SOD CNN, RealNet, TFLite, remote HTTP, ONVIF,
//! motion) plugs in as a [`BackendRuntime`]: load a model into opaque state,
//! run one frame, release the state. The [`BackendSet`] is the closed
//! registry the cache and dispatcher resolve kinds against.
//!
//! Concrete neural inference lives outside this crate; [`StubBackend`]
//! exists for wiring, tests, and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{DetectError, Result};
use crate::frame::Frame;
use crate::model::{BackendKind, BackendState};

/// Backend-native detection, before normalization. Coordinates are already
/// relative to the analyzed frame but not yet clamped or capped.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub label: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Per-call parameters the dispatcher resolves before routing.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    pub threshold: f32,
    /// Resolved endpoint for remote backends; `None` for local ones.
    pub endpoint: Option<&'a str>,
}

pub trait BackendRuntime: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Load the model at `path` into backend-private state.
    fn load(&self, path: &str, threshold: f32) -> Result<BackendState>;

    /// Run one frame against previously loaded state.
    fn infer(&self, state: &BackendState, frame: &Frame, query: &Query) -> Result<Vec<RawDetection>>;

    /// Release backend-private state. Skipped entirely during process
    /// shutdown, so implementations must not rely on it for correctness of
    /// on-disk data.
    fn unload(&self, state: &BackendState);
}

/// Closed registry of runtimes, built once at startup.
#[derive(Default)]
pub struct BackendSet {
    runtimes: HashMap<BackendKind, Arc<dyn BackendRuntime>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, runtime: Arc<dyn BackendRuntime>) {
        let kind = runtime.kind();
        if self.runtimes.insert(kind, runtime).is_some() {
            log::warn!("backend: replaced runtime for kind {}", kind.label());
        }
    }

    pub fn get(&self, kind: BackendKind) -> Result<&Arc<dyn BackendRuntime>> {
        self.runtimes.get(&kind).ok_or_else(|| {
            DetectError::ModelLoadFailed(format!("no runtime registered for {}", kind.label()))
        })
    }

    pub fn kinds(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.runtimes.keys().copied()
    }
}

/// Deterministic stand-in runtime. Returns a fixed set of detections per
/// frame and counts lifecycle calls, which is what the tests care about.
pub struct StubBackend {
    kind: BackendKind,
    detections: Mutex<Vec<RawDetection>>,
    fail_load: AtomicBool,
    fail_infer: AtomicBool,
    pub loads: AtomicUsize,
    pub infers: AtomicUsize,
    pub unloads: AtomicUsize,
}

struct StubState {
    path: String,
}

impl StubBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            detections: Mutex::new(Vec::new()),
            fail_load: AtomicBool::new(false),
            fail_infer: AtomicBool::new(false),
            loads: AtomicUsize::new(0),
            infers: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
        }
    }

    /// Set the detections every subsequent infer call returns.
    pub fn respond_with(&self, detections: Vec<RawDetection>) {
        if let Ok(mut g) = self.detections.lock() {
            *g = detections;
        }
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_infer(&self, fail: bool) {
        self.fail_infer.store(fail, Ordering::SeqCst);
    }
}

impl BackendRuntime for StubBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn load(&self, path: &str, _threshold: f32) -> Result<BackendState> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(DetectError::ModelLoadFailed(format!(
                "stub refusing to load {}",
                path
            )));
        }
        Ok(BackendState::new(StubState {
            path: path.to_string(),
        }))
    }

    fn infer(&self, state: &BackendState, _frame: &Frame, query: &Query) -> Result<Vec<RawDetection>> {
        self.infers.fetch_add(1, Ordering::SeqCst);
        if self.fail_infer.load(Ordering::SeqCst) {
            let path = state
                .downcast_ref::<StubState>()
                .map(|s| s.path.as_str())
                .unwrap_or("?");
            return Err(DetectError::DetectionFailed(format!(
                "stub inference failure for {}",
                path
            )));
        }
        let all = match self.detections.lock() {
            Ok(g) => g.clone(),
            Err(p) => p.into_inner().clone(),
        };
        Ok(all
            .into_iter()
            .filter(|d| d.confidence >= query.threshold)
            .collect())
    }

    fn unload(&self, _state: &BackendState) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn frame() -> Frame {
        Frame::new(vec![0; 4], 2, 2, PixelFormat::Gray8, 0).unwrap()
    }

    #[test]
    fn registry_resolves_registered_kinds_only() {
        let mut set = BackendSet::new();
        set.register(Arc::new(StubBackend::new(BackendKind::Cnn)));
        assert!(set.get(BackendKind::Cnn).is_ok());
        assert!(matches!(
            set.get(BackendKind::TfLite),
            Err(DetectError::ModelLoadFailed(_))
        ));
    }

    #[test]
    fn stub_filters_by_query_threshold() {
        let stub = StubBackend::new(BackendKind::Cnn);
        stub.respond_with(vec![
            RawDetection {
                label: "person".into(),
                confidence: 0.9,
                x: 0.1,
                y: 0.1,
                width: 0.2,
                height: 0.4,
            },
            RawDetection {
                label: "cat".into(),
                confidence: 0.2,
                x: 0.5,
                y: 0.5,
                width: 0.1,
                height: 0.1,
            },
        ]);
        let state = stub.load("/m/a.sod", 0.3).unwrap();
        let out = stub
            .infer(
                &state,
                &frame(),
                &Query {
                    threshold: 0.5,
                    endpoint: None,
                },
            )
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "person");
    }

    #[test]
    fn stub_counts_lifecycle_calls() {
        let stub = StubBackend::new(BackendKind::Cnn);
        let state = stub.load("/m/a.sod", 0.3).unwrap();
        stub.unload(&state);
        assert_eq!(stub.loads.load(Ordering::SeqCst), 1);
        assert_eq!(stub.unloads.load(Ordering::SeqCst), 1);
    }
}
