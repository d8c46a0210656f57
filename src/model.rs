//! Model identity: backend classification and loaded-model handles.
//!
//! A stream names its detector by a path-like string; classification turns
//! that string into a closed [`BackendKind`] once, at load time. Everything
//! downstream matches on the enum instead of re-parsing strings.

use std::any::Any;

use crate::error::{DetectError, Result};

/// Remote-API sentinel: a stream configured with this literal uses the
/// globally configured endpoint, resolved at query time.
pub const API_DETECTION_SENTINEL: &str = "api-detection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// SOD CNN model (`*.sod`).
    Cnn,
    /// SOD RealNet cascade (`*.realnet.sod`), grayscale input.
    RealNet,
    /// TensorFlow Lite model (`*.tflite`).
    TfLite,
    /// HTTP detection endpoint (`http(s)://...` or the sentinel).
    RemoteApi,
    /// Camera-side analytics pulled over ONVIF events.
    Onvif,
    /// Built-in background-subtraction motion engine.
    Motion,
}

impl BackendKind {
    /// Classify a model path. Suffix rules are checked most-specific first;
    /// unknown strings are a load error, not a fallback.
    pub fn classify(path: &str) -> Result<BackendKind> {
        let kind = if path == "motion" {
            BackendKind::Motion
        } else if path == API_DETECTION_SENTINEL
            || path.starts_with("http://")
            || path.starts_with("https://")
        {
            BackendKind::RemoteApi
        } else if path.ends_with("onvif") {
            BackendKind::Onvif
        } else if path.ends_with(".realnet.sod") {
            BackendKind::RealNet
        } else if path.ends_with(".sod") {
            BackendKind::Cnn
        } else if path.ends_with(".tflite") {
            BackendKind::TfLite
        } else {
            return Err(DetectError::ModelLoadFailed(format!(
                "unrecognized model type: {}",
                path
            )));
        };
        Ok(kind)
    }

    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Cnn => "cnn",
            BackendKind::RealNet => "realnet",
            BackendKind::TfLite => "tflite",
            BackendKind::RemoteApi => "api",
            BackendKind::Onvif => "onvif",
            BackendKind::Motion => "motion",
        }
    }

    /// RealNet cascades and the motion engine run on luminance only.
    pub fn wants_grayscale(self) -> bool {
        matches!(self, BackendKind::RealNet | BackendKind::Motion)
    }

    /// Kinds backed by a model file on disk (size-checked, large-capped).
    pub fn is_file_backed(self) -> bool {
        matches!(
            self,
            BackendKind::Cnn | BackendKind::RealNet | BackendKind::TfLite
        )
    }

    /// Per-kind confidence floor applied when a stream leaves the threshold
    /// unset or out of range. RealNet scores are cascade sums, not
    /// probabilities, hence the scale difference.
    pub fn default_threshold(self) -> f32 {
        match self {
            BackendKind::RealNet => 5.0,
            BackendKind::Cnn => 0.3,
            _ => 0.5,
        }
    }
}

/// Opaque per-model state produced by a backend's `load` and handed back on
/// every `infer`. The cache and dispatcher never look inside.
pub struct BackendState(Box<dyn Any + Send + Sync>);

impl BackendState {
    pub fn new<T: Any + Send + Sync>(state: T) -> Self {
        Self(Box::new(state))
    }

    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl std::fmt::Debug for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BackendState(..)")
    }
}

/// A loaded model. Shared via `Arc`; the cache deduplicates by `path` and
/// distinguishes handles by pointer identity, never by field comparison.
#[derive(Debug)]
pub struct ModelHandle {
    pub kind: BackendKind,
    pub path: String,
    pub threshold: f32,
    /// File size in bytes for file-backed kinds, 0 otherwise.
    pub file_size: u64,
    /// Large models bypass the shared table and count against a hard cap.
    pub is_large: bool,
    pub state: BackendState,
}
