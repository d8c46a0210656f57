//! NVR detection core.
//!
//! This crate implements the detection pipeline of a network video
//! recorder: per-stream worker threads that watch segment directories, a
//! shared model cache with a large-model budget, a buffer pool bounding
//! per-cycle memory, a built-in motion engine, pluggable inference
//! backends, and detection-driven recording decisions persisted to SQLite.
//!
//! # Architecture
//!
//! ```text
//!  StreamConfigSource          MediaPipeline
//!         |                         |
//!         v                         v
//!  DetectionSupervisor --> StreamWorker (one thread per stream)
//!         |                    |      \
//!         |               CycleGate    SegmentPoller
//!         |                    |
//!         v                    v
//!     ModelCache ---------> Dispatcher --> BackendRuntime (cnn/realnet/
//!         |                    |            tflite/api/onvif/motion)
//!     BufferPool               v
//!                        RecordingManager --> NvrDatabase (sqlite)
//! ```
//!
//! The HTTP API, stream CRUD, and media decoding live outside this crate
//! and plug in through the `streams` traits.

pub mod backend;
pub mod cache;
pub mod config;
pub mod db;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod memory;
pub mod model;
pub mod motion;
pub mod orchestrator;
pub mod pool;
pub mod recording;
pub mod result;
pub mod streams;

pub use backend::{BackendRuntime, BackendSet, Query, RawDetection, StubBackend};
pub use cache::ModelCache;
pub use config::{CacheSettings, DetectConfig, PolicySettings, PoolSettings};
pub use db::{MemoryDatabase, NvrDatabase, SqliteDatabase};
pub use device::{DeviceClass, DeviceProfile};
pub use dispatch::Dispatcher;
pub use error::{DetectError, Result};
pub use frame::{Frame, PixelFormat};
pub use memory::MemoryCounters;
pub use model::{BackendKind, BackendState, ModelHandle, API_DETECTION_SENTINEL};
pub use motion::{MotionConfig, MotionEngine, MotionOutcome, MotionRuntime};
pub use orchestrator::{
    resolve_model_path, CycleGate, DetectionSupervisor, StreamWorker, WorkerContext,
};
pub use pool::{BufferPool, PooledBuffer};
pub use recording::{RecordingManager, MAX_DETECTION_AGE_SECS};
pub use result::{Detection, DetectionResult, MAX_DETECTIONS};
pub use streams::{MediaPipeline, StaticConfigSource, StreamConfigSource, StreamSettings};

/// Current unix time in seconds.
pub fn now_s() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Register the default backend set: the motion engine plus whatever stub
/// coverage the caller wants replaced by real runtimes.
pub fn default_backends() -> BackendSet {
    let mut set = BackendSet::new();
    set.register(std::sync::Arc::new(MotionRuntime::default()));
    set
}
