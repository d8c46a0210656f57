//! Worker thread lifecycle through the supervisor, with the synthetic
//! pipeline and the built-in motion backend.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nvr_detect::streams::SyntheticPipeline;
use nvr_detect::{
    default_backends, BufferPool, DetectConfig, DetectionSupervisor, DeviceProfile, Dispatcher,
    MediaPipeline, MemoryCounters, MemoryDatabase, ModelCache, NvrDatabase, RecordingManager,
    StaticConfigSource, StreamConfigSource, StreamSettings, WorkerContext,
};

fn context(storage: &tempfile::TempDir, streams: Vec<StreamSettings>) -> Arc<WorkerContext> {
    let backends = Arc::new(default_backends());
    let db = Arc::new(MemoryDatabase::new()) as Arc<dyn NvrDatabase>;
    let pipeline = Arc::new(SyntheticPipeline::new(64, 64)) as Arc<dyn MediaPipeline>;
    let mut config = DetectConfig::default();
    config.startup_delay = Duration::from_secs(0);
    config.storage_root = storage.path().to_path_buf();
    Arc::new(WorkerContext {
        config,
        profile: DeviceProfile::standard(),
        cache: Arc::new(ModelCache::new(
            Arc::clone(&backends),
            8,
            50 * 1024 * 1024,
            32,
        )),
        pool: Arc::new(BufferPool::new(4, Arc::new(MemoryCounters::new()))),
        dispatcher: Arc::new(Dispatcher::new(Arc::clone(&backends), None)),
        recording: Arc::new(RecordingManager::new(
            db,
            Arc::clone(&pipeline),
            storage.path().to_path_buf(),
        )),
        streams: Arc::new(StaticConfigSource::new(streams)) as Arc<dyn StreamConfigSource>,
        pipeline,
        shutdown: Arc::new(AtomicBool::new(false)),
        started_at: Instant::now(),
    })
}

fn motion_stream(name: &str, hls_dir: &std::path::Path, enabled: bool) -> StreamSettings {
    StreamSettings {
        name: name.into(),
        detection_enabled: enabled,
        model: "motion".into(),
        threshold: 0.0,
        interval_secs: 1,
        hls_dir: hls_dir.to_path_buf(),
    }
}

#[test]
fn starts_only_enabled_streams_and_shuts_down() {
    let storage = tempfile::tempdir().unwrap();
    let hls = storage.path().join("hls");
    std::fs::create_dir_all(hls.join("cam1")).unwrap();
    std::fs::write(hls.join("cam1").join("seg0.ts"), b"x").unwrap();

    let ctx = context(
        &storage,
        vec![
            motion_stream("cam1", &hls.join("cam1"), true),
            motion_stream("cam2", &hls.join("cam2"), false),
        ],
    );
    let supervisor = DetectionSupervisor::new(ctx);
    assert_eq!(supervisor.start_all(), 1);
    assert_eq!(supervisor.running_workers(), vec!["cam1".to_string()]);

    // Double start of a live worker is refused.
    assert!(!supervisor.start_stream("cam1"));

    // Give the worker a moment to run at least one poll.
    std::thread::sleep(Duration::from_millis(400));

    supervisor.shutdown();
    assert!(supervisor.running_workers().is_empty());
    // Shutdown left the cache empty.
    assert_eq!(supervisor.context().cache.cached_count(), 0);
}

#[test]
fn stop_stream_joins_the_worker() {
    let storage = tempfile::tempdir().unwrap();
    let hls = storage.path().join("hls").join("cam1");
    std::fs::create_dir_all(&hls).unwrap();

    let ctx = context(&storage, vec![motion_stream("cam1", &hls, true)]);
    let supervisor = DetectionSupervisor::new(ctx);
    assert!(supervisor.start_stream("cam1"));
    std::thread::sleep(Duration::from_millis(100));
    supervisor.stop_stream("cam1");
    assert!(supervisor.running_workers().is_empty());
    // A stopped stream can be started again.
    assert!(supervisor.start_stream("cam1"));
    supervisor.shutdown();
}
