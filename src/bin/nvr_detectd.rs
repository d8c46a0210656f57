//! nvr-detectd - detection daemon
//!
//! Standalone runner for the detection core:
//! 1. Loads configuration (file + env overrides)
//! 2. Opens the detection database
//! 3. Registers backend runtimes (motion built in; neural backends are
//!    stubbed unless linked by an embedding application)
//! 4. Spawns one detection worker per enabled stream
//! 5. Runs until SIGINT/SIGTERM, then tears down with backend unload
//!    skipped per shutdown policy

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nvr_detect::{
    default_backends, BackendKind, BufferPool, DetectConfig, DetectionSupervisor, Dispatcher,
    DeviceProfile, MediaPipeline, MemoryCounters, ModelCache, NvrDatabase, RecordingManager,
    SqliteDatabase, StaticConfigSource, StreamConfigSource, StubBackend, WorkerContext,
};
use nvr_detect::streams::SyntheticPipeline;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, env = "NVR_DETECT_CONFIG")]
    config: Option<PathBuf>,

    /// Probe the device profile instead of assuming a standard host.
    #[arg(long, default_value_t = true)]
    detect_device: bool,

    /// Evict cache entries idle longer than this many seconds.
    #[arg(long, default_value_t = 600)]
    cache_idle_secs: u64,

    /// Prune stored detections older than this many seconds.
    #[arg(long, default_value_t = 60 * 60 * 24 * 7)]
    detection_retention_secs: i64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => DetectConfig::load_from(path)?,
        None => DetectConfig::load()?,
    };
    if config.streams.is_empty() {
        return Err(anyhow!("no streams configured, nothing to do"));
    }

    let profile = if args.detect_device {
        DeviceProfile::detect()
    } else {
        DeviceProfile::standard()
    };

    let mut backends = default_backends();
    for kind in [
        BackendKind::Cnn,
        BackendKind::RealNet,
        BackendKind::TfLite,
        BackendKind::RemoteApi,
        BackendKind::Onvif,
    ] {
        backends.register(Arc::new(StubBackend::new(kind)));
    }
    let backends = Arc::new(backends);

    let db: Arc<dyn NvrDatabase> =
        Arc::new(SqliteDatabase::open(std::path::Path::new(&config.db_path))?);
    let pipeline: Arc<dyn MediaPipeline> = Arc::new(SyntheticPipeline::default());
    let streams: Arc<dyn StreamConfigSource> =
        Arc::new(StaticConfigSource::new(config.streams.clone()));

    let counters = Arc::new(MemoryCounters::new());
    let pool = Arc::new(BufferPool::new(config.pool.slots, Arc::clone(&counters)));
    let cache = Arc::new(ModelCache::new(
        Arc::clone(&backends),
        config.cache.entries,
        config.cache.large_model_bytes,
        config.cache.large_model_cap,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&backends),
        config.api_detection_url.clone(),
    ));
    let recording = Arc::new(RecordingManager::new(
        Arc::clone(&db),
        Arc::clone(&pipeline),
        config.storage_root.clone(),
    ));

    let shutdown = Arc::new(AtomicBool::new(false));
    let ctrlc_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        ctrlc_flag.store(true, Ordering::SeqCst);
    })?;

    let ctx = Arc::new(WorkerContext {
        config,
        profile,
        cache: Arc::clone(&cache),
        pool: Arc::clone(&pool),
        dispatcher,
        recording,
        streams,
        pipeline,
        shutdown: Arc::clone(&shutdown),
        started_at: Instant::now(),
    });
    let supervisor = DetectionSupervisor::new(ctx);
    let started = supervisor.start_all();
    log::info!("nvr-detectd running with {} stream worker(s)", started);

    let mut last_maintenance = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
        if last_maintenance.elapsed() >= Duration::from_secs(60) {
            cache.evict_idle(Duration::from_secs(args.cache_idle_secs));
            match db.prune_detections(nvr_detect::now_s(), args.detection_retention_secs) {
                Ok(0) => {}
                Ok(n) => log::info!("pruned {} old detection rows", n),
                Err(e) => log::error!("detection prune failed: {}", e),
            }
            log::info!(
                "status: workers={} cached_models={} large_models={} pool_bytes={}",
                supervisor.running_workers().len(),
                cache.cached_count(),
                cache.large_in_use(),
                counters.current_bytes()
            );
            last_maintenance = Instant::now();
        }
    }

    supervisor.shutdown();
    log::info!("nvr-detectd exited cleanly");
    Ok(())
}
