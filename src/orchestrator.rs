//! Per-stream detection workers and the supervisor that owns them.
//!
//! Each enabled stream gets one worker thread that polls the stream's
//! segment directory, runs a detection cycle when a new segment lands and
//! the stream's interval is due, and feeds results to the recording
//! decision. Workers are deliberately boring: every cycle re-reads stream
//! settings, failures degrade to logged skips, and a watchdog clears a
//! cycle flag stuck for more than a minute so one wedged inference can
//! never silence a stream forever.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cache::ModelCache;
use crate::config::DetectConfig;
use crate::device::{self, DeviceProfile};
use crate::dispatch::Dispatcher;
use crate::error::{DetectError, Result};
use crate::frame::Frame;
use crate::model::{BackendKind, ModelHandle};
use crate::pool::BufferPool;
use crate::recording::RecordingManager;
use crate::streams::{MediaPipeline, StreamConfigSource, StreamSettings};

/// A cycle stuck in flight longer than this is assumed dead.
const STUCK_CYCLE_TIMEOUT: Duration = Duration::from_secs(60);
const MODEL_LOAD_MAX_RETRIES: u32 = 5;
const MODEL_LOAD_RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// Repeated warnings about the same stalled upstream are spaced this far.
const WARNING_INTERVAL: Duration = Duration::from_secs(60);
/// Missing-directory failures before the worker creates the directory.
const MKDIR_AFTER_FAILURES: u32 = 10;

/// Fallback locations scanned when a model path does not exist as given.
const ALTERNATE_MODEL_DIRS: &[&str] = &["/etc/nvr/models", "/usr/local/share/nvr/models"];

/// Single-flight gate for detection cycles. At most one cycle per stream is
/// in flight; a cycle only starts when the stream's interval has elapsed
/// since the last finished one.
pub struct CycleGate {
    in_progress: AtomicBool,
    times: Mutex<GateTimes>,
    stuck_after: Duration,
}

#[derive(Default)]
struct GateTimes {
    started_at: Option<Instant>,
    last_finished: Option<Instant>,
}

impl CycleGate {
    pub fn new() -> Self {
        Self::with_timeout(STUCK_CYCLE_TIMEOUT)
    }

    pub fn with_timeout(stuck_after: Duration) -> Self {
        Self {
            in_progress: AtomicBool::new(false),
            times: Mutex::new(GateTimes::default()),
            stuck_after,
        }
    }

    /// Try to claim the next cycle at `now`. Returns false while a cycle is
    /// in flight or the interval has not elapsed.
    pub fn try_begin(&self, interval: Duration, now: Instant) -> bool {
        let mut times = self.lock_times();
        if self.in_progress.load(Ordering::SeqCst) {
            let stuck = times
                .started_at
                .is_some_and(|start| now.duration_since(start) > self.stuck_after);
            if stuck {
                log::warn!(
                    "gate: cycle stuck for over {:?}, resetting",
                    self.stuck_after
                );
                self.in_progress.store(false, Ordering::SeqCst);
                times.started_at = None;
            } else {
                return false;
            }
        }
        let due = times
            .last_finished
            .map_or(true, |last| now.duration_since(last) >= interval);
        if !due {
            return false;
        }
        self.in_progress.store(true, Ordering::SeqCst);
        times.started_at = Some(now);
        true
    }

    pub fn finish(&self, now: Instant) {
        let mut times = self.lock_times();
        self.in_progress.store(false, Ordering::SeqCst);
        times.started_at = None;
        times.last_finished = Some(now);
    }

    pub fn in_flight(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn lock_times(&self) -> std::sync::MutexGuard<'_, GateTimes> {
        match self.times.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }
}

impl Default for CycleGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a worker needs, shared across all workers.
pub struct WorkerContext {
    pub config: DetectConfig,
    pub profile: DeviceProfile,
    pub cache: Arc<ModelCache>,
    pub pool: Arc<BufferPool>,
    pub dispatcher: Arc<Dispatcher>,
    pub recording: Arc<RecordingManager>,
    pub streams: Arc<dyn StreamConfigSource>,
    pub pipeline: Arc<dyn MediaPipeline>,
    pub shutdown: Arc<AtomicBool>,
    pub started_at: Instant,
}

impl WorkerContext {
    fn in_startup_grace(&self) -> bool {
        self.started_at.elapsed() < self.config.startup_delay
    }
}

/// Outcome of one directory poll.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PollOutcome {
    NewSegment(PathBuf),
    Unchanged,
    Empty,
}

/// Watches one stream's segment directory. Knows about the legacy doubled
/// `hls/hls` layout and flips to whichever variant actually holds segments.
struct SegmentPoller {
    dir: PathBuf,
    last_processed: Option<PathBuf>,
    consecutive_failures: u32,
    last_warning: Option<Instant>,
}

impl SegmentPoller {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            last_processed: None,
            consecutive_failures: 0,
            last_warning: None,
        }
    }

    fn warn_limited(&mut self, now: Instant, msg: &str) {
        let due = self
            .last_warning
            .map_or(true, |last| now.duration_since(last) > WARNING_INTERVAL);
        if due {
            log::warn!("{}", msg);
            self.last_warning = Some(now);
        }
    }

    fn poll(&mut self, stream: &str, now: Instant) -> PollOutcome {
        // Prefer whichever directory variant actually has segments.
        if newest_segment(&self.dir).is_none() {
            if let Some(alt) = alternate_hls_dir(&self.dir) {
                if newest_segment(&alt).is_some() {
                    log::info!(
                        "[{}] segments found in alternate directory {}",
                        stream,
                        alt.display()
                    );
                    self.dir = alt;
                }
            }
        }

        if !self.dir.is_dir() {
            self.consecutive_failures += 1;
            self.warn_limited(
                now,
                &format!("[{}] segment directory missing: {}", stream, self.dir.display()),
            );
            if self.consecutive_failures > MKDIR_AFTER_FAILURES {
                match std::fs::create_dir_all(&self.dir) {
                    Ok(()) => {
                        log::info!("[{}] created segment directory {}", stream, self.dir.display());
                        self.consecutive_failures = 0;
                    }
                    Err(e) => {
                        log::error!(
                            "[{}] failed to create segment directory {}: {}",
                            stream,
                            self.dir.display(),
                            e
                        );
                    }
                }
            }
            return PollOutcome::Empty;
        }

        match newest_segment(&self.dir) {
            Some(segment) => {
                self.consecutive_failures = 0;
                if self.last_processed.as_deref() == Some(segment.as_path()) {
                    PollOutcome::Unchanged
                } else {
                    PollOutcome::NewSegment(segment)
                }
            }
            None => {
                self.consecutive_failures += 1;
                self.warn_limited(
                    now,
                    &format!("[{}] no segments in {}", stream, self.dir.display()),
                );
                PollOutcome::Empty
            }
        }
    }

    fn mark_processed(&mut self, segment: PathBuf) {
        self.last_processed = Some(segment);
    }
}

/// Newest `.ts`/`.m4s` file in `dir` by modification time.
fn newest_segment(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_segment = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "ts" || e == "m4s")
            .unwrap_or(false);
        if !is_segment {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let Ok(mtime) = meta.modified() else { continue };
        match &newest {
            Some((best, _)) if *best >= mtime => {}
            _ => newest = Some((mtime, path)),
        }
    }
    newest.map(|(_, path)| path)
}

/// The historic layout sometimes doubled the `hls` component. Produce the
/// other variant of the path, if there is one.
fn alternate_hls_dir(dir: &Path) -> Option<PathBuf> {
    let s = dir.to_string_lossy();
    if s.contains("/hls/hls/") {
        Some(PathBuf::from(s.replacen("/hls/hls/", "/hls/", 1)))
    } else if s.contains("/hls/") {
        Some(PathBuf::from(s.replacen("/hls/", "/hls/hls/", 1)))
    } else {
        None
    }
}

/// Resolve a model reference to something loadable: non-file kinds pass
/// through, existing paths pass through, otherwise the configured models
/// directory and the well-known fallbacks are scanned for the file name.
pub fn resolve_model_path(model: &str, models_dir: &Path) -> Result<String> {
    let kind = BackendKind::classify(model)?;
    if !kind.is_file_backed() {
        return Ok(model.to_string());
    }
    let given = Path::new(model);
    if given.is_file() {
        return Ok(model.to_string());
    }
    let Some(file_name) = given.file_name() else {
        return Err(DetectError::ModelLoadFailed(format!(
            "model path has no file name: {}",
            model
        )));
    };
    let mut candidates = vec![models_dir.join(file_name)];
    for dir in ALTERNATE_MODEL_DIRS {
        candidates.push(Path::new(dir).join(file_name));
    }
    for candidate in &candidates {
        if candidate.is_file() {
            log::info!(
                "model {} found at alternate location {}",
                model,
                candidate.display()
            );
            return Ok(candidate.to_string_lossy().into_owned());
        }
    }
    Err(DetectError::ModelLoadFailed(format!(
        "model not found at {} or any alternate location",
        model
    )))
}

/// One stream's worker state. The thread entry point drives this; tests
/// drive it directly.
pub struct StreamWorker {
    name: String,
    ctx: Arc<WorkerContext>,
    gate: CycleGate,
    poller: Option<SegmentPoller>,
    model: Option<Arc<ModelHandle>>,
    model_retries: u32,
    last_model_retry: Option<Instant>,
    consecutive_empty: u32,
    last_restart_warning: Option<Instant>,
}

impl StreamWorker {
    pub fn new(name: String, ctx: Arc<WorkerContext>) -> Self {
        Self {
            name,
            ctx,
            gate: CycleGate::new(),
            poller: None,
            model: None,
            model_retries: 0,
            last_model_retry: None,
            consecutive_empty: 0,
            last_restart_warning: None,
        }
    }

    /// Ensure the model named in `settings` is loaded, honoring the retry
    /// budget. Returns `None` when the model is (still) unavailable.
    fn ensure_model(&mut self, settings: &StreamSettings, now: Instant) -> Option<Arc<ModelHandle>> {
        if let Some(handle) = &self.model {
            if handle.path == settings.model
                || resolve_model_path(&settings.model, &self.ctx.config.models_dir)
                    .map(|p| p == handle.path)
                    .unwrap_or(false)
            {
                return Some(Arc::clone(handle));
            }
            // Model changed in config; drop the old one.
            let old = self.model.take();
            if let Some(old) = old {
                self.ctx.cache.release(&old);
            }
            self.model_retries = 0;
        }

        if self.model_retries >= MODEL_LOAD_MAX_RETRIES {
            return None;
        }
        let retry_due = self
            .last_model_retry
            .map_or(true, |last| now.duration_since(last) >= MODEL_LOAD_RETRY_INTERVAL);
        if !retry_due {
            return None;
        }
        self.last_model_retry = Some(now);

        let resolved = match resolve_model_path(&settings.model, &self.ctx.config.models_dir) {
            Ok(path) => path,
            Err(e) => {
                self.model_retries += 1;
                log::error!(
                    "[{}] model resolution failed ({}/{}): {}",
                    self.name,
                    self.model_retries,
                    MODEL_LOAD_MAX_RETRIES,
                    e
                );
                return None;
            }
        };
        match self.ctx.cache.load(&resolved, settings.threshold) {
            Ok(handle) => {
                log::info!("[{}] loaded {} model {}", self.name, handle.kind.label(), resolved);
                self.model_retries = 0;
                self.model = Some(Arc::clone(&handle));
                Some(handle)
            }
            Err(e) => {
                self.model_retries += 1;
                log::error!(
                    "[{}] model load failed ({}/{}): {}",
                    self.name,
                    self.model_retries,
                    MODEL_LOAD_MAX_RETRIES,
                    e
                );
                None
            }
        }
    }

    /// When polling keeps coming up empty and the pipeline says the input
    /// is down, kick it. The stop/pause/start sequencing lives inside
    /// `restart_input`; here we only rate-limit the kicks.
    fn maybe_restart_upstream(&mut self, now: Instant) {
        if self.ctx.pipeline.input_active(&self.name) {
            return;
        }
        let due = self
            .last_restart_warning
            .map_or(true, |last| now.duration_since(last) > WARNING_INTERVAL);
        if !due {
            return;
        }
        self.last_restart_warning = Some(now);
        log::warn!("[{}] upstream input inactive, restarting", self.name);
        if let Err(e) = self.ctx.pipeline.restart_input(&self.name) {
            log::error!("[{}] upstream restart failed: {}", self.name, e);
        }
    }

    /// Run one detection cycle against a fresh snapshot.
    fn run_cycle(&mut self, settings: &StreamSettings, handle: &Arc<ModelHandle>) -> Result<()> {
        let frame = self.ctx.pipeline.snapshot(&self.name)?;

        // Stage the raw frame through the pool so concurrent cycle memory
        // stays bounded; exhaustion backs off and skips this cycle.
        let mut staged = self.ctx.pool.acquire(frame.data.len())?;
        staged.bytes_mut()[..frame.data.len()].copy_from_slice(&frame.data);

        let threshold = device::effective_threshold(
            &self.ctx.config.policy,
            &self.ctx.profile,
            handle.kind,
            settings.threshold,
        );
        let factor = device::downscale_factor(
            &self.ctx.config.policy,
            &self.ctx.profile,
            handle.kind,
            device::available_memory_kb(),
        );

        let mut analyzed = Frame::new(
            staged.bytes()[..frame.data.len()].to_vec(),
            frame.width,
            frame.height,
            frame.format,
            frame.ts,
        )?;
        if handle.kind.wants_grayscale() {
            analyzed = analyzed.to_grayscale();
        }
        if factor > 1 {
            analyzed = analyzed.downscale(factor);
        }

        let outcome = self.ctx.dispatcher.detect(handle, &analyzed, threshold);
        self.ctx.pool.release(staged);
        let result = outcome?;

        if !result.is_empty() {
            log::info!(
                "[{}] {} detection(s), top confidence {:.2}",
                self.name,
                result.len(),
                result.top_confidence()
            );
        }
        self.ctx
            .recording
            .process(settings, frame.ts, threshold, &result)
    }

    /// One iteration of the worker loop. Returns false when the worker
    /// should stop.
    pub fn tick(&mut self) -> bool {
        if self.ctx.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        if self.ctx.in_startup_grace() {
            return true;
        }
        let Some(settings) = self.ctx.streams.stream_settings(&self.name) else {
            log::info!("[{}] stream removed, stopping worker", self.name);
            return false;
        };
        if !settings.detection_enabled {
            log::info!("[{}] detection disabled, stopping worker", self.name);
            return false;
        }

        let now = Instant::now();
        let Some(handle) = self.ensure_model(&settings, now) else {
            return true;
        };

        // ONVIF analytics are event-driven on the camera; no segments to
        // poll, cycles run on the interval alone.
        let segment = if handle.kind == BackendKind::Onvif {
            None
        } else {
            let poller = self
                .poller
                .get_or_insert_with(|| SegmentPoller::new(settings.hls_dir.clone()));
            match poller.poll(&self.name, now) {
                PollOutcome::NewSegment(segment) => {
                    self.consecutive_empty = 0;
                    Some(segment)
                }
                PollOutcome::Unchanged => {
                    self.consecutive_empty = 0;
                    return true;
                }
                PollOutcome::Empty => {
                    self.consecutive_empty += 1;
                    self.maybe_restart_upstream(now);
                    return true;
                }
            }
        };

        let interval = Duration::from_secs(settings.interval_secs);
        if !self.gate.try_begin(interval, now) {
            return true;
        }
        let outcome = self.run_cycle(&settings, &handle);
        self.gate.finish(Instant::now());
        match outcome {
            Ok(()) => {
                if let (Some(segment), Some(poller)) = (segment, self.poller.as_mut()) {
                    poller.mark_processed(segment);
                }
            }
            Err(DetectError::InputNotFound) => {
                self.consecutive_empty += 1;
            }
            Err(e) => {
                log::error!("[{}] detection cycle failed: {}", self.name, e);
            }
        }
        true
    }

    /// Poll cadence adapted to recent activity: tight while segments flow,
    /// relaxed after a long quiet spell.
    pub fn poll_delay(&self) -> Duration {
        if self.consecutive_empty > 20 {
            Duration::from_secs(1)
        } else if self.consecutive_empty < 5 {
            Duration::from_millis(250)
        } else {
            Duration::from_millis(500)
        }
    }

    fn teardown(&mut self) {
        if let Some(handle) = self.model.take() {
            self.ctx.cache.release(&handle);
        }
        log::info!("[{}] worker exiting", self.name);
    }
}

fn worker_thread(mut worker: StreamWorker, stop: Arc<AtomicBool>) {
    log::info!("worker thread started");
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        if !worker.tick() {
            break;
        }
        std::thread::sleep(worker.poll_delay());
    }
    worker.teardown();
}

struct WorkerHandle {
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// Owns one worker thread per enabled stream.
pub struct DetectionSupervisor {
    ctx: Arc<WorkerContext>,
    workers: Mutex<std::collections::HashMap<String, WorkerHandle>>,
}

impl DetectionSupervisor {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self {
            ctx,
            workers: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Start workers for every enabled stream the config source knows.
    pub fn start_all(&self) -> usize {
        let mut started = 0;
        for name in self.ctx.streams.stream_names() {
            let enabled = self
                .ctx
                .streams
                .stream_settings(&name)
                .map(|s| s.detection_enabled)
                .unwrap_or(false);
            if enabled && self.start_stream(&name) {
                started += 1;
            }
        }
        started
    }

    /// Start a worker for `name`; false if one is already running.
    pub fn start_stream(&self, name: &str) -> bool {
        let mut workers = self.lock_workers();
        if let Some(existing) = workers.get(name) {
            if !existing.join.is_finished() {
                return false;
            }
            workers.remove(name);
        }
        let stop = Arc::new(AtomicBool::new(false));
        let worker = StreamWorker::new(name.to_string(), Arc::clone(&self.ctx));
        let thread_stop = Arc::clone(&stop);
        let join = std::thread::Builder::new()
            .name(format!("detect-{}", name))
            .spawn(move || worker_thread(worker, thread_stop));
        match join {
            Ok(join) => {
                log::info!("supervisor: started worker for {}", name);
                workers.insert(name.to_string(), WorkerHandle { stop, join });
                true
            }
            Err(e) => {
                log::error!("supervisor: failed to spawn worker for {}: {}", name, e);
                false
            }
        }
    }

    pub fn stop_stream(&self, name: &str) {
        let handle = self.lock_workers().remove(name);
        if let Some(handle) = handle {
            handle.stop.store(true, Ordering::SeqCst);
            if handle.join.join().is_err() {
                log::error!("supervisor: worker for {} panicked", name);
            }
        }
    }

    pub fn running_workers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock_workers()
            .iter()
            .filter(|(_, h)| !h.join.is_finished())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Full shutdown: flag every worker, switch the cache into
    /// teardown-skip mode, join, and clear cache bookkeeping.
    pub fn shutdown(&self) {
        self.ctx.shutdown.store(true, Ordering::SeqCst);
        self.ctx.cache.begin_shutdown();
        let workers: Vec<(String, WorkerHandle)> = self.lock_workers().drain().collect();
        for (name, handle) in workers {
            handle.stop.store(true, Ordering::SeqCst);
            if handle.join.join().is_err() {
                log::error!("supervisor: worker for {} panicked during shutdown", name);
            }
        }
        self.ctx.cache.force_evict_all();
        self.ctx.pool.clear();
        log::info!("supervisor: shutdown complete");
    }

    fn lock_workers(
        &self,
    ) -> std::sync::MutexGuard<'_, std::collections::HashMap<String, WorkerHandle>> {
        match self.workers.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_enforces_single_flight_and_interval() {
        let gate = CycleGate::new();
        let t0 = Instant::now();
        assert!(gate.try_begin(Duration::from_secs(10), t0));
        // In flight: second begin refused.
        assert!(!gate.try_begin(Duration::from_secs(10), t0));
        gate.finish(t0);
        // Interval not elapsed.
        assert!(!gate.try_begin(Duration::from_secs(10), t0 + Duration::from_secs(5)));
        // Interval elapsed.
        assert!(gate.try_begin(Duration::from_secs(10), t0 + Duration::from_secs(10)));
    }

    #[test]
    fn gate_resets_stuck_cycle() {
        let gate = CycleGate::with_timeout(Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(gate.try_begin(Duration::from_secs(10), t0));
        // 61 seconds later the flag is considered stuck and a new cycle may
        // claim the gate.
        assert!(gate.try_begin(Duration::from_secs(10), t0 + Duration::from_secs(61)));
        assert!(gate.in_flight());
    }

    #[test]
    fn alternate_dir_swaps_hls_component() {
        assert_eq!(
            alternate_hls_dir(Path::new("/tmp/nvr/hls/cam1")),
            Some(PathBuf::from("/tmp/nvr/hls/hls/cam1"))
        );
        assert_eq!(
            alternate_hls_dir(Path::new("/tmp/nvr/hls/hls/cam1")),
            Some(PathBuf::from("/tmp/nvr/hls/cam1"))
        );
        assert_eq!(alternate_hls_dir(Path::new("/tmp/nvr/cam1")), None);
    }

    #[test]
    fn newest_segment_picks_latest_mtime_and_ignores_others() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), b"x").unwrap();
        std::fs::write(dir.path().join("note.txt"), b"x").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("b.m4s"), b"x").unwrap();
        let newest = newest_segment(dir.path()).unwrap();
        assert_eq!(newest.file_name().unwrap(), "b.m4s");
    }

    #[test]
    fn poller_reports_new_then_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), b"x").unwrap();
        let mut poller = SegmentPoller::new(dir.path().to_path_buf());
        let now = Instant::now();
        let PollOutcome::NewSegment(seg) = poller.poll("cam1", now) else {
            panic!("expected new segment");
        };
        poller.mark_processed(seg);
        assert_eq!(poller.poll("cam1", now), PollOutcome::Unchanged);
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("b.ts"), b"x").unwrap();
        assert!(matches!(poller.poll("cam1", now), PollOutcome::NewSegment(_)));
    }

    #[test]
    fn resolve_model_path_scans_models_dir() {
        let models = tempfile::tempdir().unwrap();
        std::fs::write(models.path().join("face.sod"), b"m").unwrap();
        // Non-existent absolute path falls back to the models dir by file name.
        let resolved = resolve_model_path("/nonexistent/face.sod", models.path()).unwrap();
        assert_eq!(
            PathBuf::from(resolved),
            models.path().join("face.sod")
        );
        // Non-file kinds pass through untouched.
        assert_eq!(resolve_model_path("motion", models.path()).unwrap(), "motion");
        assert_eq!(
            resolve_model_path("http://h/d", models.path()).unwrap(),
            "http://h/d"
        );
        assert!(resolve_model_path("/nonexistent/other.sod", models.path()).is_err());
    }
}
