//! Built-in background-subtraction motion engine.
//!
//! Each stream gets its own engine: a blurred previous frame, an
//! exponentially averaged background model, a short frame history, and a
//! cooldown clock. A frame scores against both the previous frame and the
//! background (per pixel, the larger difference wins) so slow drift and
//! sudden change are both caught; the background learns faster when the
//! scene is quiet so parked objects melt into it.
//!
//! The engine registers as an ordinary backend runtime: loading the
//! `motion` pseudo-model creates fresh per-stream state, so it shares the
//! cache/dispatch lifecycle with real models without ever sharing pixels
//! across streams.

use std::sync::Mutex;

use crate::backend::{BackendRuntime, Query, RawDetection};
use crate::error::{DetectError, Result};
use crate::frame::{Frame, PixelFormat};
use crate::model::{BackendKind, BackendState};

pub const MOTION_LABEL: &str = "motion";

const DEFAULT_SENSITIVITY: f32 = 0.15;
const DEFAULT_MIN_MOTION_AREA: f32 = 0.005;
const DEFAULT_COOLDOWN_SECS: i64 = 3;
const DEFAULT_BLUR_RADIUS: u32 = 1;
const DEFAULT_NOISE_THRESHOLD: u8 = 10;
const DEFAULT_GRID_SIZE: u32 = 8;
const DEFAULT_HISTORY_SIZE: usize = 3;
/// Cell scores below this are treated as still.
const CELL_SCORE_EPSILON: f32 = 0.01;
const LEARNING_RATE_IDLE: f32 = 0.05;
const LEARNING_RATE_MOTION: f32 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct MotionConfig {
    /// Per-pixel change fraction (of 255) that counts as changed.
    pub sensitivity: f32,
    /// Fraction of the frame (or of grid cells) that must change.
    pub min_motion_area: f32,
    /// Seconds to stay quiet after a detection.
    pub cooldown_secs: i64,
    pub blur_radius: u32,
    /// Absolute pixel delta below this is noise.
    pub noise_threshold: u8,
    pub use_grid: bool,
    pub grid_size: u32,
    pub history_size: usize,
    /// Downscale factor applied before analysis.
    pub downscale: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            min_motion_area: DEFAULT_MIN_MOTION_AREA,
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            blur_radius: DEFAULT_BLUR_RADIUS,
            noise_threshold: DEFAULT_NOISE_THRESHOLD,
            use_grid: true,
            grid_size: DEFAULT_GRID_SIZE,
            history_size: DEFAULT_HISTORY_SIZE,
            downscale: 1,
        }
    }
}

impl MotionConfig {
    /// Clamp out-of-range values back to defaults rather than failing, so a
    /// bad config degrades to stock behavior.
    pub fn sanitized(mut self) -> Self {
        if !(self.sensitivity > 0.0 && self.sensitivity <= 1.0) {
            self.sensitivity = DEFAULT_SENSITIVITY;
        }
        if !(self.min_motion_area > 0.0 && self.min_motion_area <= 1.0) {
            self.min_motion_area = DEFAULT_MIN_MOTION_AREA;
        }
        if self.cooldown_secs <= 0 {
            self.cooldown_secs = DEFAULT_COOLDOWN_SECS;
        }
        if self.blur_radius > 5 {
            self.blur_radius = DEFAULT_BLUR_RADIUS;
        }
        if self.noise_threshold > 50 {
            self.noise_threshold = DEFAULT_NOISE_THRESHOLD;
        }
        if !(2..=32).contains(&self.grid_size) {
            self.grid_size = DEFAULT_GRID_SIZE;
        }
        if !(1..=10).contains(&self.history_size) {
            self.history_size = DEFAULT_HISTORY_SIZE;
        }
        if self.downscale == 0 {
            self.downscale = 1;
        }
        self
    }
}

struct HistoryFrame {
    pixels: Vec<u8>,
    ts: i64,
}

/// Per-dimension analysis buffers, rebuilt when the frame size changes.
struct EngineBuffers {
    width: u32,
    height: u32,
    prev: Vec<u8>,
    background: Vec<u8>,
    blur: Vec<u8>,
    history: Vec<HistoryFrame>,
    history_index: usize,
}

pub struct MotionEngine {
    config: MotionConfig,
    buffers: Option<EngineBuffers>,
    last_detection_ts: Option<i64>,
}

/// Outcome of one analyzed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionOutcome {
    /// Buffers were (re)initialized from this frame; no verdict yet.
    Primed,
    /// Within the cooldown window; frame skipped.
    CoolingDown,
    Still { score: f32, area: f32 },
    Motion { score: f32, area: f32 },
}

impl MotionEngine {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config: config.sanitized(),
            buffers: None,
            last_detection_ts: None,
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Analyze one frame. `frame.ts` drives the cooldown clock so replayed
    /// or batched frames behave deterministically.
    pub fn process(&mut self, frame: &Frame) -> Result<MotionOutcome> {
        if let Some(last) = self.last_detection_ts {
            if frame.ts - last < self.config.cooldown_secs {
                return Ok(MotionOutcome::CoolingDown);
            }
        }

        let analyzed = if self.config.downscale > 1 {
            frame.to_grayscale().downscale(self.config.downscale)
        } else {
            frame.to_grayscale()
        };
        if analyzed.format != PixelFormat::Gray8 {
            return Err(DetectError::DetectionFailed(
                "motion analysis requires grayscale input".into(),
            ));
        }
        let (w, h) = (analyzed.width, analyzed.height);
        let pixels = w as usize * h as usize;
        if pixels == 0 {
            return Err(DetectError::DetectionFailed("empty frame".into()));
        }

        let needs_init = match &self.buffers {
            Some(b) => b.width != w || b.height != h,
            None => true,
        };
        if needs_init {
            self.buffers = Some(EngineBuffers {
                width: w,
                height: h,
                prev: analyzed.data.clone(),
                background: analyzed.data.clone(),
                blur: vec![0; pixels],
                history: Vec::new(),
                history_index: 0,
            });
            return Ok(MotionOutcome::Primed);
        }
        let Some(buffers) = self.buffers.as_mut() else {
            return Ok(MotionOutcome::Primed);
        };

        box_blur(
            &analyzed.data,
            &mut buffers.blur,
            w as usize,
            h as usize,
            self.config.blur_radius as i32,
        );

        let (score, area) = if self.config.use_grid {
            grid_motion(
                &buffers.blur,
                &buffers.prev,
                &buffers.background,
                w as usize,
                h as usize,
                &self.config,
            )
        } else {
            flat_motion(
                &buffers.blur,
                &buffers.prev,
                &buffers.background,
                &self.config,
            )
        };
        let detected = if self.config.use_grid {
            area >= self.config.min_motion_area && score > CELL_SCORE_EPSILON
        } else {
            area >= self.config.min_motion_area
        };

        push_history(buffers, self.config.history_size, frame.ts);

        let rate = if detected {
            LEARNING_RATE_MOTION
        } else {
            LEARNING_RATE_IDLE
        };
        for (bg, &cur) in buffers.background.iter_mut().zip(buffers.blur.iter()) {
            *bg = ((1.0 - rate) * *bg as f32 + rate * cur as f32) as u8;
        }
        buffers.prev.copy_from_slice(&buffers.blur);

        if detected {
            self.last_detection_ts = Some(frame.ts);
            log::info!(
                "motion: score={:.3} area={:.2}%",
                score,
                area * 100.0
            );
            Ok(MotionOutcome::Motion { score, area })
        } else {
            log::debug!(
                "motion: still, score={:.3} area={:.2}% threshold={:.2}",
                score,
                area * 100.0,
                self.config.min_motion_area
            );
            Ok(MotionOutcome::Still { score, area })
        }
    }

    /// Drop all learned state; the next frame primes fresh buffers.
    pub fn reset(&mut self) {
        self.buffers = None;
        self.last_detection_ts = None;
    }
}

fn push_history(buffers: &mut EngineBuffers, capacity: usize, ts: i64) {
    let frame = HistoryFrame {
        pixels: buffers.blur.clone(),
        ts,
    };
    if buffers.history.len() < capacity {
        buffers.history.push(frame);
        buffers.history_index = buffers.history.len() % capacity;
    } else {
        buffers.history[buffers.history_index] = frame;
        buffers.history_index = (buffers.history_index + 1) % capacity;
    }
}

fn box_blur(src: &[u8], dst: &mut [u8], width: usize, height: usize, radius: i32) {
    if radius <= 0 {
        dst.copy_from_slice(src);
        return;
    }
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut sum = 0u32;
            let mut count = 0u32;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let nx = x + dx;
                    let ny = y + dy;
                    if nx < 0 || nx >= width as i32 || ny < 0 || ny >= height as i32 {
                        continue;
                    }
                    sum += src[ny as usize * width + nx as usize] as u32;
                    count += 1;
                }
            }
            dst[y as usize * width + x as usize] = (sum / count) as u8;
        }
    }
}

/// Per-pixel difference against both references; the larger wins, noise
/// floor and sensitivity gate applied after.
fn pixel_diff(cur: u8, prev: u8, bg: u8, cfg: &MotionConfig) -> Option<u32> {
    let frame_diff = (cur as i32 - prev as i32).unsigned_abs();
    let bg_diff = (cur as i32 - bg as i32).unsigned_abs();
    let diff = frame_diff.max(bg_diff);
    if diff > cfg.noise_threshold as u32 && diff as f32 > cfg.sensitivity * 255.0 {
        Some(diff)
    } else {
        None
    }
}

/// Grid scoring: score is the hottest cell, area is the fraction of cells
/// with meaningful motion. A small moving object lights up its cell instead
/// of being averaged away over the whole frame.
fn grid_motion(
    cur: &[u8],
    prev: &[u8],
    bg: &[u8],
    width: usize,
    height: usize,
    cfg: &MotionConfig,
) -> (f32, f32) {
    let grid = cfg.grid_size as usize;
    let cell_w = (width / grid).max(1);
    let cell_h = (height / grid).max(1);
    let mut cells_with_motion = 0usize;
    let mut max_cell_score = 0.0f32;

    for gy in 0..grid {
        for gx in 0..grid {
            let x0 = gx * cell_w;
            let y0 = gy * cell_h;
            if x0 >= width || y0 >= height {
                continue;
            }
            let x1 = ((gx + 1) * cell_w).min(width);
            let y1 = ((gy + 1) * cell_h).min(height);
            let mut cell_pixels = 0u32;
            let mut total_diff = 0u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    let idx = y * width + x;
                    if let Some(diff) = pixel_diff(cur[idx], prev[idx], bg[idx], cfg) {
                        total_diff += diff;
                    }
                    cell_pixels += 1;
                }
            }
            if cell_pixels == 0 {
                continue;
            }
            let cell_score = total_diff as f32 / (cell_pixels * 255) as f32;
            if cell_score > CELL_SCORE_EPSILON {
                cells_with_motion += 1;
                max_cell_score = max_cell_score.max(cell_score);
            }
        }
    }
    let area = cells_with_motion as f32 / (grid * grid) as f32;
    (max_cell_score, area)
}

fn flat_motion(cur: &[u8], prev: &[u8], bg: &[u8], cfg: &MotionConfig) -> (f32, f32) {
    let mut changed = 0usize;
    let mut total_diff = 0u64;
    for i in 0..cur.len() {
        if let Some(diff) = pixel_diff(cur[i], prev[i], bg[i], cfg) {
            changed += 1;
            total_diff += diff as u64;
        }
    }
    let area = changed as f32 / cur.len() as f32;
    let score = total_diff as f32 / (cur.len() as u64 * 255) as f32;
    (score, area)
}

/// Backend adapter: per-handle state is one engine behind a mutex, created
/// fresh on every load.
pub struct MotionRuntime {
    config: MotionConfig,
}

impl MotionRuntime {
    pub fn new(config: MotionConfig) -> Self {
        Self { config }
    }
}

impl Default for MotionRuntime {
    fn default() -> Self {
        Self::new(MotionConfig::default())
    }
}

impl BackendRuntime for MotionRuntime {
    fn kind(&self) -> BackendKind {
        BackendKind::Motion
    }

    fn load(&self, _path: &str, _threshold: f32) -> Result<BackendState> {
        Ok(BackendState::new(Mutex::new(MotionEngine::new(self.config))))
    }

    fn infer(&self, state: &BackendState, frame: &Frame, _query: &Query) -> Result<Vec<RawDetection>> {
        let engine = state
            .downcast_ref::<Mutex<MotionEngine>>()
            .ok_or_else(|| DetectError::DetectionFailed("foreign motion state".into()))?;
        let mut engine = match engine.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        match engine.process(frame)? {
            MotionOutcome::Motion { score, .. } => Ok(vec![RawDetection {
                label: MOTION_LABEL.to_string(),
                confidence: score.clamp(0.0, 1.0),
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0,
            }]),
            _ => Ok(Vec::new()),
        }
    }

    fn unload(&self, _state: &BackendState) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, fill: u8, ts: i64) -> Frame {
        Frame::new(
            vec![fill; (width * height) as usize],
            width,
            height,
            PixelFormat::Gray8,
            ts,
        )
        .unwrap()
    }

    fn with_blob(mut frame: Frame, value: u8) -> Frame {
        // Light up a 16x16 block in the top-left corner.
        let w = frame.width as usize;
        for y in 0..16 {
            for x in 0..16 {
                frame.data[y * w + x] = value;
            }
        }
        frame
    }

    #[test]
    fn first_frame_primes_without_verdict() {
        let mut engine = MotionEngine::new(MotionConfig::default());
        let out = engine.process(&gray(64, 64, 10, 0)).unwrap();
        assert_eq!(out, MotionOutcome::Primed);
    }

    #[test]
    fn blob_triggers_and_cooldown_suppresses() {
        let mut engine = MotionEngine::new(MotionConfig::default());
        engine.process(&gray(64, 64, 10, 0)).unwrap();
        let out = engine.process(&with_blob(gray(64, 64, 10, 1), 250)).unwrap();
        assert!(matches!(out, MotionOutcome::Motion { .. }));
        // Inside the 3 s cooldown nothing is even analyzed.
        let out = engine.process(&with_blob(gray(64, 64, 10, 2), 250)).unwrap();
        assert_eq!(out, MotionOutcome::CoolingDown);
        // After the cooldown the (still present) blob fires again.
        let out = engine.process(&with_blob(gray(64, 64, 10, 5), 250)).unwrap();
        assert!(matches!(out, MotionOutcome::Motion { .. }));
    }

    #[test]
    fn static_scene_stays_still() {
        let mut engine = MotionEngine::new(MotionConfig::default());
        engine.process(&gray(64, 64, 100, 0)).unwrap();
        for t in 1..5 {
            let out = engine.process(&gray(64, 64, 100, t)).unwrap();
            assert!(matches!(out, MotionOutcome::Still { .. }), "t={}", t);
        }
    }

    #[test]
    fn subtle_noise_below_threshold_is_ignored() {
        let mut engine = MotionEngine::new(MotionConfig::default());
        engine.process(&gray(64, 64, 100, 0)).unwrap();
        // +5 everywhere is under the noise threshold of 10.
        let out = engine.process(&gray(64, 64, 105, 1)).unwrap();
        assert!(matches!(out, MotionOutcome::Still { .. }));
    }

    #[test]
    fn dimension_change_reprimes() {
        let mut engine = MotionEngine::new(MotionConfig::default());
        engine.process(&gray(64, 64, 10, 0)).unwrap();
        let out = engine.process(&gray(32, 32, 10, 1)).unwrap();
        assert_eq!(out, MotionOutcome::Primed);
    }

    #[test]
    fn flat_mode_triggers_on_global_change() {
        let cfg = MotionConfig {
            use_grid: false,
            ..MotionConfig::default()
        };
        let mut engine = MotionEngine::new(cfg);
        engine.process(&gray(64, 64, 10, 0)).unwrap();
        let out = engine.process(&gray(64, 64, 250, 1)).unwrap();
        match out {
            MotionOutcome::Motion { area, .. } => assert!(area > 0.9),
            other => panic!("expected motion, got {:?}", other),
        }
    }

    #[test]
    fn runtime_adapter_reports_full_frame_box() {
        let rt = MotionRuntime::default();
        let state = rt.load("motion", 0.0).unwrap();
        let q = Query {
            threshold: 0.0,
            endpoint: None,
        };
        assert!(rt.infer(&state, &gray(64, 64, 10, 0), &q).unwrap().is_empty());
        let out = rt
            .infer(&state, &with_blob(gray(64, 64, 10, 1), 250), &q)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "motion");
        assert_eq!((out[0].width, out[0].height), (1.0, 1.0));
    }
}
