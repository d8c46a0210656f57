//! Stream configuration and the media-pipeline seam.
//!
//! The detection core does not own stream CRUD or the HLS/ffmpeg pipeline;
//! it consumes both through the traits here. [`StaticConfigSource`] is the
//! config-file-backed source the daemon wires up; a full NVR would back
//! [`StreamConfigSource`] with its live stream table instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;

use crate::error::{DetectError, Result};
use crate::frame::Frame;

/// Detection-relevant slice of one stream's configuration, re-read by the
/// worker every cycle so toggles take effect without a restart.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    pub name: String,
    #[serde(default = "default_true")]
    pub detection_enabled: bool,
    /// Model path, URL, or literal (`motion`, `api-detection`, `*onvif`).
    pub model: String,
    /// Confidence floor; `0.0` means "use the per-kind default".
    #[serde(default)]
    pub threshold: f32,
    /// Seconds between detection cycles.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Directory the media pipeline writes this stream's segments into.
    pub hls_dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    10
}

/// Live lookup of stream settings. Returning `None` means the stream no
/// longer exists and its worker should stop.
pub trait StreamConfigSource: Send + Sync {
    fn stream_settings(&self, name: &str) -> Option<StreamSettings>;
    fn stream_names(&self) -> Vec<String>;
}

/// The media pipeline the NVR runs detection against. All operations are
/// per-stream; `restart_input` covers the stalled-upstream recovery path.
pub trait MediaPipeline: Send + Sync {
    /// Grab one decoded frame for the stream, RGB, most recent available.
    fn snapshot(&self, stream: &str) -> Result<Frame>;

    fn input_active(&self, stream: &str) -> bool;

    /// Stop and restart the upstream input for a stalled stream. The whole
    /// stop, settling pause, start sequence happens inside the call.
    fn restart_input(&self, stream: &str) -> Result<()>;

    fn start_recording(&self, stream: &str, output: &Path) -> Result<()>;

    fn stop_recording(&self, stream: &str) -> Result<()>;
}

/// Config-file-backed stream source with runtime update support.
#[derive(Default)]
pub struct StaticConfigSource {
    streams: Mutex<HashMap<String, StreamSettings>>,
}

impl StaticConfigSource {
    pub fn new(streams: Vec<StreamSettings>) -> Self {
        let map = streams.into_iter().map(|s| (s.name.clone(), s)).collect();
        Self {
            streams: Mutex::new(map),
        }
    }

    pub fn upsert(&self, settings: StreamSettings) {
        let mut map = match self.streams.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        map.insert(settings.name.clone(), settings);
    }

    pub fn remove(&self, name: &str) {
        let mut map = match self.streams.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        map.remove(name);
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut map = match self.streams.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        match map.get_mut(name) {
            Some(s) => {
                s.detection_enabled = enabled;
                Ok(())
            }
            None => Err(DetectError::UnknownStream(name.to_string())),
        }
    }
}

impl StreamConfigSource for StaticConfigSource {
    fn stream_settings(&self, name: &str) -> Option<StreamSettings> {
        let map = match self.streams.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        map.get(name).cloned()
    }

    fn stream_names(&self) -> Vec<String> {
        let map = match self.streams.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Synthetic pipeline for dry runs and tests: snapshots are flat gray
/// frames stamped with the current time, recording calls only log.
pub struct SyntheticPipeline {
    width: u32,
    height: u32,
}

impl SyntheticPipeline {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for SyntheticPipeline {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl MediaPipeline for SyntheticPipeline {
    fn snapshot(&self, _stream: &str) -> Result<Frame> {
        let pixels = (self.width * self.height * 3) as usize;
        Frame::new(
            vec![96; pixels],
            self.width,
            self.height,
            crate::frame::PixelFormat::Rgb24,
            crate::now_s(),
        )
    }

    fn input_active(&self, _stream: &str) -> bool {
        true
    }

    fn restart_input(&self, stream: &str) -> Result<()> {
        log::info!("[{}] synthetic pipeline restart (no-op)", stream);
        Ok(())
    }

    fn start_recording(&self, stream: &str, output: &Path) -> Result<()> {
        log::info!("[{}] synthetic recording start -> {}", stream, output.display());
        Ok(())
    }

    fn stop_recording(&self, stream: &str) -> Result<()> {
        log::info!("[{}] synthetic recording stop", stream);
        Ok(())
    }
}
