use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::streams::StreamSettings;

const DEFAULT_DB_PATH: &str = "nvr-detect.db";
const DEFAULT_STORAGE_ROOT: &str = "/var/lib/nvr/storage";
const DEFAULT_MODELS_DIR: &str = "/var/lib/nvr/models";
const DEFAULT_STARTUP_DELAY_SECS: u64 = 10;
const DEFAULT_POOL_SLOTS: usize = 8;
const DEFAULT_CACHE_ENTRIES: usize = 8;
const DEFAULT_LARGE_MODEL_MB: u64 = 50;
const DEFAULT_LARGE_MODEL_CAP: usize = 32;

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    db_path: Option<String>,
    storage_root: Option<PathBuf>,
    models_dir: Option<PathBuf>,
    api_detection_url: Option<String>,
    startup_delay_secs: Option<u64>,
    pool: Option<PoolConfigFile>,
    cache: Option<CacheConfigFile>,
    policy: Option<PolicyConfigFile>,
    #[serde(default)]
    streams: Vec<StreamSettings>,
}

#[derive(Debug, Deserialize, Default)]
struct PoolConfigFile {
    slots: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheConfigFile {
    entries: Option<usize>,
    large_model_mb: Option<u64>,
    large_model_cap: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct PolicyConfigFile {
    downscale_factor_default: Option<u32>,
    downscale_factor_cnn: Option<u32>,
    downscale_factor_realnet: Option<u32>,
    threshold_cnn: Option<f32>,
    threshold_cnn_embedded: Option<f32>,
    threshold_realnet: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct DetectConfig {
    pub db_path: String,
    pub storage_root: PathBuf,
    pub models_dir: PathBuf,
    /// Endpoint substituted for the `api-detection` sentinel at query time.
    pub api_detection_url: Option<String>,
    /// Grace period after process start before any worker runs a cycle.
    pub startup_delay: Duration,
    pub pool: PoolSettings,
    pub cache: CacheSettings,
    pub policy: PolicySettings,
    pub streams: Vec<StreamSettings>,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub slots: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub entries: usize,
    pub large_model_bytes: u64,
    pub large_model_cap: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PolicySettings {
    pub downscale_factor_default: u32,
    pub downscale_factor_cnn: u32,
    pub downscale_factor_realnet: u32,
    pub threshold_cnn: f32,
    pub threshold_cnn_embedded: f32,
    pub threshold_realnet: f32,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            downscale_factor_default: 1,
            downscale_factor_cnn: 2,
            downscale_factor_realnet: 1,
            threshold_cnn: 0.3,
            threshold_cnn_embedded: 0.3,
            threshold_realnet: 5.0,
        }
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            storage_root: PathBuf::from(DEFAULT_STORAGE_ROOT),
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            api_detection_url: None,
            startup_delay: Duration::from_secs(DEFAULT_STARTUP_DELAY_SECS),
            pool: PoolSettings {
                slots: DEFAULT_POOL_SLOTS,
            },
            cache: CacheSettings {
                entries: DEFAULT_CACHE_ENTRIES,
                large_model_bytes: DEFAULT_LARGE_MODEL_MB * 1024 * 1024,
                large_model_cap: DEFAULT_LARGE_MODEL_CAP,
            },
            policy: PolicySettings::default(),
            streams: Vec::new(),
        }
    }
}

impl DetectConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("NVR_DETECT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectConfigFile) -> Self {
        let defaults = Self::default();
        let pool = PoolSettings {
            slots: file
                .pool
                .as_ref()
                .and_then(|p| p.slots)
                .unwrap_or(defaults.pool.slots),
        };
        let cache = CacheSettings {
            entries: file
                .cache
                .as_ref()
                .and_then(|c| c.entries)
                .unwrap_or(defaults.cache.entries),
            large_model_bytes: file
                .cache
                .as_ref()
                .and_then(|c| c.large_model_mb)
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.cache.large_model_bytes),
            large_model_cap: file
                .cache
                .as_ref()
                .and_then(|c| c.large_model_cap)
                .unwrap_or(defaults.cache.large_model_cap),
        };
        let pf = file.policy.unwrap_or_default();
        let dp = defaults.policy;
        let policy = PolicySettings {
            downscale_factor_default: pf
                .downscale_factor_default
                .unwrap_or(dp.downscale_factor_default),
            downscale_factor_cnn: pf.downscale_factor_cnn.unwrap_or(dp.downscale_factor_cnn),
            downscale_factor_realnet: pf
                .downscale_factor_realnet
                .unwrap_or(dp.downscale_factor_realnet),
            threshold_cnn: pf.threshold_cnn.unwrap_or(dp.threshold_cnn),
            threshold_cnn_embedded: pf
                .threshold_cnn_embedded
                .unwrap_or(dp.threshold_cnn_embedded),
            threshold_realnet: pf.threshold_realnet.unwrap_or(dp.threshold_realnet),
        };
        Self {
            db_path: file.db_path.unwrap_or(defaults.db_path),
            storage_root: file.storage_root.unwrap_or(defaults.storage_root),
            models_dir: file.models_dir.unwrap_or(defaults.models_dir),
            api_detection_url: file.api_detection_url,
            startup_delay: file
                .startup_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.startup_delay),
            pool,
            cache,
            policy,
            streams: file.streams,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("NVR_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(root) = std::env::var("NVR_STORAGE_ROOT") {
            if !root.trim().is_empty() {
                self.storage_root = PathBuf::from(root);
            }
        }
        if let Ok(dir) = std::env::var("NVR_MODELS_DIR") {
            if !dir.trim().is_empty() {
                self.models_dir = PathBuf::from(dir);
            }
        }
        if let Ok(url) = std::env::var("NVR_API_DETECTION_URL") {
            if !url.trim().is_empty() {
                self.api_detection_url = Some(url);
            }
        }
        if let Ok(delay) = std::env::var("NVR_STARTUP_DELAY_SECS") {
            let seconds: u64 = delay.parse().map_err(|_| {
                anyhow!("NVR_STARTUP_DELAY_SECS must be an integer number of seconds")
            })?;
            self.startup_delay = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.pool.slots == 0 {
            return Err(anyhow!("pool.slots must be greater than zero"));
        }
        if self.cache.entries == 0 {
            return Err(anyhow!("cache.entries must be greater than zero"));
        }
        if self.cache.large_model_cap == 0 {
            return Err(anyhow!("cache.large_model_cap must be greater than zero"));
        }
        for stream in &self.streams {
            if stream.name.trim().is_empty() {
                return Err(anyhow!("stream name must not be empty"));
            }
            if stream.model.trim().is_empty() {
                return Err(anyhow!("stream {} has no model configured", stream.name));
            }
            if stream.interval_secs == 0 {
                return Err(anyhow!(
                    "stream {} detection interval must be greater than zero",
                    stream.name
                ));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DetectConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = DetectConfig::default();
        assert_eq!(cfg.startup_delay, Duration::from_secs(10));
        assert_eq!(cfg.pool.slots, 8);
        assert_eq!(cfg.cache.entries, 8);
        assert_eq!(cfg.cache.large_model_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.cache.large_model_cap, 32);
    }

    #[test]
    fn file_values_override_defaults() {
        let file: DetectConfigFile = serde_json::from_str(
            r#"{
                "db_path": "/tmp/d.db",
                "api_detection_url": "http://127.0.0.1:9000/detect",
                "cache": {"large_model_mb": 10, "large_model_cap": 2},
                "policy": {"threshold_cnn": 0.4},
                "streams": [
                    {"name": "cam1", "model": "/m/a.sod", "hls_dir": "/var/hls/cam1"}
                ]
            }"#,
        )
        .unwrap();
        let cfg = DetectConfig::from_file(file);
        assert_eq!(cfg.db_path, "/tmp/d.db");
        assert_eq!(cfg.cache.large_model_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.cache.large_model_cap, 2);
        assert_eq!(cfg.policy.threshold_cnn, 0.4);
        assert_eq!(cfg.policy.threshold_realnet, 5.0);
        assert_eq!(cfg.streams.len(), 1);
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = DetectConfig::default();
        cfg.streams.push(StreamSettings {
            name: "cam1".into(),
            detection_enabled: true,
            model: "motion".into(),
            threshold: 0.0,
            interval_secs: 0,
            hls_dir: PathBuf::from("/tmp"),
        });
        assert!(cfg.validate().is_err());
    }
}
