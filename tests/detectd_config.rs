use std::sync::Mutex;

use tempfile::NamedTempFile;

use nvr_detect::config::DetectConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "NVR_DETECT_CONFIG",
        "NVR_DB_PATH",
        "NVR_STORAGE_ROOT",
        "NVR_MODELS_DIR",
        "NVR_API_DETECTION_URL",
        "NVR_STARTUP_DELAY_SECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "detect_prod.db",
        "storage_root": "/srv/nvr/storage",
        "models_dir": "/srv/nvr/models",
        "api_detection_url": "http://127.0.0.1:9001/api/v1/detect",
        "startup_delay_secs": 3,
        "pool": {"slots": 4},
        "cache": {"entries": 6, "large_model_mb": 25, "large_model_cap": 8},
        "policy": {"downscale_factor_cnn": 3, "threshold_realnet": 4.0},
        "streams": [
            {"name": "cam1", "model": "/srv/nvr/models/person.sod",
             "threshold": 0.6, "interval_secs": 5, "hls_dir": "/tmp/nvr/hls/cam1"},
            {"name": "cam2", "model": "motion", "detection_enabled": false,
             "hls_dir": "/tmp/nvr/hls/cam2"}
        ]
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("NVR_DETECT_CONFIG", file.path());
    std::env::set_var("NVR_DB_PATH", "/tmp/override.db");
    std::env::set_var("NVR_STARTUP_DELAY_SECS", "0");

    let cfg = DetectConfig::load().expect("load config");
    clear_env();

    // Env wins over file.
    assert_eq!(cfg.db_path, "/tmp/override.db");
    assert_eq!(cfg.startup_delay.as_secs(), 0);
    // File wins over defaults.
    assert_eq!(cfg.storage_root.to_str(), Some("/srv/nvr/storage"));
    assert_eq!(
        cfg.api_detection_url.as_deref(),
        Some("http://127.0.0.1:9001/api/v1/detect")
    );
    assert_eq!(cfg.pool.slots, 4);
    assert_eq!(cfg.cache.entries, 6);
    assert_eq!(cfg.cache.large_model_bytes, 25 * 1024 * 1024);
    assert_eq!(cfg.cache.large_model_cap, 8);
    assert_eq!(cfg.policy.downscale_factor_cnn, 3);
    assert_eq!(cfg.policy.threshold_realnet, 4.0);
    // Untouched values keep defaults.
    assert_eq!(cfg.policy.threshold_cnn, 0.3);

    assert_eq!(cfg.streams.len(), 2);
    assert_eq!(cfg.streams[0].name, "cam1");
    assert_eq!(cfg.streams[0].threshold, 0.6);
    assert_eq!(cfg.streams[0].interval_secs, 5);
    assert!(!cfg.streams[1].detection_enabled);
    assert_eq!(cfg.streams[1].interval_secs, 10);
}

#[test]
fn defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DetectConfig::load().expect("load defaults");
    assert_eq!(cfg.db_path, "nvr-detect.db");
    assert_eq!(cfg.startup_delay.as_secs(), 10);
    assert_eq!(cfg.cache.large_model_bytes, 50 * 1024 * 1024);
    assert_eq!(cfg.cache.large_model_cap, 32);
    assert!(cfg.api_detection_url.is_none());
    assert!(cfg.streams.is_empty());
}

#[test]
fn rejects_bad_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{"pool": {"slots": 0}}"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("NVR_DETECT_CONFIG", file.path());
    let result = DetectConfig::load();
    clear_env();
    assert!(result.is_err());
}
