use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use ridewatch::config::DaemonConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "RIDEWATCH_CONFIG",
        "RIDEWATCH_API_ADDR",
        "RIDEWATCH_VIDEO_ROOT",
        "DETECTION_FOLDER",
        "RIDEWATCH_TARGET_FPS",
        "RIDEWATCH_QUEUE_CAPACITY",
        "RIDEWATCH_DETECTOR",
        "MODEL_PATH",
        "RIDEWATCH_NOTIFY_URL",
        "RIDEWATCH_NOTIFY_WORKERS",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DaemonConfig::load().expect("load defaults");
    assert_eq!(cfg.api_addr, "127.0.0.1:5001");
    assert_eq!(cfg.detection_dir.to_str(), Some("detections"));
    assert_eq!((cfg.pipeline.frame_width, cfg.pipeline.frame_height), (854, 480));
    assert_eq!(cfg.pipeline.target_fps, 30);
    assert_eq!(cfg.pipeline.queue_capacity, 10);
    assert_eq!(cfg.pipeline.cache_release_every, 30);
    assert_eq!(cfg.detector.backend, "stub");
    assert!((cfg.detector.confidence - 0.6).abs() < f32::EPSILON);
    assert!(cfg.notifier.endpoint.is_none());
    assert_eq!(cfg.notifier.timeout, Duration::from_secs(5));
}

#[test]
fn loads_json_file_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "detection_dir": "/var/lib/ridewatch/detections",
            "api": { "addr": "0.0.0.0:9000", "video_root": "/srv/videos" },
            "pipeline": { "target_fps": 15, "queue_capacity": 6, "jpeg_quality": 80 },
            "detector": { "backend": "Stub", "confidence": 0.4 },
            "notifier": { "endpoint": "http://127.0.0.1:5002/process_frame", "workers": 2 }
        }"#,
    );
    std::env::set_var("RIDEWATCH_CONFIG", file.path());
    std::env::set_var("RIDEWATCH_TARGET_FPS", "24");
    std::env::set_var("DETECTION_FOLDER", "/tmp/crops");

    let cfg = DaemonConfig::load().expect("load config");
    assert_eq!(cfg.api_addr, "0.0.0.0:9000");
    assert_eq!(cfg.video_root.as_deref().and_then(|p| p.to_str()), Some("/srv/videos"));
    assert_eq!(cfg.detection_dir.to_str(), Some("/tmp/crops"));
    assert_eq!(cfg.pipeline.target_fps, 24);
    assert_eq!(cfg.pipeline.queue_capacity, 6);
    assert_eq!(cfg.pipeline.jpeg_quality, 80);
    assert_eq!(cfg.detector.backend, "stub");
    assert!((cfg.detector.confidence - 0.4).abs() < f32::EPSILON);
    assert_eq!(
        cfg.notifier.endpoint.as_deref(),
        Some("http://127.0.0.1:5002/process_frame")
    );
    assert_eq!(cfg.notifier.workers, 2);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".toml",
        r#"
detection_dir = "crops"

[pipeline]
frame_width = 640
frame_height = 360
max_consecutive_failures = 2

[notifier]
timeout_ms = 1500
queue_depth = 8
"#,
    );
    std::env::set_var("RIDEWATCH_CONFIG", file.path());

    let cfg = DaemonConfig::load().expect("load toml config");
    assert_eq!(cfg.detection_dir.to_str(), Some("crops"));
    assert_eq!((cfg.pipeline.frame_width, cfg.pipeline.frame_height), (640, 360));
    assert_eq!(cfg.pipeline.max_consecutive_failures, 2);
    assert_eq!(cfg.notifier.timeout, Duration::from_millis(1500));
    assert_eq!(cfg.notifier.queue_depth, 8);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();

    clear_env();
    std::env::set_var("RIDEWATCH_QUEUE_CAPACITY", "0");
    assert!(DaemonConfig::load().is_err());

    clear_env();
    std::env::set_var("RIDEWATCH_TARGET_FPS", "fast");
    assert!(DaemonConfig::load().is_err());

    clear_env();
    std::env::set_var("RIDEWATCH_NOTIFY_URL", "mqtt://broker:1883");
    assert!(DaemonConfig::load().is_err());

    clear_env();
    let file = config_file(".json", r#"{ "detector": { "iou": 1.5 } }"#);
    std::env::set_var("RIDEWATCH_CONFIG", file.path());
    assert!(DaemonConfig::load().is_err());

    clear_env();
    std::env::set_var("RIDEWATCH_CONFIG", "/definitely/missing/ridewatch.json");
    assert!(DaemonConfig::load().is_err());

    clear_env();
}
