use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_API_ADDR: &str = "127.0.0.1:5001";
const DEFAULT_DETECTION_DIR: &str = "detections";
const DEFAULT_FRAME_WIDTH: u32 = 854;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_QUEUE_CAPACITY: usize = crate::stream::DEFAULT_QUEUE_CAPACITY;
const DEFAULT_JPEG_QUALITY: u8 = 90;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 100;
const DEFAULT_CACHE_RELEASE_EVERY: u64 = 30;
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;
const DEFAULT_DETECTOR: &str = "stub";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.6;
const DEFAULT_IOU: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 10;
const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_NOTIFY_WORKERS: usize = 4;
const DEFAULT_NOTIFY_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Deserialize, Default)]
struct DaemonConfigFile {
    detection_dir: Option<PathBuf>,
    api: Option<ApiConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    detector: Option<DetectorConfigFile>,
    notifier: Option<NotifierConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    video_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    frame_width: Option<u32>,
    frame_height: Option<u32>,
    target_fps: Option<u32>,
    queue_capacity: Option<usize>,
    jpeg_quality: Option<u8>,
    poll_timeout_ms: Option<u64>,
    cache_release_every: Option<u64>,
    max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    iou: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct NotifierConfigFile {
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
    workers: Option<usize>,
    queue_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub api_addr: String,
    /// Relative video paths in requests are resolved against this directory.
    pub video_root: Option<PathBuf>,
    pub detection_dir: PathBuf,
    pub pipeline: PipelineSettings,
    pub detector: DetectorSettings,
    pub notifier: NotifierSettings,
}

/// Knobs for every session's producer loop.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub frame_width: u32,
    pub frame_height: u32,
    pub target_fps: u32,
    pub queue_capacity: usize,
    pub jpeg_quality: u8,
    /// Upper bound on a viewer's blocking wait for the next frame.
    pub poll_timeout: Duration,
    /// Release detector caches every N processed frames (0 disables).
    pub cache_release_every: u64,
    /// Detection failures in a row before the session gives up.
    pub max_consecutive_failures: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            cache_release_every: DEFAULT_CACHE_RELEASE_EVERY,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_DETECTOR.to_string(),
            model_path: None,
            input_size: DEFAULT_MODEL_INPUT,
            confidence: DEFAULT_CONFIDENCE,
            iou: DEFAULT_IOU,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Downstream processor URL. `None` logs reports instead of sending them.
    pub endpoint: Option<String>,
    pub timeout: Duration,
    pub workers: usize,
    pub queue_depth: usize,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: Duration::from_millis(DEFAULT_NOTIFY_TIMEOUT_MS),
            workers: DEFAULT_NOTIFY_WORKERS,
            queue_depth: DEFAULT_NOTIFY_QUEUE_DEPTH,
        }
    }
}

impl DaemonConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("RIDEWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DaemonConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let pipeline = file.pipeline.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let notifier = file.notifier.unwrap_or_default();

        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            frame_width: pipeline.frame_width.unwrap_or(defaults.frame_width),
            frame_height: pipeline.frame_height.unwrap_or(defaults.frame_height),
            target_fps: pipeline.target_fps.unwrap_or(defaults.target_fps),
            queue_capacity: pipeline.queue_capacity.unwrap_or(defaults.queue_capacity),
            jpeg_quality: pipeline.jpeg_quality.unwrap_or(defaults.jpeg_quality),
            poll_timeout: pipeline
                .poll_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_timeout),
            cache_release_every: pipeline
                .cache_release_every
                .unwrap_or(defaults.cache_release_every),
            max_consecutive_failures: pipeline
                .max_consecutive_failures
                .unwrap_or(defaults.max_consecutive_failures),
        };

        let defaults = DetectorSettings::default();
        let detector = DetectorSettings {
            backend: detector.backend.unwrap_or(defaults.backend),
            model_path: detector.model_path,
            input_size: detector.input_size.unwrap_or(defaults.input_size),
            confidence: detector.confidence.unwrap_or(defaults.confidence),
            iou: detector.iou.unwrap_or(defaults.iou),
            max_detections: detector.max_detections.unwrap_or(defaults.max_detections),
        };

        let defaults = NotifierSettings::default();
        let notifier = NotifierSettings {
            endpoint: notifier.endpoint.filter(|e| !e.trim().is_empty()),
            timeout: notifier
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
            workers: notifier.workers.unwrap_or(defaults.workers),
            queue_depth: notifier.queue_depth.unwrap_or(defaults.queue_depth),
        };

        Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            video_root: api.video_root,
            detection_dir: file
                .detection_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DETECTION_DIR)),
            pipeline,
            detector,
            notifier,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_env("RIDEWATCH_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(root) = non_empty_env("RIDEWATCH_VIDEO_ROOT") {
            self.video_root = Some(PathBuf::from(root));
        }
        if let Some(dir) = non_empty_env("DETECTION_FOLDER") {
            self.detection_dir = PathBuf::from(dir);
        }
        if let Some(fps) = non_empty_env("RIDEWATCH_TARGET_FPS") {
            self.pipeline.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("RIDEWATCH_TARGET_FPS must be a positive integer"))?;
        }
        if let Some(capacity) = non_empty_env("RIDEWATCH_QUEUE_CAPACITY") {
            self.pipeline.queue_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("RIDEWATCH_QUEUE_CAPACITY must be a positive integer"))?;
        }
        if let Some(backend) = non_empty_env("RIDEWATCH_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(model) = non_empty_env("MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(model));
        }
        if let Some(endpoint) = non_empty_env("RIDEWATCH_NOTIFY_URL") {
            self.notifier.endpoint = Some(endpoint);
        }
        if let Some(workers) = non_empty_env("RIDEWATCH_NOTIFY_WORKERS") {
            self.notifier.workers = workers
                .parse()
                .map_err(|_| anyhow!("RIDEWATCH_NOTIFY_WORKERS must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let p = &self.pipeline;
        if p.frame_width == 0 || p.frame_height == 0 {
            return Err(anyhow!("pipeline frame size must be non-zero"));
        }
        if p.target_fps == 0 {
            return Err(anyhow!("pipeline target_fps must be greater than zero"));
        }
        if p.queue_capacity == 0 {
            return Err(anyhow!("pipeline queue_capacity must be greater than zero"));
        }
        if !(1..=100).contains(&p.jpeg_quality) {
            return Err(anyhow!("pipeline jpeg_quality must be within 1..=100"));
        }
        if p.max_consecutive_failures == 0 {
            return Err(anyhow!(
                "pipeline max_consecutive_failures must be greater than zero"
            ));
        }

        let d = &self.detector;
        for (name, value) in [("confidence", d.confidence), ("iou", d.iou)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("detector {} must be within [0, 1]", name));
            }
        }
        if d.input_size == 0 || d.max_detections == 0 {
            return Err(anyhow!(
                "detector input_size and max_detections must be greater than zero"
            ));
        }
        self.detector.backend = self.detector.backend.trim().to_lowercase();

        let n = &self.notifier;
        if n.workers == 0 || n.queue_depth == 0 {
            return Err(anyhow!(
                "notifier workers and queue_depth must be greater than zero"
            ));
        }
        if let Some(endpoint) = &n.endpoint {
            crate::transport::validate_endpoint(endpoint)?;
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<DaemonConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
