use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::annotate::{parse_hex_color, AnnotatorSettings, AnnotatorStyle};
use crate::detect::DetectorSettings;
use crate::display::DisplayArea;
use crate::events::UploadPolicy;
use crate::ingest::{CaptureSettings, FrameSourceDescriptor};

const DEFAULT_DEVICE_PATH: &str = "/dev/video{index}";
const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_OPEN_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_DETECTOR: &str = "cpu";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_LABEL: &str = "Fire";
const DEFAULT_BOX_COLOR: &str = "#DC4D01";
const DEFAULT_THICKNESS: u32 = 2;
const DEFAULT_DISPLAY_WIDTH: u32 = 700;
const DEFAULT_DISPLAY_HEIGHT: u32 = 400;
const DEFAULT_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];
const KNOWN_DETECTORS: [&str; 3] = ["stub", "cpu", "tract"];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PlayerConfigFile {
    source: Option<String>,
    capture: Option<CaptureConfigFile>,
    detector: Option<DetectorConfigFile>,
    annotator: Option<AnnotatorConfigFile>,
    display: Option<DisplayConfigFile>,
    upload: Option<UploadConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    device_path: Option<String>,
    read_timeout_ms: Option<u64>,
    open_timeout_ms: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AnnotatorConfigFile {
    style: Option<String>,
    font_path: Option<PathBuf>,
    box_color: Option<String>,
    thickness: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct UploadConfigFile {
    extensions: Option<Vec<String>>,
}

/// Player settings: file, then defaults, then `FIRESENSE_*` environment overrides.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Source to select at startup, if any.
    pub source: Option<FrameSourceDescriptor>,
    pub capture: CaptureSettings,
    pub detector: DetectorSettings,
    pub annotator: AnnotatorSettings,
    pub display: DisplayArea,
    pub uploads: UploadPolicy,
}

impl PlayerConfig {
    pub fn load() -> Result<Self> {
        let config_path = env_value("FIRESENSE_CONFIG").map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with the config file given explicitly.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PlayerConfigFile) -> Result<Self> {
        let source = file.source.as_deref().map(str::parse).transpose()?;

        let capture_file = file.capture.unwrap_or_default();
        let capture = CaptureSettings {
            device_path: capture_file
                .device_path
                .unwrap_or_else(|| DEFAULT_DEVICE_PATH.to_string()),
            width: capture_file.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
            height: capture_file.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
            read_timeout: Duration::from_millis(
                capture_file
                    .read_timeout_ms
                    .unwrap_or(DEFAULT_READ_TIMEOUT_MS),
            ),
            open_timeout: Duration::from_millis(
                capture_file
                    .open_timeout_ms
                    .unwrap_or(DEFAULT_OPEN_TIMEOUT_MS),
            ),
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
            model_path: detector_file.model_path,
            input_size: detector_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE),
            iou_threshold: detector_file.iou_threshold.unwrap_or(DEFAULT_IOU),
            labels: detector_file
                .labels
                .unwrap_or_else(|| vec![DEFAULT_LABEL.to_string()]),
        };

        let annotator_file = file.annotator.unwrap_or_default();
        let annotator = AnnotatorSettings {
            style: annotator_file
                .style
                .as_deref()
                .map(str::parse)
                .transpose()?
                .unwrap_or(AnnotatorStyle::Manual),
            font_path: annotator_file.font_path,
            box_color: parse_hex_color(
                annotator_file
                    .box_color
                    .as_deref()
                    .unwrap_or(DEFAULT_BOX_COLOR),
            )?,
            thickness: annotator_file.thickness.unwrap_or(DEFAULT_THICKNESS),
        };

        let display_file = file.display.unwrap_or_default();
        let display = DisplayArea::new(
            display_file.width.unwrap_or(DEFAULT_DISPLAY_WIDTH),
            display_file.height.unwrap_or(DEFAULT_DISPLAY_HEIGHT),
        );

        let uploads = match file.upload.and_then(|upload| upload.extensions) {
            Some(extensions) => UploadPolicy::new(extensions),
            None => UploadPolicy::new(DEFAULT_EXTENSIONS),
        };

        Ok(Self {
            source,
            capture,
            detector,
            annotator,
            display,
            uploads,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(source) = env_value("FIRESENSE_SOURCE") {
            self.source = Some(source.parse()?);
        }
        if let Some(path) = env_value("FIRESENSE_DEVICE_PATH") {
            self.capture.device_path = path;
        }
        if let Some(backend) = env_value("FIRESENSE_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(path) = env_value("FIRESENSE_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(style) = env_value("FIRESENSE_ANNOTATOR") {
            self.annotator.style = style.parse()?;
        }
        if let Some(path) = env_value("FIRESENSE_FONT_PATH") {
            self.annotator.font_path = Some(PathBuf::from(path));
        }
        if let Some(timeout) = env_value("FIRESENSE_READ_TIMEOUT_MS") {
            let millis: u64 = timeout.parse().map_err(|_| {
                anyhow!("FIRESENSE_READ_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.capture.read_timeout = Duration::from_millis(millis);
        }
        if let Some(size) = env_value("FIRESENSE_DISPLAY_SIZE") {
            self.display = parse_display_size(&size).context("FIRESENSE_DISPLAY_SIZE")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.read_timeout.is_zero() {
            return Err(anyhow!("capture.read_timeout_ms must be greater than zero"));
        }
        if self.capture.open_timeout.is_zero() {
            return Err(anyhow!("capture.open_timeout_ms must be greater than zero"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture width and height must be greater than zero"));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow!("display width and height must be greater than zero"));
        }
        if !KNOWN_DETECTORS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of: {})",
                self.detector.backend,
                KNOWN_DETECTORS.join(", ")
            ));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!("detector backend 'tract' requires detector.model_path"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector.input_size must be greater than zero"));
        }
        for (name, value) in [
            ("confidence_threshold", self.detector.confidence_threshold),
            ("iou_threshold", self.detector.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("detector.{} must be within 0..=1, got {}", name, value));
            }
        }
        if self.detector.labels.is_empty() {
            return Err(anyhow!("detector.labels must name at least one class"));
        }
        if self.annotator.thickness == 0 {
            return Err(anyhow!("annotator.thickness must be greater than zero"));
        }
        if self.uploads.extensions().is_empty() {
            return Err(anyhow!("upload.extensions must list at least one extension"));
        }
        Ok(())
    }
}

/// Parse `WIDTHxHEIGHT`, e.g. `1280x720`.
pub fn parse_display_size(value: &str) -> Result<DisplayArea> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("display size must look like WIDTHxHEIGHT, got '{}'", value))?;
    let width: u32 = w
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid display width '{}'", w))?;
    let height: u32 = h
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid display height '{}'", h))?;
    if width == 0 || height == 0 {
        return Err(anyhow!("display size must be non-zero, got '{}'", value));
    }
    Ok(DisplayArea::new(width, height))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<PlayerConfigFile> {
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
