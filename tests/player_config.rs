use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use firesense::config::PlayerConfig;
use firesense::{AnnotatorStyle, DisplayArea, FrameSourceDescriptor};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FIRESENSE_CONFIG",
        "FIRESENSE_SOURCE",
        "FIRESENSE_DEVICE_PATH",
        "FIRESENSE_DETECTOR",
        "FIRESENSE_MODEL_PATH",
        "FIRESENSE_ANNOTATOR",
        "FIRESENSE_FONT_PATH",
        "FIRESENSE_READ_TIMEOUT_MS",
        "FIRESENSE_DISPLAY_SIZE",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r##"{
            "source": "rtsp://10.0.0.20/stream1",
            "capture": {
                "device_path": "/dev/v4l/by-id/cam{index}",
                "read_timeout_ms": 2500,
                "width": 1280,
                "height": 720
            },
            "detector": {
                "backend": "tract",
                "model_path": "models/fire.onnx",
                "confidence_threshold": 0.4,
                "labels": ["Fire", "Smoke"]
            },
            "annotator": {
                "box_color": "#00FF00",
                "thickness": 3
            },
            "upload": {
                "extensions": [".MKV", "mp4"]
            }
        }"##,
    );

    std::env::set_var("FIRESENSE_CONFIG", file.path());
    std::env::set_var("FIRESENSE_SOURCE", "1");
    std::env::set_var("FIRESENSE_ANNOTATOR", "imageproc");
    std::env::set_var("FIRESENSE_DISPLAY_SIZE", "1024x576");

    let cfg = PlayerConfig::load().expect("load config");

    assert_eq!(cfg.source, Some(FrameSourceDescriptor::Device(1)));
    assert_eq!(cfg.capture.device_path, "/dev/v4l/by-id/cam{index}");
    assert_eq!(cfg.capture.read_timeout, Duration::from_millis(2_500));
    assert_eq!(cfg.capture.open_timeout, Duration::from_millis(10_000));
    assert_eq!((cfg.capture.width, cfg.capture.height), (1280, 720));
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(cfg.detector.model_path, Some(PathBuf::from("models/fire.onnx")));
    assert_eq!(cfg.detector.confidence_threshold, 0.4);
    assert_eq!(cfg.detector.iou_threshold, 0.45);
    assert_eq!(cfg.detector.labels, vec!["Fire", "Smoke"]);
    assert_eq!(cfg.annotator.style, AnnotatorStyle::Imageproc);
    assert_eq!(cfg.annotator.box_color, [0, 255, 0]);
    assert_eq!(cfg.annotator.thickness, 3);
    assert_eq!(cfg.display, DisplayArea::new(1024, 576));
    assert_eq!(cfg.uploads.extensions(), ["mkv", "mp4"]);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
source = "file:stub://demo?frames=30&fps=15"

[detector]
backend = "stub"

[display]
width = 960
height = 540
"#,
    );

    let cfg = PlayerConfig::load_from(Some(file.path())).expect("load toml config");
    assert_eq!(
        cfg.source,
        Some(FrameSourceDescriptor::File(
            "stub://demo?frames=30&fps=15".to_string()
        ))
    );
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.display, DisplayArea::new(960, 540));
    assert_eq!(cfg.annotator.style, AnnotatorStyle::Manual);
}

#[test]
fn defaults_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PlayerConfig::load().expect("defaults load");
    assert!(cfg.source.is_none());
    assert_eq!(cfg.detector.backend, "cpu");
    assert_eq!(cfg.display, DisplayArea::new(700, 400));
    assert!(cfg.uploads.allows(Path::new("clip.MOV")));
    assert!(!cfg.uploads.allows(Path::new("clip.gif")));
}

#[test]
fn rejects_unknown_fields() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(".json", r#"{ "detector": { "backend": "cpu", "gpu": true } }"#);
    let err = PlayerConfig::load_from(Some(file.path())).expect_err("unknown field");
    assert!(err.to_string().contains("invalid config file"));
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FIRESENSE_READ_TIMEOUT_MS", "soon");
    assert!(PlayerConfig::load().is_err());
    clear_env();

    std::env::set_var("FIRESENSE_READ_TIMEOUT_MS", "0");
    assert!(PlayerConfig::load().is_err());
    clear_env();

    std::env::set_var("FIRESENSE_DETECTOR", "cuda");
    let err = PlayerConfig::load().expect_err("unknown backend");
    assert!(err.to_string().contains("unknown detector backend 'cuda'"));
    clear_env();

    std::env::set_var("FIRESENSE_DETECTOR", "tract");
    let err = PlayerConfig::load().expect_err("tract without a model");
    assert!(err.to_string().contains("requires detector.model_path"));
    clear_env();

    std::env::set_var("FIRESENSE_DISPLAY_SIZE", "wide");
    assert!(PlayerConfig::load().is_err());
    clear_env();

    let file = write_config(".json", r#"{ "annotator": { "box_color": "orange" } }"#);
    assert!(PlayerConfig::load_from(Some(file.path())).is_err());
}
